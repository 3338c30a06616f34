use actix_session::Session;
use actix_web::{dev::Payload, web, Error, FromRequest, HttpRequest};
use std::pin::Pin;

use crate::cache::ProfileCache;
use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::services::UsersService;

const SESSION_USER_ID_KEY: &str = "user_id";

/// Store user ID in session
pub fn set_user_session(session: &Session, user_id: i32) -> AppResult<()> {
    session.renew();
    session
        .insert(SESSION_USER_ID_KEY, user_id)
        .map_err(|e| AppError::Internal(format!("Failed to set session: {}", e)))
}

/// Get user ID from session
pub fn get_user_id_from_session(session: &Session) -> Option<i32> {
    session.get::<i32>(SESSION_USER_ID_KEY).ok().flatten()
}

/// Clear session (logout)
pub fn clear_session(session: &Session) {
    session.purge();
}

/// Extractor for the session user.
///
/// Profiles come from the [`ProfileCache`] when one is registered, falling
/// back to the database on a miss.
pub struct AuthenticatedUser(pub User);

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let session = Session::extract(&req)
                .await
                .map_err(|_| AppError::Unauthorized("Session error".to_string()))?;

            let user_id = get_user_id_from_session(&session)
                .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;

            let cache = req.app_data::<web::Data<ProfileCache>>().cloned();

            let user = match cache.as_ref().and_then(|c| c.get(user_id)) {
                Some(user) => user,
                None => {
                    let pool = req
                        .app_data::<web::Data<sqlx::PgPool>>()
                        .ok_or_else(|| AppError::Internal("Database pool not found".to_string()))?;

                    let user = UsersService::get_by_id(pool.get_ref(), user_id)
                        .await
                        .map_err(|e| {
                            log::error!("Failed to fetch user {}: {}", user_id, e);
                            AppError::unavailable(e)
                        })?
                        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

                    if let Some(cache) = cache.as_ref() {
                        cache.insert(user.clone());
                    }
                    user
                }
            };

            if !user.is_active {
                return Err(AppError::Unauthorized("User is inactive".to_string()).into());
            }

            Ok(AuthenticatedUser(user))
        })
    }
}
