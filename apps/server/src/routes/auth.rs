use actix_session::Session;
use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;

use crate::auth::{self, AuthenticatedUser};
use crate::cache::ProfileCache;
use crate::error::{AppError, AppResult};
use crate::models::{CreateUserRequest, LoginRequest, UpdateProfileRequest, User};
use crate::services::UsersService;

/// Shortest password accepted at registration
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Serialize)]
struct AuthResponse {
    user: UserResponse,
}

#[derive(Serialize)]
struct UserResponse {
    id: i32,
    email: String,
    display_name: Option<String>,
    public_name: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let public_name = user.public_name().to_string();
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            public_name,
        }
    }
}

/// Email validation - checks basic format requirements
pub fn is_valid_email(email: &str) -> bool {
    // Must have exactly one @
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return false;
    }
    let (local, domain) = (parts[0], parts[1]);

    // Local part: non-empty, reasonable chars
    if local.is_empty() || local.len() > 64 {
        return false;
    }

    // Domain: non-empty, has at least one dot, not starting/ending with dot
    if domain.is_empty() || domain.len() > 255 {
        return false;
    }
    if !domain.contains('.') {
        return false;
    }
    if domain.starts_with('.') || domain.ends_with('.') {
        return false;
    }

    // Domain parts must not be empty (catches "user@.com" and "user@domain.")
    let domain_parts: Vec<&str> = domain.split('.').collect();
    if domain_parts.iter().any(|p| p.is_empty()) {
        return false;
    }

    // TLD must be at least 2 chars
    if let Some(tld) = domain_parts.last() {
        if tld.len() < 2 {
            return false;
        }
    }

    true
}

/// POST /auth/register
/// Create new user account
pub async fn register(
    pool: web::Data<sqlx::PgPool>,
    session: Session,
    req: web::Json<CreateUserRequest>,
) -> AppResult<impl Responder> {
    // Validate email format
    if !is_valid_email(&req.email) {
        return Err(AppError::Validation("Invalid email format".to_string()));
    }

    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let user = UsersService::create_user(pool.get_ref(), &req).await?;
    log::info!("Registered user {}", user.id);

    // Set session
    auth::set_user_session(&session, user.id)?;

    Ok(HttpResponse::Created().json(AuthResponse { user: user.into() }))
}

/// POST /auth/login
/// Authenticate user and create session
pub async fn login(
    pool: web::Data<sqlx::PgPool>,
    session: Session,
    req: web::Json<LoginRequest>,
) -> AppResult<impl Responder> {
    // Get user by email
    let user = UsersService::get_by_email(pool.get_ref(), &req.email)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

    // Check if user is active
    if !user.is_active {
        return Err(AppError::Unauthorized("Account is disabled".to_string()));
    }

    // Verify password
    if !user.verify_password(&req.password)? {
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }

    // Update last login
    UsersService::update_last_login(pool.get_ref(), user.id).await?;

    // Set session
    auth::set_user_session(&session, user.id)?;

    Ok(HttpResponse::Ok().json(AuthResponse { user: user.into() }))
}

/// POST /auth/logout
/// Clear session
pub async fn logout(session: Session, cache: web::Data<ProfileCache>) -> impl Responder {
    if let Some(user_id) = auth::get_user_id_from_session(&session) {
        cache.invalidate(user_id);
    }
    auth::clear_session(&session);
    HttpResponse::NoContent().finish()
}

/// GET /auth/me
/// Get current authenticated user
pub async fn get_current_user(user: AuthenticatedUser) -> impl Responder {
    HttpResponse::Ok().json(UserResponse::from(user.0))
}

/// PATCH /auth/me
/// Update the current user's display name
pub async fn update_current_user(
    pool: web::Data<sqlx::PgPool>,
    cache: web::Data<ProfileCache>,
    user: AuthenticatedUser,
    req: web::Json<UpdateProfileRequest>,
) -> AppResult<impl Responder> {
    let updated =
        UsersService::update_display_name(pool.get_ref(), user.0.id, req.display_name.as_deref())
            .await?;

    cache.invalidate(updated.id);

    Ok(HttpResponse::Ok().json(UserResponse::from(updated)))
}

/// Configure auth routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/logout", web::post().to(logout))
            .route("/me", web::get().to(get_current_user))
            .route("/me", web::patch().to(update_current_user)),
    );
}
