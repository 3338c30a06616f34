use actix_web::{web, HttpResponse};
use chrono::Utc;

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::services::QuotaTracker;

/// GET /api/quota - Weaving quota of the current user
pub async fn get_quota(
    tracker: web::Data<QuotaTracker>,
    user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
    let status = tracker.get_status(user.0.id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(status))
}

/// Configure quota routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/quota", web::get().to(get_quota));
}
