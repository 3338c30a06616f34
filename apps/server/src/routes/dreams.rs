use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::{UpdateDream, WeaveDreamRequest};
use crate::pagination::{ListDreamsQuery, OffsetPaginatedResponse};
use crate::services::{
    DreamService, QuotaStatus, QuotaTracker, StoryWeaver, WeaveResult, WeavingService,
};

/// Body of a 429 from the weave endpoint
#[derive(Serialize)]
struct QuotaExceededResponse {
    error: QuotaExceededDetail,
    quota: QuotaStatus,
}

#[derive(Serialize)]
struct QuotaExceededDetail {
    #[serde(rename = "type")]
    error_type: &'static str,
    message: String,
}

/// POST /api/dreams/weave - Turn a dream into a story
pub async fn weave_dream(
    pool: web::Data<DbPool>,
    tracker: web::Data<QuotaTracker>,
    weaver: web::Data<dyn StoryWeaver>,
    user: AuthenticatedUser,
    body: web::Json<WeaveDreamRequest>,
) -> AppResult<HttpResponse> {
    let result = WeavingService::weave(
        pool.get_ref(),
        tracker.get_ref(),
        weaver.get_ref(),
        user.0.id,
        body.into_inner(),
        Utc::now(),
    )
    .await?;

    match result {
        WeaveResult::Limited(status) => {
            let message = format!(
                "Daily weaving limit of {} reached, resets in {:.1} hours",
                status.daily_limit, status.hours_until_reset
            );
            Ok(HttpResponse::TooManyRequests()
                .insert_header(("Retry-After", status.retry_after_secs().to_string()))
                .json(QuotaExceededResponse {
                    error: QuotaExceededDetail {
                        error_type: "QuotaExceeded",
                        message,
                    },
                    quota: status,
                }))
        }
        woven @ WeaveResult::Woven { .. } => Ok(HttpResponse::Created().json(woven)),
    }
}

/// GET /api/dreams - List the current user's dreams
pub async fn list_my_dreams(
    pool: web::Data<DbPool>,
    query: web::Query<ListDreamsQuery>,
    user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
    query.validate()?;
    let (dreams, total_count) = DreamService::list_for_user(
        pool.get_ref(),
        user.0.id,
        query.order,
        query.page,
        query.per_page,
    )
    .await?;

    Ok(HttpResponse::Ok().json(OffsetPaginatedResponse::new(
        dreams,
        total_count,
        query.page,
        query.per_page,
    )))
}

/// GET /api/dreams/public - Browse the public dream library
pub async fn list_public_dreams(
    pool: web::Data<DbPool>,
    query: web::Query<ListDreamsQuery>,
) -> AppResult<HttpResponse> {
    query.validate()?;
    let (dreams, total_count) =
        DreamService::list_public(pool.get_ref(), query.order, query.page, query.per_page)
            .await?;

    Ok(HttpResponse::Ok().json(OffsetPaginatedResponse::new(
        dreams,
        total_count,
        query.page,
        query.per_page,
    )))
}

/// GET /api/dreams/{id} - Get one dream
pub async fn get_dream(
    pool: web::Data<DbPool>,
    path: web::Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
    let dream = DreamService::get_visible(pool.get_ref(), path.into_inner(), user.0.id).await?;
    Ok(HttpResponse::Ok().json(dream))
}

/// PATCH /api/dreams/{id} - Rename or share/unshare a dream
pub async fn update_dream(
    pool: web::Data<DbPool>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateDream>,
    user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
    let dream = DreamService::update(
        pool.get_ref(),
        path.into_inner(),
        user.0.id,
        body.into_inner(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(dream))
}

/// DELETE /api/dreams/{id} - Delete a dream (its quota use is not refunded)
pub async fn delete_dream(
    pool: web::Data<DbPool>,
    path: web::Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
    DreamService::delete(pool.get_ref(), path.into_inner(), user.0.id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Configure dream routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/dreams")
            .route("", web::get().to(list_my_dreams))
            .route("/weave", web::post().to(weave_dream))
            .route("/public", web::get().to(list_public_dreams))
            .route("/{id}", web::get().to(get_dream))
            .route("/{id}", web::patch().to(update_dream))
            .route("/{id}", web::delete().to(delete_dream)),
    );
}
