//! Integration tests for weaving under the daily quota
//!
//! Drives `POST /api/dreams/weave` and `GET /api/quota` against a real
//! database with a scripted weaver.

use std::sync::Arc;

use actix_web::test;
use chrono::{TimeDelta, Utc};
use serde_json::{json, Value};

use oneiri::models::GenerationEvent;
use oneiri::services::quota::{GenerationStore, PgGenerationStore};
use oneiri::services::weaver::WeaveOutcome;

use crate::common::{
    create_test_user, login_request, quota_config, session_cookie, ReadOnlyGenerationStore,
    StubWeaver, TestDb, TestState,
};

fn weave(cookie: &str, text: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/dreams/weave")
        .insert_header(("Cookie", cookie.to_string()))
        .set_json(json!({ "dream_text": text, "mood": "eerie" }))
}

fn quota(cookie: &str) -> test::TestRequest {
    test::TestRequest::get()
        .uri("/api/quota")
        .insert_header(("Cookie", cookie.to_string()))
}

async fn dream_count(db: &TestDb, user_id: i32) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM dreams WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&db.pool)
        .await
        .unwrap()
}

// =============================================================================
// GET /api/quota
// =============================================================================

#[actix_web::test]
async fn test_quota_requires_session() {
    let db = TestDb::new().await;
    let state = TestState::new(&db.pool, Arc::new(StubWeaver::new()), quota_config(2, false));
    let app = crate::test_app!(state);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/quota").to_request())
        .await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_fresh_user_has_full_quota() {
    let db = TestDb::new().await;
    create_test_user(&db.pool, "new@example.com").await;
    let state = TestState::new(&db.pool, Arc::new(StubWeaver::new()), quota_config(2, false));
    let app = crate::test_app!(state);

    let resp = test::call_service(&app, login_request("new@example.com").to_request()).await;
    let cookie = session_cookie(&resp);

    let resp = test::call_service(&app, quota(&cookie).to_request()).await;
    assert_eq!(resp.status(), 200);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["current_count"], 0);
    assert_eq!(body["daily_limit"], 2);
    assert_eq!(body["remaining"], 2);
    assert_eq!(body["has_reached_limit"], false);
    assert!(body["hours_until_reset"].as_f64().unwrap() > 0.0);
    assert!(body["hours_until_reset"].as_f64().unwrap() <= 24.0);
    assert_eq!(body["generations"], json!([]));
}

#[actix_web::test]
async fn test_yesterdays_generations_do_not_count() {
    let db = TestDb::new().await;
    let user = create_test_user(&db.pool, "old@example.com").await;

    let store = PgGenerationStore::new(db.pool.clone());
    for hours in [25, 30] {
        store
            .append(&GenerationEvent::new(
                user.id,
                None,
                Utc::now() - TimeDelta::hours(hours),
            ))
            .await
            .unwrap();
    }

    let state = TestState::new(&db.pool, Arc::new(StubWeaver::new()), quota_config(2, false));
    let app = crate::test_app!(state);

    let resp = test::call_service(&app, login_request("old@example.com").to_request()).await;
    let cookie = session_cookie(&resp);

    let body: Value =
        test::read_body_json(test::call_service(&app, quota(&cookie).to_request()).await).await;
    assert_eq!(body["current_count"], 0);
    assert_eq!(body["remaining"], 2);
}

// =============================================================================
// POST /api/dreams/weave
// =============================================================================

#[actix_web::test]
async fn test_weave_until_limit_then_429() {
    let db = TestDb::new().await;
    let user = create_test_user(&db.pool, "weaver@example.com").await;
    let weaver = Arc::new(StubWeaver::new());
    let state = TestState::new(&db.pool, weaver.clone(), quota_config(2, false));
    let app = crate::test_app!(state);

    let resp = test::call_service(&app, login_request("weaver@example.com").to_request()).await;
    let cookie = session_cookie(&resp);

    // First weave: one generation left afterwards
    let resp = test::call_service(&app, weave(&cookie, "I could breathe underwater").to_request())
        .await;
    assert_eq!(resp.status(), 201);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["dream"]["dream_text"], "I could breathe underwater");
    assert_eq!(body["dream"]["mood"], "eerie");
    assert_eq!(body["quota"]["current_count"], 1);
    assert_eq!(body["quota"]["remaining"], 1);
    assert_eq!(body["quota"]["has_reached_limit"], false);

    // Second weave uses the last generation
    let resp = test::call_service(&app, weave(&cookie, "The stairs kept going up").to_request())
        .await;
    assert_eq!(resp.status(), 201);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["quota"]["current_count"], 2);
    assert_eq!(body["quota"]["remaining"], 0);
    assert_eq!(body["quota"]["has_reached_limit"], true);

    // Third is refused before the weaver is called
    let resp = test::call_service(&app, weave(&cookie, "A third dream").to_request()).await;
    assert_eq!(resp.status(), 429);
    let retry_after: u64 = resp
        .headers()
        .get("retry-after")
        .expect("429 should carry Retry-After")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);
    assert!(retry_after <= 24 * 3600);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "QuotaExceeded");
    assert_eq!(body["quota"]["current_count"], 2);
    assert_eq!(body["quota"]["remaining"], 0);
    assert_eq!(body["quota"]["generations"].as_array().unwrap().len(), 2);

    assert_eq!(weaver.calls(), 2);
    assert_eq!(dream_count(&db, user.id).await, 2);
}

#[actix_web::test]
async fn test_weaver_failure_is_not_charged() {
    let db = TestDb::new().await;
    let user = create_test_user(&db.pool, "unlucky@example.com").await;
    let weaver = Arc::new(
        StubWeaver::new()
            .then(WeaveOutcome::failure("weaver_unavailable", "timed out", true))
            .then(WeaveOutcome::failure("content_policy", "refused", false)),
    );
    let state = TestState::new(&db.pool, weaver.clone(), quota_config(2, false));
    let app = crate::test_app!(state);

    let resp = test::call_service(&app, login_request("unlucky@example.com").to_request()).await;
    let cookie = session_cookie(&resp);

    let resp = test::call_service(&app, weave(&cookie, "a dream").to_request()).await;
    assert_eq!(resp.status(), 503);
    assert!(resp.headers().get("retry-after").is_some());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "UpstreamError");
    assert_eq!(body["error"]["retryable"], true);

    let resp = test::call_service(&app, weave(&cookie, "a dream").to_request()).await;
    assert_eq!(resp.status(), 502);

    let body: Value =
        test::read_body_json(test::call_service(&app, quota(&cookie).to_request()).await).await;
    assert_eq!(body["current_count"], 0);
    assert_eq!(body["remaining"], 2);
    assert_eq!(dream_count(&db, user.id).await, 0);
    assert_eq!(weaver.calls(), 2);
}

#[actix_web::test]
async fn test_invalid_dream_never_reaches_weaver() {
    let db = TestDb::new().await;
    create_test_user(&db.pool, "blank@example.com").await;
    let weaver = Arc::new(StubWeaver::new());
    let state = TestState::new(&db.pool, weaver.clone(), quota_config(2, false));
    let app = crate::test_app!(state);

    let resp = test::call_service(&app, login_request("blank@example.com").to_request()).await;
    let cookie = session_cookie(&resp);

    let resp = test::call_service(&app, weave(&cookie, "   ").to_request()).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(weaver.calls(), 0);
}

#[actix_web::test]
async fn test_deleting_a_dream_does_not_refund_quota() {
    let db = TestDb::new().await;
    create_test_user(&db.pool, "regret@example.com").await;
    let state = TestState::new(&db.pool, Arc::new(StubWeaver::new()), quota_config(2, false));
    let app = crate::test_app!(state);

    let resp = test::call_service(&app, login_request("regret@example.com").to_request()).await;
    let cookie = session_cookie(&resp);

    let body: Value = test::read_body_json(
        test::call_service(&app, weave(&cookie, "falling forever").to_request()).await,
    )
    .await;
    let dream_id = body["dream"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::delete()
        .uri(&format!("/api/dreams/{}", dream_id))
        .insert_header(("Cookie", cookie.clone()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let body: Value =
        test::read_body_json(test::call_service(&app, quota(&cookie).to_request()).await).await;
    assert_eq!(body["current_count"], 1);
    assert_eq!(body["generations"][0]["dream_id"], Value::Null);
}

#[actix_web::test]
async fn test_zero_limit_refuses_everything() {
    let db = TestDb::new().await;
    create_test_user(&db.pool, "none@example.com").await;
    let weaver = Arc::new(StubWeaver::new());
    let state = TestState::new(&db.pool, weaver.clone(), quota_config(0, false));
    let app = crate::test_app!(state);

    let resp = test::call_service(&app, login_request("none@example.com").to_request()).await;
    let cookie = session_cookie(&resp);

    let resp = test::call_service(&app, weave(&cookie, "anything").to_request()).await;
    assert_eq!(resp.status(), 429);
    assert_eq!(weaver.calls(), 0);
}

#[actix_web::test]
async fn test_strict_mode_weaves_until_limit() {
    let db = TestDb::new().await;
    let user = create_test_user(&db.pool, "strict@example.com").await;
    let state = TestState::new(&db.pool, Arc::new(StubWeaver::new()), quota_config(1, true));
    let app = crate::test_app!(state);

    let resp = test::call_service(&app, login_request("strict@example.com").to_request()).await;
    let cookie = session_cookie(&resp);

    let resp = test::call_service(&app, weave(&cookie, "first").to_request()).await;
    assert_eq!(resp.status(), 201);
    let resp = test::call_service(&app, weave(&cookie, "second").to_request()).await;
    assert_eq!(resp.status(), 429);

    assert_eq!(dream_count(&db, user.id).await, 1);
}

#[actix_web::test]
async fn test_unrecorded_weaving_rolls_back_dream() {
    let db = TestDb::new().await;

    for (email, strict) in [("soft@example.com", false), ("hard@example.com", true)] {
        let user = create_test_user(&db.pool, email).await;
        let weaver = Arc::new(StubWeaver::new());
        let state = TestState::with_store(
            &db.pool,
            Arc::new(ReadOnlyGenerationStore::new(&db.pool)),
            weaver.clone(),
            quota_config(2, strict),
        );
        let app = crate::test_app!(state);

        let resp = test::call_service(&app, login_request(email).to_request()).await;
        let cookie = session_cookie(&resp);

        // The weaver succeeds, then recording the generation fails
        let resp = test::call_service(&app, weave(&cookie, "a lost dream").to_request()).await;
        assert_eq!(resp.status(), 503);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "Unavailable");

        assert_eq!(weaver.calls(), 1);
        assert_eq!(dream_count(&db, user.id).await, 0);
        let events = PgGenerationStore::new(db.pool.clone())
            .events_since(user.id, Utc::now() - TimeDelta::days(2))
            .await
            .unwrap();
        assert!(events.is_empty());
    }
}
