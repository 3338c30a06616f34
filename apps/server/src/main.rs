use std::sync::Arc;

use actix_cors::Cors;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{cookie::Key, middleware, web, App, HttpServer};

use oneiri::cache::ProfileCache;
use oneiri::config::{self, QuotaWindowPolicy};
use oneiri::db;
use oneiri::routes;
use oneiri::services::quota::PgGenerationStore;
use oneiri::services::{HttpWeaver, QuotaTracker, StoryWeaver};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Load configuration
    let config = config::Config::from_env().map_err(|e| {
        log::error!("Configuration error: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    log::info!("Starting Oneiri server on {}:{}", config.host, config.port);
    match config.quota.window {
        QuotaWindowPolicy::CalendarDay { reset_offset } => log::info!(
            "Daily weaving limit: {} per calendar day (resets at midnight UTC{})",
            config.quota.daily_limit,
            reset_offset
        ),
        QuotaWindowPolicy::Rolling => log::info!(
            "Daily weaving limit: {} per rolling 24h",
            config.quota.daily_limit
        ),
    }
    if config.quota.strict {
        log::info!("Strict quota enforcement enabled");
    }

    // Create database pool
    let db_pool = db::create_pool(&config.database).await.map_err(|e| {
        log::error!("Database pool error: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    // Run migrations
    db::run_migrations(&db_pool).await.map_err(|e| {
        log::error!("Migration error: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    let weaver: Arc<dyn StoryWeaver> = Arc::new(HttpWeaver::new(&config.weaver).map_err(|e| {
        log::error!("Weaver client error: {}", e);
        std::io::Error::other(e.to_string())
    })?);
    let weaver = web::Data::from(weaver);

    let tracker = web::Data::new(QuotaTracker::new(
        Arc::new(PgGenerationStore::new(db_pool.clone())),
        config.quota.clone(),
    ));

    let profile_cache = web::Data::new(ProfileCache::new(config.cache.profile_ttl));

    // Session secret key from config or generate random (with warning)
    let secret_key = match &config.security.session_secret_key {
        Some(key) => key.clone(),
        None => {
            log::warn!(
                "SESSION_SECRET_KEY not set, using random key (sessions won't persist across restarts)"
            );
            use rand::Rng;
            let random_bytes: Vec<u8> = (0..64).map(|_| rand::rng().random()).collect();
            hex::encode(random_bytes)
        }
    };

    let key = Key::from(secret_key.as_bytes());

    // Clone values for the closure
    let host = config.host.clone();
    let port = config.port;

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::ACCEPT,
                actix_web::http::header::CONTENT_TYPE,
            ])
            .expose_headers(vec![actix_web::http::header::RETRY_AFTER])
            .max_age(3600);

        App::new()
            // Shared state
            .app_data(web::Data::new(db_pool.clone()))
            .app_data(web::Data::new(config.clone()))
            .app_data(tracker.clone())
            .app_data(weaver.clone())
            .app_data(profile_cache.clone())
            // Middleware
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(cors) // CORS must be before SessionMiddleware
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), key.clone())
                    .cookie_name("oneiri_session".to_string())
                    .cookie_secure(config.security.ssl_proxy)
                    .cookie_http_only(true)
                    .cookie_same_site(actix_web::cookie::SameSite::Lax)
                    .build(),
            )
            .configure(routes::health::configure)
            .configure(routes::auth::configure)
            .configure(routes::quota::configure)
            .configure(routes::dreams::configure)
    })
    .bind((host.as_str(), port))?
    .shutdown_timeout(30)
    .run();

    // Spawn graceful shutdown handler
    let server_handle = server.handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        log::info!("Shutdown signal received, stopping server...");
        server_handle.stop(true).await;
    });

    server.await
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                log::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
