use actix_cors::Cors;
use actix_web::{App, HttpServer, http::header, middleware::Logger, web};
use anyhow::Context;
use paytrack::{
    config::Settings,
    database::{
        connection::{create_pool, run_migrations},
        seed::ensure_first_admin,
    },
    middleware::rate_limit::{RateLimitState, RateLimiter},
    routes,
    services::{auth::AuthService, callback::CallbackNotifier, expiry::spawn_expiry_sweeper},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::load().context("failed to load settings")?;

    let pool = create_pool(&settings).await.context("failed to connect to database")?;
    run_migrations(&pool).await.context("failed to run migrations")?;
    ensure_first_admin(&pool, &settings).await.context("failed to seed admin user")?;

    let auth = AuthService::from_settings(&settings);
    let notifier = CallbackNotifier::new(pool.clone(), settings.callback_timeout_secs)
        .context("failed to build callback client")?;
    spawn_expiry_sweeper(
        pool.clone(),
        notifier.clone(),
        settings.payment_expiry_minutes,
        settings.expiry_sweep_interval_secs,
    );

    let rate_limits = Arc::new(RateLimitState::with_default_rules());
    let bind_address = settings.bind_address();
    let cors_origins = settings.backend_cors_origins.clone();

    let pool = web::Data::new(pool);
    let settings = web::Data::new(settings);
    let auth = web::Data::new(auth);
    let notifier = web::Data::new(notifier);

    info!("Starting server on {}:{}", bind_address.0, bind_address.1);

    HttpServer::new(move || {
        let cors = cors_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
            .allowed_header("X-API-Key")
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(pool.clone())
            .app_data(settings.clone())
            .app_data(auth.clone())
            .app_data(notifier.clone())
            .wrap(RateLimiter::new(rate_limits.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .configure(routes::configure)
    })
    .bind(bind_address)?
    .run()
    .await?;

    Ok(())
}
