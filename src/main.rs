use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpServer};
use dotenv::dotenv;
use estatehub_server::websocket::websocket_route;
use estatehub_server::{api, error, health_check, AppError, AppState, Settings};
use std::net::TcpListener;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

fn build_cors(config: &Settings) -> Cors {
    let cors = config
        .cors
        .allowed_origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin));

    cors.allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
        .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .supports_credentials()
        .max_age(config.cors.max_age)
}

#[actix_web::main]
async fn main() -> estatehub_server::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Load configuration
    let config = Settings::new()?;
    error::hide_internal_details(config.is_production());
    info!("Configuration loaded successfully ({} environment)", config.environment);

    // Initialize application state
    let state = AppState::new(config.clone()).await?;
    state.db.run_migrations().await?;
    info!("Database migrations applied");
    if state.mailer.is_none() {
        warn!("SMTP is not configured, outgoing mail is disabled");
    }
    let state = web::Data::new(state);

    // Expire rate limit windows and stale cache entries
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(CLEANUP_INTERVAL).await;
            cleanup_state.rate_limiter.cleanup().await;
            cleanup_state.cache.purge_expired().await;
        }
    });

    // Create and bind TCP listener
    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;
    info!("Starting server at http://{}:{}", config.server.host, config.server.port);
    info!("Chat socket available at ws://{}:{}/ws", config.server.host, config.server.port);

    let server_config = config.clone();
    HttpServer::new(move || {
        // Registered last so it runs first: CORS, headers, logger, limiter
        App::new()
            .app_data(state.clone())
            .wrap(middleware::from_fn(estatehub_server::middleware::rate_limit))
            .wrap(middleware::Logger::default())
            .wrap(estatehub_server::middleware::security_headers(server_config.is_production()))
            .wrap(build_cors(&server_config))
            .route("/health", web::get().to(health_check))
            .route("/ws", web::get().to(websocket_route))
            .configure(api::configure)
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    Ok(())
}
