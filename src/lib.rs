pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod mailer;
pub mod middleware;
pub mod payments;
pub mod websocket;

use actix_web::HttpResponse;
use std::sync::Arc;
use std::time::Duration;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{AuthService, RateLimitConfig, RateLimiter};
pub use cache::CacheService;
pub use db::{DbOperations, User};
pub use mailer::Mailer;
pub use payments::{PaymentGateway, StripeClient};
pub use websocket::ChatHub;

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Application state shared across all workers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub db: DbOperations,
    pub auth: Arc<AuthService>,
    pub hub: Arc<ChatHub>,
    pub rate_limiter: Arc<RateLimiter>,
    pub cache: Arc<CacheService>,
    pub payments: Arc<dyn PaymentGateway>,
    pub mailer: Option<Arc<Mailer>>,
}

impl AppState {
    pub async fn new(config: Settings) -> Result<Self> {
        let db = DbOperations::new_with_options(
            &config.database.url,
            config.database.max_connections,
            Duration::from_secs(config.database.acquire_timeout_secs),
        )
        .await?;

        Self::from_parts(config, db)
    }

    /// Builds every service around an existing pool.
    pub fn from_parts(config: Settings, db: DbOperations) -> Result<Self> {
        let auth = AuthService::new(db.clone(), &config)?;
        let rate_limiter = RateLimiter::new(RateLimitConfig::from(&config.rate_limit));
        let cache = CacheService::new(&config.cache);
        let payments: Arc<dyn PaymentGateway> = Arc::new(StripeClient::new(config.stripe.clone()));
        let mailer = Mailer::from_settings(&config.smtp)?.map(Arc::new);

        Ok(Self {
            config: Arc::new(config),
            db,
            auth: Arc::new(auth),
            hub: Arc::new(ChatHub::new()),
            rate_limiter: Arc::new(rate_limiter),
            cache: Arc::new(cache),
            payments,
            mailer,
        })
    }

    /// Swaps the payment gateway, used to run checkout flows against a fake.
    pub fn with_payments(mut self, payments: Arc<dyn PaymentGateway>) -> Self {
        self.payments = payments;
        self
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.db.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lazy_state() -> AppState {
        let config = Settings::new_for_test().expect("Failed to load test config");
        let db = DbOperations::new_lazy(&config.database.url, 2).expect("lazy pool");
        AppState::from_parts(config, db).expect("state")
    }

    #[tokio::test]
    async fn test_app_state_from_lazy_pool() {
        let state = lazy_state();
        assert!(!state.cache.is_enabled());
        assert!(state.mailer.is_none());
        assert_eq!(state.hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_app_state_clone() {
        let state = lazy_state();
        let cloned = state.clone();

        // Workers share one set of services
        assert!(Arc::ptr_eq(&state.config, &cloned.config));
        assert!(Arc::ptr_eq(&state.hub, &cloned.hub));
        assert!(Arc::ptr_eq(&state.rate_limiter, &cloned.rate_limiter));
    }

    #[actix_web::test]
    async fn test_health_check() {
        let response = health_check().await;
        assert!(response.status().is_success());
    }
}
