#![allow(dead_code)]

use async_trait::async_trait;
use estatehub_server::db::models::{Property, ROLE_USER};
use estatehub_server::db::properties::NewProperty;
use estatehub_server::payments::{CheckoutRequest, CheckoutSession, PaymentGateway};
use estatehub_server::{AppError, AppState, DbOperations, Settings, User};
use std::sync::Arc;
use uuid::Uuid;

/// Gateway that hands out a fixed session without calling Stripe.
pub struct FakeGateway;

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout_session(&self, _request: &CheckoutRequest) -> Result<CheckoutSession, AppError> {
        Ok(CheckoutSession {
            id: "cs_test_fake".into(),
            url: Some("https://checkout.stripe.test/cs_test_fake".into()),
        })
    }
}

pub fn test_config() -> Settings {
    let mut config = Settings::new_for_test().expect("Failed to load test config");
    if let Ok(url) = std::env::var("TEST_DATABASE_URL") {
        config.database.url = url;
    }
    config
}

/// State over a pool that never connects unless a query runs.
pub fn lazy_state() -> AppState {
    let config = test_config();
    let db = DbOperations::new_lazy(&config.database.url, 2).expect("lazy pool");
    AppState::from_parts(config, db)
        .expect("state")
        .with_payments(Arc::new(FakeGateway))
}

/// State over a migrated database, for tests run with `--ignored`.
pub async fn db_state() -> AppState {
    let state = AppState::new(test_config()).await.expect("database connection");
    state.db.run_migrations().await.expect("migrations");
    state.with_payments(Arc::new(FakeGateway))
}

pub fn unique_email(prefix: &str) -> String {
    format!("{}-{}@example.com", prefix, Uuid::new_v4().simple())
}

pub fn access_token_for(state: &AppState, user: &User) -> String {
    state.auth.keys().issue_access(user).expect("access token")
}

pub fn guest_user() -> User {
    let user = User::new("Guest".into(), unique_email("guest"), None);
    assert_eq!(user.role, ROLE_USER);
    user
}

/// Stores an available listing of the given type ("rent" or "sale").
pub async fn create_listing(state: &AppState, owner_id: Uuid, listing_type: &str) -> Property {
    state
        .db
        .create_property(
            &NewProperty {
                owner_id,
                category_id: None,
                title: "Cabin".into(),
                description: "Quiet cabin".into(),
                listing_type: listing_type.into(),
                price: 120.0,
                address: "1 Forest Road".into(),
                city: "Bergen".into(),
                country: "Norway".into(),
                latitude: None,
                longitude: None,
                bedrooms: 2,
                bathrooms: 1,
                area: None,
                max_guests: Some(4),
            },
            &[],
            &[],
        )
        .await
        .expect("create property")
}
