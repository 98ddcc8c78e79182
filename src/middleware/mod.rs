//! Cross-cutting request middleware: security headers and the per-client
//! rate limiter.

use crate::auth::rate_limit::Bucket;
use crate::error::{AppError, AuthError};
use crate::AppState;
use actix_web::body::{BoxBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::{DefaultHeaders, Next};
use actix_web::{web, ResponseError};
use tracing::warn;

pub fn security_headers(production: bool) -> DefaultHeaders {
    let headers = DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("Referrer-Policy", "no-referrer"))
        // Legacy XSS auditors do more harm than good
        .add(("X-XSS-Protection", "0"));

    if production {
        headers.add(("Strict-Transport-Security", "max-age=31536000; includeSubDomains"))
    } else {
        headers
    }
}

/// Keys the limiter on the socket peer. Forwarding headers are client
/// supplied and would let one caller rotate through unlimited budgets.
fn client_key(req: &ServiceRequest) -> String {
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rejects clients over their window budget with 429. Health checks are exempt.
pub async fn rate_limit(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<BoxBody>, actix_web::Error> {
    if req.path() != "/health" {
        if let Some(state) = req.app_data::<web::Data<AppState>>().cloned() {
            let key = client_key(&req);
            let bucket = Bucket::for_path(req.path());
            if !state.rate_limiter.check_rate_limit(&key, bucket).await {
                warn!("Rate limit exceeded for {} on {}", key, req.path());
                let response = AppError::from(AuthError::RateLimited).error_response();
                return Ok(req.into_response(response));
            }
        }
    }

    let res = next.call(req).await?;
    Ok(res.map_into_boxed_body())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DbOperations, Settings};
    use actix_web::http::StatusCode;
    use actix_web::{middleware::from_fn, test, App, HttpResponse};

    async fn ok() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    fn state_with_limits(max_requests: u32, auth_max_requests: u32) -> AppState {
        let mut config = Settings::new_for_test().expect("Failed to load test config");
        config.rate_limit.max_requests = max_requests;
        config.rate_limit.auth_max_requests = auth_max_requests;
        let db = DbOperations::new_lazy(&config.database.url, 1).expect("lazy pool");
        AppState::from_parts(config, db).expect("state")
    }

    #[actix_web::test]
    async fn test_auth_routes_have_a_stricter_budget() {
        let state = state_with_limits(10, 2);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .wrap(from_fn(rate_limit))
                .route("/api/auth/login", web::post().to(ok))
                .route("/api/properties", web::get().to(ok)),
        )
        .await;

        for _ in 0..2 {
            let req = test::TestRequest::post().uri("/api/auth/login").to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        }
        let req = test::TestRequest::post().uri("/api/auth/login").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::TOO_MANY_REQUESTS);

        // The general budget is tracked separately
        let req = test::TestRequest::get().uri("/api/properties").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_forwarded_headers_do_not_reset_the_budget() {
        let state = state_with_limits(10, 2);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .wrap(from_fn(rate_limit))
                .route("/api/auth/login", web::post().to(ok)),
        )
        .await;

        let peer: std::net::SocketAddr = "203.0.113.7:40000".parse().unwrap();
        let mut statuses = Vec::new();
        for forwarded in ["198.51.100.1", "198.51.100.2", "198.51.100.3"] {
            let req = test::TestRequest::post()
                .uri("/api/auth/login")
                .peer_addr(peer)
                .insert_header(("X-Forwarded-For", forwarded))
                .insert_header(("Forwarded", format!("for={}", forwarded)))
                .to_request();
            statuses.push(test::call_service(&app, req).await.status());
        }
        assert_eq!(statuses, vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]);

        // Another socket peer has its own budget
        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .peer_addr("203.0.113.8:40000".parse().unwrap())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_security_headers() {
        let app = test::init_service(
            App::new()
                .wrap(security_headers(true))
                .route("/", web::get().to(ok)),
        )
        .await;

        let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        let headers = res.headers();
        assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
        assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
        assert_eq!(headers.get("Referrer-Policy").unwrap(), "no-referrer");
        assert!(headers.get("Strict-Transport-Security").is_some());
    }

    #[actix_web::test]
    async fn test_no_hsts_outside_production() {
        let app = test::init_service(
            App::new()
                .wrap(security_headers(false))
                .route("/", web::get().to(ok)),
        )
        .await;

        let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert!(res.headers().get("Strict-Transport-Security").is_none());
    }
}
