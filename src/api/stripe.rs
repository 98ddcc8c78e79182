use crate::api::response;
use crate::auth::extractor::AuthenticatedUser;
use crate::error::{AppError, PaymentError};
use crate::payments::stripe::{verify_signature, SIGNATURE_HEADER};
use crate::payments::webhook::{self, StripeEvent, WebhookAction};
use crate::payments::{CheckoutMode, CheckoutRequest, LineItem};
use crate::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::{error, info, warn};

/// Stripe webhook. The body is taken raw because the signature covers
/// the exact bytes Stripe sent.
pub async fn webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let header = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| PaymentError::InvalidSignature("missing Stripe-Signature header".into()))?;

    let stripe = &state.config.stripe;
    if let Err(e) = verify_signature(
        &body,
        header,
        &stripe.webhook_secret,
        stripe.webhook_tolerance_secs,
        chrono::Utc::now().timestamp(),
    ) {
        warn!("Rejected Stripe webhook: {}", e);
        return Err(e);
    }

    let event: StripeEvent =
        serde_json::from_slice(&body).map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;
    info!("Received Stripe event {} ({})", event.id, event.event_type);

    let action = match webhook::classify(&event) {
        Ok(action) => action,
        Err(e) => {
            // A malformed event will not improve on redelivery; acknowledge it
            warn!("Ignoring Stripe event {}: {}", event.id, e);
            return Ok(HttpResponse::Ok().json(serde_json::json!({ "received": true })));
        }
    };

    let touches_listings = matches!(action, WebhookAction::Purchase(_));
    if let Err(e) = webhook::apply(&state.db, state.mailer.clone(), action).await {
        // Non-2xx makes Stripe retry; recording is idempotent per session
        error!("Failed to apply Stripe event {}: {}", event.id, e);
        return Err(e);
    }
    if touches_listings {
        state
            .cache
            .invalidate_prefix(crate::api::properties::LISTING_CACHE_PREFIX)
            .await;
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "received": true })))
}

pub async fn subscription_checkout(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let price_id = state.config.stripe.subscription_price_id.clone();
    if price_id.is_empty() {
        return Err(AppError::ServiceUnavailable("Subscriptions are not configured".into()));
    }

    let request = CheckoutRequest {
        mode: CheckoutMode::Subscription,
        line_item: LineItem::Price { price_id },
        customer_email: Some(user.email.clone()),
        client_reference_id: Some(user.id.to_string()),
        metadata: vec![("user_id".into(), user.id.to_string())],
    };
    let session = state.payments.create_checkout_session(&request).await?;

    info!("Subscription checkout {} opened by user {}", session.id, user.id);
    Ok(response::ok(crate::api::reservations::CheckoutResponse::from(session)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/stripe")
            .route("", web::post().to(webhook))
            .route("/subscription", web::post().to(subscription_checkout)),
    );
}
