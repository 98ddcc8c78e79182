use crate::config::StripeConfig;
use crate::error::{AppError, PaymentError};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{error, info};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMode {
    Payment,
    Subscription,
}

impl CheckoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutMode::Payment => "payment",
            CheckoutMode::Subscription => "subscription",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineItem {
    /// One-off amount in the smallest currency unit.
    Amount { name: String, unit_amount: i64 },
    /// A pre-configured Stripe price (subscriptions).
    Price { price_id: String },
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub mode: CheckoutMode,
    pub line_item: LineItem,
    pub customer_email: Option<String>,
    pub client_reference_id: Option<String>,
    pub metadata: Vec<(String, String)>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession, AppError>;
}

/// Stripe REST client for hosted Checkout sessions.
pub struct StripeClient {
    http: reqwest::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Stripe expects bracketed form keys for nested objects.
    pub fn form_params(&self, request: &CheckoutRequest) -> Vec<(String, String)> {
        let mut params = vec![
            ("mode".to_string(), request.mode.as_str().to_string()),
            ("success_url".to_string(), self.config.success_url.clone()),
            ("cancel_url".to_string(), self.config.cancel_url.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
        ];

        match &request.line_item {
            LineItem::Amount { name, unit_amount } => {
                params.push(("line_items[0][price_data][currency]".into(), self.config.currency.clone()));
                params.push(("line_items[0][price_data][product_data][name]".into(), name.clone()));
                params.push(("line_items[0][price_data][unit_amount]".into(), unit_amount.to_string()));
            }
            LineItem::Price { price_id } => {
                params.push(("line_items[0][price]".into(), price_id.clone()));
            }
        }

        if let Some(email) = &request.customer_email {
            params.push(("customer_email".into(), email.clone()));
        }
        if let Some(reference) = &request.client_reference_id {
            params.push(("client_reference_id".into(), reference.clone()));
        }
        for (key, value) in &request.metadata {
            params.push((format!("metadata[{}]", key), value.clone()));
            // Subscription events carry the subscription's metadata, not the session's
            if request.mode == CheckoutMode::Subscription {
                params.push((format!("subscription_data[metadata][{}]", key), value.clone()));
            }
        }
        params
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession, AppError> {
        if self.config.secret_key.is_empty() {
            return Err(PaymentError::NotConfigured.into());
        }

        let url = format!("{}/v1/checkout/sessions", self.config.api_base.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .bearer_auth(&self.config.secret_key)
            .form(&self.form_params(request))
            .send()
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            error!("Stripe checkout session failed with {}: {}", status, body);
            return Err(PaymentError::Provider(format!("Stripe responded with {}", status)).into());
        }

        let session: CheckoutSession = res
            .json()
            .await
            .map_err(|e| PaymentError::Provider(format!("Invalid Stripe response: {}", e)))?;
        info!("Created Stripe checkout session {}", session.id);
        Ok(session)
    }
}

fn signed_mac(payload: &[u8], secret: &str, timestamp: i64) -> Result<HmacSha256, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::InternalError(format!("HMAC error: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Builds a `Stripe-Signature` header value for `payload`.
pub fn signature_header(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, AppError> {
    let signature = signed_mac(payload, secret, timestamp)?.finalize().into_bytes();
    Ok(format!("t={},v1={}", timestamp, hex::encode(signature)))
}

/// Checks a `t=..,v1=..` header against the raw request body.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), AppError> {
    if secret.is_empty() {
        return Err(PaymentError::NotConfigured.into());
    }

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(PaymentError::InvalidSignature("missing v1 signature".into()).into());
    }
    // Header values are untrusted, the difference can overflow
    let outside = now
        .checked_sub(timestamp)
        .map_or(true, |age| age.unsigned_abs() > tolerance_secs.unsigned_abs());
    if outside {
        return Err(PaymentError::InvalidSignature("timestamp outside tolerance".into()).into());
    }

    let mac = signed_mac(payload, secret, timestamp)?;
    let matched = signatures
        .iter()
        .filter_map(|s| hex::decode(s).ok())
        .any(|candidate| mac.clone().verify_slice(&candidate).is_ok());

    if matched {
        Ok(())
    } else {
        Err(PaymentError::InvalidSignature("no matching signature".into()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECRET: &str = "whsec_test_secret";

    fn config(api_base: &str) -> StripeConfig {
        StripeConfig {
            secret_key: "sk_test_123".into(),
            webhook_secret: SECRET.into(),
            api_base: api_base.into(),
            currency: "usd".into(),
            success_url: "http://localhost:3000/payment/success".into(),
            cancel_url: "http://localhost:3000/payment/cancel".into(),
            subscription_price_id: "price_123".into(),
            webhook_tolerance_secs: 300,
        }
    }

    fn booking_request() -> CheckoutRequest {
        CheckoutRequest {
            mode: CheckoutMode::Payment,
            line_item: LineItem::Amount {
                name: "Sea view flat".into(),
                unit_amount: 45000,
            },
            customer_email: Some("guest@example.com".into()),
            client_reference_id: None,
            metadata: vec![("kind".into(), "booking".into())],
        }
    }

    #[test]
    fn test_valid_signature() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = signature_header(payload, SECRET, 1_700_000_000).unwrap();
        assert!(verify_signature(payload, &header, SECRET, 300, 1_700_000_100).is_ok());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let header = signature_header(br#"{"id":"evt_1"}"#, SECRET, 1_700_000_000).unwrap();
        let err = verify_signature(br#"{"id":"evt_2"}"#, &header, SECRET, 300, 1_700_000_000).unwrap_err();
        assert!(matches!(err, AppError::PaymentError(PaymentError::InvalidSignature(_))));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = b"{}";
        let header = signature_header(payload, SECRET, 1_700_000_000).unwrap();
        assert!(verify_signature(payload, &header, SECRET, 300, 1_700_000_301).is_err());
    }

    #[test]
    fn test_extreme_timestamps_rejected() {
        let payload = b"{}";
        for header in ["t=-9223372036854775808,v1=00", "t=9223372036854775807,v1=00"] {
            let err = verify_signature(payload, header, SECRET, 300, 1_700_000_000).unwrap_err();
            assert!(matches!(err, AppError::PaymentError(PaymentError::InvalidSignature(_))));
        }
        // A negative clock difference inside tolerance is fine
        let header = signature_header(payload, SECRET, 1_700_000_100).unwrap();
        assert!(verify_signature(payload, &header, SECRET, 300, 1_700_000_000).is_ok());
    }

    #[test]
    fn test_signature_is_lowercase_hex() {
        let header = signature_header(b"{}", SECRET, 1_700_000_000).unwrap();
        let sig = header.split("v1=").nth(1).unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_wrong_secret_and_malformed_headers() {
        let payload = b"{}";
        let header = signature_header(payload, "whsec_other", 1_700_000_000).unwrap();
        assert!(verify_signature(payload, &header, SECRET, 300, 1_700_000_000).is_err());
        assert!(verify_signature(payload, "garbage", SECRET, 300, 1_700_000_000).is_err());
        assert!(verify_signature(payload, "t=1700000000", SECRET, 300, 1_700_000_000).is_err());
        assert!(verify_signature(payload, "t=1700000000,v1=zz", SECRET, 300, 1_700_000_000).is_err());
    }

    #[test]
    fn test_any_matching_v1_is_accepted() {
        let payload = b"{}";
        let good = signature_header(payload, SECRET, 1_700_000_000).unwrap();
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t=1700000000,v1={},v1={}", "00".repeat(32), good_sig);
        assert!(verify_signature(payload, &header, SECRET, 300, 1_700_000_000).is_ok());
    }

    #[test]
    fn test_form_params() {
        let client = StripeClient::new(config("https://api.stripe.com"));
        let params = client.form_params(&booking_request());

        assert!(params.contains(&("mode".into(), "payment".into())));
        assert!(params.contains(&("line_items[0][price_data][unit_amount]".into(), "45000".into())));
        assert!(params.contains(&("line_items[0][price_data][currency]".into(), "usd".into())));
        assert!(params.contains(&("metadata[kind]".into(), "booking".into())));
        assert!(!params.iter().any(|(k, _)| k.starts_with("subscription_data")));
    }

    #[test]
    fn test_subscription_form_params() {
        let client = StripeClient::new(config("https://api.stripe.com"));
        let request = CheckoutRequest {
            mode: CheckoutMode::Subscription,
            line_item: LineItem::Price {
                price_id: "price_123".into(),
            },
            customer_email: None,
            client_reference_id: Some("user-1".into()),
            metadata: vec![("user_id".into(), "user-1".into())],
        };
        let params = client.form_params(&request);

        assert!(params.contains(&("line_items[0][price]".into(), "price_123".into())));
        assert!(params.contains(&("subscription_data[metadata][user_id]".into(), "user-1".into())));
    }

    #[tokio::test]
    async fn test_create_checkout_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header("authorization", "Bearer sk_test_123"))
            .and(body_string_contains("mode=payment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_test_1",
                "object": "checkout.session",
                "url": "https://checkout.stripe.com/c/pay/cs_test_1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = StripeClient::new(config(&server.uri()));
        let session = client.create_checkout_session(&booking_request()).await.unwrap();

        assert_eq!(session.id, "cs_test_1");
        assert_eq!(session.url.as_deref(), Some("https://checkout.stripe.com/c/pay/cs_test_1"));
    }

    #[tokio::test]
    async fn test_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(ResponseTemplate::new(402).set_body_json(serde_json::json!({
                "error": { "message": "card declined" }
            })))
            .mount(&server)
            .await;

        let client = StripeClient::new(config(&server.uri()));
        let err = client.create_checkout_session(&booking_request()).await.unwrap_err();
        assert!(matches!(err, AppError::PaymentError(PaymentError::Provider(_))));
    }

    #[tokio::test]
    async fn test_missing_secret_key() {
        let mut config = config("http://unused");
        config.secret_key.clear();
        let client = StripeClient::new(config);

        let err = client.create_checkout_session(&booking_request()).await.unwrap_err();
        assert!(matches!(err, AppError::PaymentError(PaymentError::NotConfigured)));
    }
}
