//! Stripe Checkout sessions and webhook handling.

pub mod stripe;
pub mod webhook;

pub use stripe::{CheckoutMode, CheckoutRequest, CheckoutSession, LineItem, PaymentGateway, StripeClient};
pub use webhook::{StripeEvent, WebhookAction};
