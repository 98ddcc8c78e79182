//! Stripe webhook events.
//!
//! [`classify`] turns a verified event into a [`WebhookAction`] without
//! touching the database; [`apply`] then performs it.

use crate::db::models::{Property, RESERVATION_BOOKING, RESERVATION_PURCHASE};
use crate::db::operations::DbOperations;
use crate::db::notifications::NewNotification;
use crate::db::reservations::{PaidCheckout, Recorded};
use crate::error::{AppError, PaymentError};
use crate::mailer::{self, Mailer};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const SUBSCRIPTION_ACTIVE: &str = "active";
pub const SUBSCRIPTION_CANCELED: &str = "canceled";

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
struct CheckoutSessionObject {
    id: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    client_reference_id: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SubscriptionObject {
    #[serde(default)]
    customer: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingIntent {
    pub session_id: String,
    pub property_id: Uuid,
    pub user_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseIntent {
    pub session_id: String,
    pub property_id: Uuid,
    pub user_id: Uuid,
    pub total_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookAction {
    Booking(BookingIntent),
    Purchase(PurchaseIntent),
    SubscriptionActivated {
        user_id: Uuid,
        customer_id: Option<String>,
    },
    SubscriptionCanceled {
        customer_id: String,
    },
    Ignored(String),
}

fn metadata_uuid(metadata: &HashMap<String, String>, key: &str) -> Result<Uuid, AppError> {
    let value = metadata
        .get(key)
        .ok_or_else(|| PaymentError::InvalidPayload(format!("missing metadata.{}", key)))?;
    Uuid::parse_str(value).map_err(|_| PaymentError::InvalidPayload(format!("invalid metadata.{}", key)).into())
}

fn metadata_date(metadata: &HashMap<String, String>, key: &str) -> Result<NaiveDate, AppError> {
    let value = metadata
        .get(key)
        .ok_or_else(|| PaymentError::InvalidPayload(format!("missing metadata.{}", key)))?;
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| PaymentError::InvalidPayload(format!("invalid metadata.{}", key)).into())
}

/// Amount actually charged, falling back to the price recorded at checkout.
fn total_price(session: &CheckoutSessionObject) -> f64 {
    session
        .amount_total
        .map(|cents| cents as f64 / 100.0)
        .or_else(|| session.metadata.get("total_price").and_then(|p| p.parse().ok()))
        .unwrap_or_default()
}

fn classify_checkout(session: CheckoutSessionObject) -> Result<WebhookAction, AppError> {
    match session.mode.as_deref() {
        Some("subscription") => {
            let user_id = match session.metadata.get("user_id").or(session.client_reference_id.as_ref()) {
                Some(id) => Uuid::parse_str(id)
                    .map_err(|_| PaymentError::InvalidPayload("invalid subscription user id".into()))?,
                None => return Ok(WebhookAction::Ignored("subscription session without user".into())),
            };
            Ok(WebhookAction::SubscriptionActivated {
                user_id,
                customer_id: session.customer,
            })
        }
        Some("payment") => {
            let kind = session.metadata.get("kind").map(String::as_str);
            let has_dates = session.metadata.contains_key("start_date") && session.metadata.contains_key("end_date");

            if kind == Some(RESERVATION_PURCHASE) {
                Ok(WebhookAction::Purchase(PurchaseIntent {
                    property_id: metadata_uuid(&session.metadata, "property_id")?,
                    user_id: metadata_uuid(&session.metadata, "user_id")?,
                    total_price: total_price(&session),
                    session_id: session.id,
                }))
            } else if kind == Some(RESERVATION_BOOKING) || has_dates {
                let start_date = metadata_date(&session.metadata, "start_date")?;
                let end_date = metadata_date(&session.metadata, "end_date")?;
                if start_date >= end_date {
                    return Err(PaymentError::InvalidPayload("booking dates are inverted".into()).into());
                }
                Ok(WebhookAction::Booking(BookingIntent {
                    property_id: metadata_uuid(&session.metadata, "property_id")?,
                    user_id: metadata_uuid(&session.metadata, "user_id")?,
                    total_price: total_price(&session),
                    start_date,
                    end_date,
                    session_id: session.id,
                }))
            } else {
                Ok(WebhookAction::Ignored("payment session without reservation metadata".into()))
            }
        }
        other => Ok(WebhookAction::Ignored(format!("unhandled checkout mode {:?}", other))),
    }
}

pub fn classify(event: &StripeEvent) -> Result<WebhookAction, AppError> {
    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let session: CheckoutSessionObject = serde_json::from_value(event.data.object.clone())
                .map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;
            classify_checkout(session)
        }
        "customer.subscription.deleted" => {
            let subscription: SubscriptionObject = serde_json::from_value(event.data.object.clone())
                .map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;
            match subscription.customer {
                Some(customer_id) => Ok(WebhookAction::SubscriptionCanceled { customer_id }),
                None => Ok(WebhookAction::Ignored("subscription without customer".into())),
            }
        }
        other => Ok(WebhookAction::Ignored(format!("event type {}", other))),
    }
}

pub async fn apply(db: &DbOperations, mailer: Option<Arc<Mailer>>, action: WebhookAction) -> Result<(), AppError> {
    match action {
        WebhookAction::Booking(intent) => apply_booking(db, mailer, intent).await,
        WebhookAction::Purchase(intent) => apply_purchase(db, mailer, intent).await,
        WebhookAction::SubscriptionActivated { user_id, customer_id } => {
            db.set_subscription(user_id, SUBSCRIPTION_ACTIVE, customer_id.as_deref()).await?;
            db.create_notification(
                user_id,
                "subscription",
                "Subscription active",
                "Your premium subscription is now active.",
            )
            .await?;
            info!("Subscription activated for user {}", user_id);
            Ok(())
        }
        WebhookAction::SubscriptionCanceled { customer_id } => {
            let updated = db.set_subscription_by_customer(&customer_id, SUBSCRIPTION_CANCELED).await?;
            info!("Subscription canceled for customer {} ({} users)", customer_id, updated);
            Ok(())
        }
        WebhookAction::Ignored(reason) => {
            info!("Ignoring Stripe event: {}", reason);
            Ok(())
        }
    }
}

fn booking_notices(property: &Property, intent: &BookingIntent, recorded: &Recorded) -> Vec<NewNotification> {
    match recorded {
        Recorded::Inserted(_) => vec![
            NewNotification::new(
                intent.user_id,
                "reservation",
                "Booking confirmed",
                format!(
                    "Your stay at {} from {} to {} is confirmed.",
                    property.title, intent.start_date, intent.end_date
                ),
            ),
            NewNotification::new(
                property.owner_id,
                "reservation",
                "New booking",
                format!("{} was booked from {} to {}.", property.title, intent.start_date, intent.end_date),
            ),
        ],
        Recorded::Conflict(_) => vec![NewNotification::new(
            intent.user_id,
            "reservation",
            "Booking not confirmed",
            format!(
                "{} was booked by another guest for {} to {} before your payment completed. Your payment will be refunded.",
                property.title, intent.start_date, intent.end_date
            ),
        )],
        Recorded::AlreadyRecorded => Vec::new(),
    }
}

fn purchase_notices(property: &Property, intent: &PurchaseIntent, recorded: &Recorded) -> Vec<NewNotification> {
    match recorded {
        Recorded::Inserted(_) => vec![
            NewNotification::new(
                intent.user_id,
                "purchase",
                "Purchase confirmed",
                format!("Your purchase of {} is confirmed.", property.title),
            ),
            NewNotification::new(
                property.owner_id,
                "purchase",
                "Property sold",
                format!("{} has been purchased.", property.title),
            ),
        ],
        Recorded::Conflict(_) => vec![NewNotification::new(
            intent.user_id,
            "purchase",
            "Purchase not confirmed",
            format!(
                "{} was no longer available when your payment completed. Your payment will be refunded.",
                property.title
            ),
        )],
        Recorded::AlreadyRecorded => Vec::new(),
    }
}

async fn apply_booking(db: &DbOperations, mailer: Option<Arc<Mailer>>, intent: BookingIntent) -> Result<(), AppError> {
    let property = db.require_property(intent.property_id).await?;
    let checkout = PaidCheckout {
        property_id: intent.property_id,
        user_id: intent.user_id,
        total_price: intent.total_price,
        stripe_session_id: &intent.session_id,
    };
    let recorded = db
        .record_paid_booking(&checkout, intent.start_date, intent.end_date, |recorded| {
            booking_notices(&property, &intent, recorded)
        })
        .await?;

    match &recorded {
        Recorded::Inserted(reservation) => {
            info!("Booking {} confirmed for property {}", reservation.id, property.id);
        }
        Recorded::Conflict(reservation) => {
            error!(
                "Booking {} for property {} overlaps a confirmed stay, recorded as refund required",
                reservation.id, property.id
            );
            return Ok(());
        }
        Recorded::AlreadyRecorded => {
            warn!("Checkout session {} already recorded, skipping", intent.session_id);
            return Ok(());
        }
    }

    if let Some(guest) = db.get_user_by_id(intent.user_id).await? {
        mailer::send_in_background(
            mailer,
            mailer::booking_confirmation(
                &guest.email,
                &guest.name,
                &property.title,
                intent.start_date,
                intent.end_date,
                intent.total_price,
            ),
        );
    }
    Ok(())
}

async fn apply_purchase(db: &DbOperations, mailer: Option<Arc<Mailer>>, intent: PurchaseIntent) -> Result<(), AppError> {
    let property = db.require_property(intent.property_id).await?;
    let checkout = PaidCheckout {
        property_id: intent.property_id,
        user_id: intent.user_id,
        total_price: intent.total_price,
        stripe_session_id: &intent.session_id,
    };
    let recorded = db
        .record_paid_purchase(&checkout, |recorded| purchase_notices(&property, &intent, recorded))
        .await?;

    match &recorded {
        Recorded::Inserted(_) => info!("Property {} sold to user {}", property.id, intent.user_id),
        Recorded::Conflict(reservation) => {
            error!(
                "Purchase {} for property {} arrived after it left the market, recorded as refund required",
                reservation.id, property.id
            );
            return Ok(());
        }
        Recorded::AlreadyRecorded => {
            warn!("Checkout session {} already recorded, skipping", intent.session_id);
            return Ok(());
        }
    }

    if let Some(buyer) = db.get_user_by_id(intent.user_id).await? {
        mailer::send_in_background(
            mailer,
            mailer::purchase_confirmation(&buyer.email, &buyer.name, &property.title, intent.total_price),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Reservation;
    use serde_json::json;

    fn event(event_type: &str, object: serde_json::Value) -> StripeEvent {
        serde_json::from_value(json!({
            "id": "evt_1",
            "type": event_type,
            "data": { "object": object }
        }))
        .unwrap()
    }

    #[test]
    fn test_booking_session() {
        let property_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let action = classify(&event(
            "checkout.session.completed",
            json!({
                "id": "cs_1",
                "mode": "payment",
                "amount_total": 45000,
                "metadata": {
                    "kind": "booking",
                    "property_id": property_id.to_string(),
                    "user_id": user_id.to_string(),
                    "start_date": "2030-07-01",
                    "end_date": "2030-07-04"
                }
            }),
        ))
        .unwrap();

        assert_eq!(
            action,
            WebhookAction::Booking(BookingIntent {
                session_id: "cs_1".into(),
                property_id,
                user_id,
                start_date: NaiveDate::from_ymd_opt(2030, 7, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2030, 7, 4).unwrap(),
                total_price: 450.0,
            })
        );
    }

    #[test]
    fn test_purchase_session() {
        let action = classify(&event(
            "checkout.session.completed",
            json!({
                "id": "cs_2",
                "mode": "payment",
                "metadata": {
                    "kind": "purchase",
                    "property_id": Uuid::new_v4().to_string(),
                    "user_id": Uuid::new_v4().to_string(),
                    "total_price": "250000"
                }
            }),
        ))
        .unwrap();

        match action {
            WebhookAction::Purchase(intent) => assert_eq!(intent.total_price, 250000.0),
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_subscription_session() {
        let user_id = Uuid::new_v4();
        let action = classify(&event(
            "checkout.session.completed",
            json!({
                "id": "cs_3",
                "mode": "subscription",
                "customer": "cus_1",
                "client_reference_id": user_id.to_string()
            }),
        ))
        .unwrap();

        assert_eq!(
            action,
            WebhookAction::SubscriptionActivated {
                user_id,
                customer_id: Some("cus_1".into())
            }
        );
    }

    #[test]
    fn test_subscription_deleted() {
        let action = classify(&event("customer.subscription.deleted", json!({ "customer": "cus_9" }))).unwrap();
        assert_eq!(
            action,
            WebhookAction::SubscriptionCanceled {
                customer_id: "cus_9".into()
            }
        );
    }

    #[test]
    fn test_unrelated_events_are_ignored() {
        let action = classify(&event("invoice.paid", json!({ "id": "in_1" }))).unwrap();
        assert!(matches!(action, WebhookAction::Ignored(_)));

        let action = classify(&event(
            "checkout.session.completed",
            json!({ "id": "cs_4", "mode": "payment", "metadata": {} }),
        ))
        .unwrap();
        assert!(matches!(action, WebhookAction::Ignored(_)));
    }

    #[test]
    fn test_malformed_booking_metadata() {
        let err = classify(&event(
            "checkout.session.completed",
            json!({
                "id": "cs_5",
                "mode": "payment",
                "metadata": {
                    "kind": "booking",
                    "property_id": "not-a-uuid",
                    "user_id": Uuid::new_v4().to_string(),
                    "start_date": "2030-07-01",
                    "end_date": "2030-07-04"
                }
            }),
        ))
        .unwrap_err();
        assert!(matches!(err, AppError::PaymentError(PaymentError::InvalidPayload(_))));

        let err = classify(&event(
            "checkout.session.completed",
            json!({
                "id": "cs_6",
                "mode": "payment",
                "metadata": {
                    "kind": "booking",
                    "property_id": Uuid::new_v4().to_string(),
                    "user_id": Uuid::new_v4().to_string(),
                    "start_date": "2030-07-04",
                    "end_date": "2030-07-01"
                }
            }),
        ))
        .unwrap_err();
        assert!(matches!(err, AppError::PaymentError(_)));
    }

    fn listing(owner_id: Uuid) -> Property {
        let now = chrono::Utc::now();
        Property {
            id: Uuid::new_v4(),
            owner_id,
            category_id: None,
            title: "Harbour loft".into(),
            description: "Two rooms by the water".into(),
            listing_type: "rent".into(),
            status: "available".into(),
            price: 150.0,
            address: "1 Quay Street".into(),
            city: "Lisbon".into(),
            country: "Portugal".into(),
            latitude: None,
            longitude: None,
            bedrooms: 2,
            bathrooms: 1,
            area: None,
            max_guests: Some(4),
            created_at: now,
            updated_at: now,
        }
    }

    fn reservation(status: &str) -> Reservation {
        Reservation {
            id: Uuid::new_v4(),
            property_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind: RESERVATION_BOOKING.into(),
            start_date: None,
            end_date: None,
            total_price: 450.0,
            status: status.into(),
            stripe_session_id: Some("cs_1".into()),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_booking_notices_follow_outcome() {
        let owner = Uuid::new_v4();
        let property = listing(owner);
        let intent = BookingIntent {
            session_id: "cs_1".into(),
            property_id: property.id,
            user_id: Uuid::new_v4(),
            start_date: NaiveDate::from_ymd_opt(2030, 7, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2030, 7, 4).unwrap(),
            total_price: 450.0,
        };

        let confirmed = booking_notices(&property, &intent, &Recorded::Inserted(reservation("confirmed")));
        let recipients: Vec<Uuid> = confirmed.iter().map(|n| n.user_id).collect();
        assert_eq!(recipients, vec![intent.user_id, owner]);

        let conflict = booking_notices(&property, &intent, &Recorded::Conflict(reservation("refund_required")));
        assert_eq!(conflict.len(), 1);
        assert_eq!(conflict[0].user_id, intent.user_id);
        assert!(conflict[0].message.contains("refunded"));

        assert!(booking_notices(&property, &intent, &Recorded::AlreadyRecorded).is_empty());
    }

    #[test]
    fn test_purchase_conflict_only_tells_the_buyer() {
        let property = listing(Uuid::new_v4());
        let intent = PurchaseIntent {
            session_id: "cs_2".into(),
            property_id: property.id,
            user_id: Uuid::new_v4(),
            total_price: 250000.0,
        };

        let notices = purchase_notices(&property, &intent, &Recorded::Conflict(reservation("refund_required")));
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].user_id, intent.user_id);
        assert_eq!(notices[0].kind, "purchase");
        assert_eq!(purchase_notices(&property, &intent, &Recorded::Inserted(reservation("confirmed"))).len(), 2);
    }
}
