use crate::api::response;
use crate::auth::extractor::AuthenticatedUser;
use crate::db::models::{
    ListingType, Property, PropertyStatus, RESERVATION_BOOKING, RESERVATION_PURCHASE,
};
use crate::error::AppError;
use crate::payments::{CheckoutMode, CheckoutRequest, CheckoutSession, LineItem};
use crate::AppState;
use actix_web::{web, HttpResponse};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

const OWNER_LIST_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct BookingCheckoutRequest {
    pub property_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseCheckoutRequest {
    pub property_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: Option<String>,
    pub session_id: String,
}

impl From<CheckoutSession> for CheckoutResponse {
    fn from(session: CheckoutSession) -> Self {
        Self {
            url: session.url,
            session_id: session.id,
        }
    }
}

/// Number of nights and the price for a stay, checking the dates first.
pub fn booking_total(
    nightly_price: f64,
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
) -> Result<(i64, f64), AppError> {
    if start >= end {
        return Err(AppError::ValidationError("end_date must be after start_date".into()));
    }
    if start < today {
        return Err(AppError::ValidationError("start_date cannot be in the past".into()));
    }
    let nights = (end - start).num_days();
    Ok((nights, nights as f64 * nightly_price))
}

fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

fn ensure_available(property: &Property, expected: ListingType) -> Result<(), AppError> {
    if ListingType::parse(&property.listing_type) != Some(expected) {
        let message = match expected {
            ListingType::Rent => "This property is not available for rent",
            ListingType::Sale => "This property is not for sale",
        };
        return Err(AppError::ValidationError(message.into()));
    }
    if PropertyStatus::parse(&property.status) != Some(PropertyStatus::Available) {
        return Err(AppError::ValidationError("This property is not available".into()));
    }
    Ok(())
}

pub async fn booking_checkout(
    user: AuthenticatedUser,
    req: web::Json<BookingCheckoutRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let property = state.db.require_property(req.property_id).await?;
    ensure_available(&property, ListingType::Rent)?;
    if property.owner_id == user.id {
        return Err(AppError::ValidationError("You cannot book your own property".into()));
    }

    let (nights, total) = booking_total(property.price, req.start_date, req.end_date, Utc::now().date_naive())?;
    if state
        .db
        .has_overlapping_booking(property.id, req.start_date, req.end_date)
        .await?
    {
        warn!("Booking request for {} overlaps an existing stay", property.id);
        return Err(AppError::Conflict("The selected dates are already booked".into()));
    }

    let request = CheckoutRequest {
        mode: CheckoutMode::Payment,
        line_item: LineItem::Amount {
            name: format!("{} ({} nights)", property.title, nights),
            unit_amount: to_cents(total),
        },
        customer_email: Some(user.email.clone()),
        client_reference_id: Some(user.id.to_string()),
        metadata: vec![
            ("kind".into(), RESERVATION_BOOKING.into()),
            ("property_id".into(), property.id.to_string()),
            ("user_id".into(), user.id.to_string()),
            ("start_date".into(), req.start_date.to_string()),
            ("end_date".into(), req.end_date.to_string()),
            ("total_price".into(), format!("{:.2}", total)),
        ],
    };
    let session = state.payments.create_checkout_session(&request).await?;

    info!("Booking checkout {} opened by user {} for property {}", session.id, user.id, property.id);
    Ok(response::ok(CheckoutResponse::from(session)))
}

pub async fn purchase_checkout(
    user: AuthenticatedUser,
    req: web::Json<PurchaseCheckoutRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let property = state.db.require_property(req.property_id).await?;
    ensure_available(&property, ListingType::Sale)?;
    if property.owner_id == user.id {
        return Err(AppError::ValidationError("You cannot buy your own property".into()));
    }

    let request = CheckoutRequest {
        mode: CheckoutMode::Payment,
        line_item: LineItem::Amount {
            name: property.title.clone(),
            unit_amount: to_cents(property.price),
        },
        customer_email: Some(user.email.clone()),
        client_reference_id: Some(user.id.to_string()),
        metadata: vec![
            ("kind".into(), RESERVATION_PURCHASE.into()),
            ("property_id".into(), property.id.to_string()),
            ("user_id".into(), user.id.to_string()),
            ("total_price".into(), format!("{:.2}", property.price)),
        ],
    };
    let session = state.payments.create_checkout_session(&request).await?;

    info!("Purchase checkout {} opened by user {} for property {}", session.id, user.id, property.id);
    Ok(response::ok(CheckoutResponse::from(session)))
}

pub async fn my_reservations(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    Ok(response::ok(state.db.list_reservations_for_user(user.id).await?))
}

pub async fn owner_reservations(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    Ok(response::ok(
        state.db.list_reservations_for_owner(user.id, OWNER_LIST_LIMIT).await?,
    ))
}

pub async fn get_reservation(
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let reservation = state
        .db
        .get_reservation(path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Reservation not found".into()))?;

    if reservation.user_id != user.id && reservation.owner_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden("You cannot view this reservation".into()));
    }
    Ok(response::ok(reservation))
}

pub async fn cancel_reservation(
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let reservation = state
        .db
        .get_reservation(path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Reservation not found".into()))?;

    let is_guest = reservation.user_id == user.id;
    if !is_guest && reservation.owner_id != user.id {
        return Err(AppError::Forbidden("You cannot cancel this reservation".into()));
    }

    let cancelled = state.db.cancel_reservation(reservation.id).await?;
    if cancelled.kind == RESERVATION_PURCHASE {
        state
            .cache
            .invalidate_prefix(crate::api::properties::LISTING_CACHE_PREFIX)
            .await;
    }

    let other_party = if is_guest { reservation.owner_id } else { reservation.user_id };
    state
        .db
        .create_notification(
            other_party,
            "reservation",
            "Reservation cancelled",
            &format!("The reservation for \"{}\" was cancelled.", reservation.property_title),
        )
        .await?;

    info!("User {} cancelled reservation {}", user.id, cancelled.id);
    Ok(response::ok_with_message(cancelled, "Reservation cancelled"))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/reservations")
            .route("/checkout", web::post().to(booking_checkout))
            .route("/purchase", web::post().to(purchase_checkout))
            .route("/me", web::get().to(my_reservations))
            .route("/owner", web::get().to(owner_reservations))
            .route("/{id}", web::get().to(get_reservation))
            .route("/{id}/cancel", web::patch().to(cancel_reservation)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_booking_total() {
        let today = date("2024-06-01");
        let (nights, total) = booking_total(80.0, date("2024-06-10"), date("2024-06-13"), today).unwrap();
        assert_eq!(nights, 3);
        assert_eq!(total, 240.0);
    }

    #[test]
    fn test_booking_dates_rejected() {
        let today = date("2024-06-01");
        // Same-day and inverted ranges
        assert!(booking_total(80.0, date("2024-06-10"), date("2024-06-10"), today).is_err());
        assert!(booking_total(80.0, date("2024-06-12"), date("2024-06-10"), today).is_err());
        // Start in the past
        assert!(booking_total(80.0, date("2024-05-30"), date("2024-06-02"), today).is_err());
        // Starting today is fine
        assert!(booking_total(80.0, today, date("2024-06-02"), today).is_ok());
    }

    #[test]
    fn test_to_cents_rounds() {
        assert_eq!(to_cents(19.99), 1999);
        assert_eq!(to_cents(0.1 + 0.2), 30);
    }
}
