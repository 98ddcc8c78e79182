use actix_web::{test, web, App};
use chrono::{Duration, NaiveDate, Utc};
use estatehub_server::api;
use estatehub_server::db::models::PropertyStatus;
use estatehub_server::db::reservations::{PaidCheckout, Recorded};
use estatehub_server::payments::stripe::signature_header;
use serde_json::json;
use uuid::Uuid;

mod common;

const SECRET: &str = "whsec_test_secret";

fn day(offset: i64) -> NaiveDate {
    Utc::now().date_naive() + Duration::days(offset)
}

fn checkout_event(session_id: &str, metadata: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": format!("evt_{}", session_id),
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "mode": "payment",
                "amount_total": 36000,
                "metadata": metadata
            }
        }
    }))
    .unwrap()
}

fn session_id() -> String {
    format!("cs_test_{}", Uuid::new_v4().simple())
}

#[actix_web::test]
async fn test_booking_checkout_requires_login() {
    let state = common::lazy_state();
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(api::configure)).await;

    let response = test::TestRequest::post()
        .uri("/api/reservations/checkout")
        .set_json(json!({
            "property_id": Uuid::new_v4(),
            "start_date": day(30),
            "end_date": day(33)
        }))
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 401);
}

#[actix_web::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_booking_checkout_respects_existing_stays() {
    let state = common::db_state().await;
    let owner = state.db.create_user(&common::guest_user()).await.unwrap();
    let first_guest = state.db.create_user(&common::guest_user()).await.unwrap();
    let second_guest = state.db.create_user(&common::guest_user()).await.unwrap();
    let property = common::create_listing(&state, owner.id, "rent").await;

    let session = session_id();
    let recorded = state
        .db
        .record_paid_booking(
            &PaidCheckout {
                property_id: property.id,
                user_id: first_guest.id,
                total_price: 360.0,
                stripe_session_id: &session,
            },
            day(40),
            day(43),
            |_| Vec::new(),
        )
        .await
        .unwrap();
    assert!(matches!(recorded, Recorded::Inserted(_)));

    let token = common::access_token_for(&state, &second_guest);
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(api::configure)).await;
    let request_stay = |start: NaiveDate, end: NaiveDate| {
        test::TestRequest::post()
            .uri("/api/reservations/checkout")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(json!({ "property_id": property.id, "start_date": start, "end_date": end }))
    };

    // Starts inside the confirmed stay
    let response = request_stay(day(41), day(44)).send_request(&app).await;
    assert_eq!(response.status(), 409);

    // Covers it entirely
    let response = request_stay(day(39), day(45)).send_request(&app).await;
    assert_eq!(response.status(), 409);

    // Checking in on the previous guest's checkout day is fine
    let response = request_stay(day(43), day(46)).send_request(&app).await;
    assert_eq!(response.status(), 200);

    // And checking out on their check-in day
    let response = request_stay(day(37), day(40)).send_request(&app).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = test::read_body_json(response).await;
    assert_eq!(body["data"]["session_id"], "cs_test_fake");
}

#[actix_web::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_overlapping_paid_booking_is_flagged_for_refund() {
    let state = common::db_state().await;
    let owner = state.db.create_user(&common::guest_user()).await.unwrap();
    let first_guest = state.db.create_user(&common::guest_user()).await.unwrap();
    let second_guest = state.db.create_user(&common::guest_user()).await.unwrap();
    let property = common::create_listing(&state, owner.id, "rent").await;

    let db = state.db.clone();
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(api::configure)).await;

    // Both guests opened checkout before either paid
    let stays = [(&first_guest, day(50), day(54)), (&second_guest, day(52), day(55))];
    for (guest, start, end) in stays {
        let payload = checkout_event(
            &session_id(),
            json!({
                "kind": "booking",
                "property_id": property.id.to_string(),
                "user_id": guest.id.to_string(),
                "start_date": start.to_string(),
                "end_date": end.to_string()
            }),
        );
        let header = signature_header(&payload, SECRET, Utc::now().timestamp()).unwrap();
        let response = test::TestRequest::post()
            .uri("/api/stripe")
            .insert_header(("Stripe-Signature", header))
            .set_payload(payload)
            .send_request(&app)
            .await;
        assert_eq!(response.status(), 200);
    }

    let first = db.list_reservations_for_user(first_guest.id).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].status, "confirmed");

    let second = db.list_reservations_for_user(second_guest.id).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].status, "refund_required");

    // Only the confirmed stay blocks the calendar
    let booked = db.get_booked_ranges(property.id).await.unwrap();
    assert_eq!(booked.len(), 1);

    let (notices, _, _) = db.list_notifications(second_guest.id, 10, 0).await.unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].title, "Booking not confirmed");
}

#[actix_web::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_listing_is_sold_once() {
    let state = common::db_state().await;
    let owner = state.db.create_user(&common::guest_user()).await.unwrap();
    let first_buyer = state.db.create_user(&common::guest_user()).await.unwrap();
    let second_buyer = state.db.create_user(&common::guest_user()).await.unwrap();
    let property = common::create_listing(&state, owner.id, "sale").await;

    let db = state.db.clone();
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(api::configure)).await;

    for buyer in [&first_buyer, &second_buyer] {
        let payload = checkout_event(
            &session_id(),
            json!({
                "kind": "purchase",
                "property_id": property.id.to_string(),
                "user_id": buyer.id.to_string()
            }),
        );
        let header = signature_header(&payload, SECRET, Utc::now().timestamp()).unwrap();
        let response = test::TestRequest::post()
            .uri("/api/stripe")
            .insert_header(("Stripe-Signature", header))
            .set_payload(payload)
            .send_request(&app)
            .await;
        assert_eq!(response.status(), 200);
    }

    let sold = db.require_property(property.id).await.unwrap();
    assert_eq!(PropertyStatus::parse(&sold.status), Some(PropertyStatus::Sold));

    let first = db.list_reservations_for_user(first_buyer.id).await.unwrap();
    assert_eq!(first[0].status, "confirmed");
    let second = db.list_reservations_for_user(second_buyer.id).await.unwrap();
    assert_eq!(second[0].status, "refund_required");

    // A refund-required row cannot be cancelled by the buyer
    assert!(db.cancel_reservation(second[0].id).await.is_err());
}
