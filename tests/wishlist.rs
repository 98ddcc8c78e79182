use actix_web::{test, web, App};
use estatehub_server::api;
use estatehub_server::db::properties::NewProperty;

mod common;

#[actix_web::test]
async fn test_wishlist_requires_auth() {
    let state = common::lazy_state();
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(api::configure)).await;

    let response = test::TestRequest::get().uri("/api/users/wishlist").send_request(&app).await;
    assert_eq!(response.status(), 401);
}

#[actix_web::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_toggle_twice_restores_membership() {
    let state = common::db_state().await;
    let owner = state.db.create_user(&common::guest_user()).await.unwrap();
    let guest = state.db.create_user(&common::guest_user()).await.unwrap();
    let property = state
        .db
        .create_property(
            &NewProperty {
                owner_id: owner.id,
                category_id: None,
                title: "Loft".into(),
                description: "Open plan loft".into(),
                listing_type: "sale".into(),
                price: 250_000.0,
                address: "5 Canal Street".into(),
                city: "Amsterdam".into(),
                country: "Netherlands".into(),
                latitude: None,
                longitude: None,
                bedrooms: 1,
                bathrooms: 1,
                area: Some(70.0),
                max_guests: None,
            },
            &[],
            &[],
        )
        .await
        .unwrap();

    let token = common::access_token_for(&state, &guest);
    let db = state.db.clone();
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(api::configure)).await;
    let uri = format!("/api/users/wishlist/{}", property.id);

    let response = test::TestRequest::post()
        .uri(&uri)
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = test::read_body_json(response).await;
    assert_eq!(body["data"]["in_wishlist"], true);
    assert!(db.is_in_wishlist(guest.id, property.id).await.unwrap());

    let response = test::TestRequest::post()
        .uri(&uri)
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .send_request(&app)
        .await;
    let body: serde_json::Value = test::read_body_json(response).await;
    assert_eq!(body["data"]["in_wishlist"], false);
    assert!(!db.is_in_wishlist(guest.id, property.id).await.unwrap());
}
