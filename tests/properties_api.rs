use actix_web::{test, web, App};
use estatehub_server::api;
use serde_json::json;

mod common;

fn listing(images: usize) -> serde_json::Value {
    json!({
        "title": "Sea view apartment",
        "description": "Two bedrooms close to the beach",
        "listing_type": "rent",
        "price": 120.0,
        "city": "Lisbon",
        "country": "Portugal",
        "latitude": 38.7223,
        "longitude": -9.1393,
        "bedrooms": 2,
        "bathrooms": 1,
        "images": (0..images).map(|i| format!("https://img.test/{}.jpg", i)).collect::<Vec<_>>(),
    })
}

#[actix_web::test]
async fn test_create_listing_requires_auth() {
    let state = common::lazy_state();
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(api::configure)).await;

    let response = test::TestRequest::post()
        .uri("/api/properties")
        .set_json(listing(6))
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 401);
}

#[actix_web::test]
async fn test_create_listing_needs_six_images() {
    let state = common::lazy_state();
    let token = common::access_token_for(&state, &common::guest_user());
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(api::configure)).await;

    let response = test::TestRequest::post()
        .uri("/api/properties")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(listing(5))
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 400);

    let body: serde_json::Value = test::read_body_json(response).await;
    assert!(body["message"].as_str().unwrap().contains('6'));
}

#[actix_web::test]
async fn test_nearby_validates_coordinates() {
    let state = common::lazy_state();
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(api::configure)).await;

    let response = test::TestRequest::get()
        .uri("/api/properties/nearby?lat=123&lng=10")
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 400);

    let response = test::TestRequest::get()
        .uri("/api/properties/nearby?lng=10")
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 400);
}

#[actix_web::test]
async fn test_search_requires_query() {
    let state = common::lazy_state();
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(api::configure)).await;

    let response = test::TestRequest::get()
        .uri("/api/properties/search?q=%20%20")
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 400);
}

#[actix_web::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_create_and_fetch_listing() {
    let state = common::db_state().await;
    let owner = state.db.create_user(&common::guest_user()).await.unwrap();
    let token = common::access_token_for(&state, &owner);
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(api::configure)).await;

    let response = test::TestRequest::post()
        .uri("/api/properties")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(listing(6))
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = test::read_body_json(response).await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let response = test::TestRequest::get()
        .uri(&format!("/api/properties/{}", id))
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = test::read_body_json(response).await;
    assert_eq!(body["data"]["title"], "Sea view apartment");
}
