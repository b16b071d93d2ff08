use actix_web::{http::StatusCode, test, App};
use checkout_engine::{
    db_types::{OrderStatusType, ReservationStatus},
    traits::OrderManagement,
    PlacedOrder,
};

use super::helpers::TestShop;
use crate::routes::health;

#[actix_web::test]
async fn health_check() {
    let service = test::init_service(App::new().service(health)).await;
    let res = test::call_service(&service, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(test::read_body(res).await, "👍️\n");
}

#[actix_web::test]
async fn checkout_holds_stock() {
    let shop = TestShop::new().await;
    let (status, body) = shop.post("/checkout", shop.order_json("INV-100", 3, 1)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let placed: PlacedOrder = serde_json::from_str(&body).unwrap();
    assert_eq!(placed.order.reference, "INV-100");
    assert_eq!(placed.order.status, OrderStatusType::Pending);
    assert_eq!(placed.reservations.len(), 2);
    assert!(placed.reservations.iter().all(|r| r.status == ReservationStatus::Active));
    assert_eq!(shop.available(&shop.kopi).await, 2);
    assert_eq!(shop.available(&shop.teh).await, 0);
}

#[actix_web::test]
async fn checkout_without_enough_stock_is_a_conflict() {
    let shop = TestShop::new().await;
    let (status, body) = shop.post("/checkout", shop.order_json("INV-101", 2, 2)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let err: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(err["error"].as_str().unwrap().contains("Insufficient stock"), "{body}");
    let order = shop.db.fetch_order_by_reference("INV-101").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Cancelled);
    assert_eq!(shop.available(&shop.kopi).await, 5);
    assert_eq!(shop.available(&shop.teh).await, 1);
}

#[actix_web::test]
async fn duplicate_order_reference_is_a_conflict() {
    let shop = TestShop::new().await;
    let (status, _) = shop.post("/checkout", shop.order_json("INV-102", 1, 0)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = shop.post("/checkout", shop.order_json("INV-102", 1, 0)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("already exists"), "{body}");
    assert_eq!(shop.available(&shop.kopi).await, 4);
}

#[actix_web::test]
async fn unknown_products_and_bad_payloads() {
    let shop = TestShop::new().await;
    let body =
        shop.order_json("INV-103", 1, 0).replace(&format!("\"product_id\":{}", shop.kopi.id), "\"product_id\":999");
    let (status, _) = shop.post("/checkout", body).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = shop.post("/checkout", "{\"reference\": 12}".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let err: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(err["error"].as_str().unwrap().starts_with("Could not read request body"));
}
