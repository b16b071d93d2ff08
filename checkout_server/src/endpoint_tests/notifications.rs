use actix_web::http::StatusCode;
use checkout_engine::{
    db_types::OrderStatusType,
    test_utils::signing::{notification_body, signed_notification},
    traits::{InventoryManagement, OrderManagement, PaymentNotificationManagement},
};
use serde_json::json;

use super::helpers::{TestShop, SECRET};

const WEBHOOK: &str = "/notifications/payment";

async fn place_order(shop: &TestShop, reference: &str) -> i64 {
    let (status, body) = shop.post("/checkout", shop.order_json(reference, 2, 0)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    shop.db.fetch_order_by_reference(reference).await.unwrap().unwrap().id
}

fn outcome(body: &str) -> serde_json::Value {
    serde_json::from_str(body).unwrap()
}

#[actix_web::test]
async fn settlement_is_acknowledged_once_and_replays_are_acknowledged_too() {
    let shop = TestShop::new().await;
    let order_id = place_order(&shop, "INV-200").await;
    let body = notification_body(&signed_notification("TX-1", "INV-200", "settlement", "50000.00", SECRET));

    let (status, response) = shop.post(WEBHOOK, body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome(&response), json!({"status": "ok", "outcome": "order INV-200 paid"}));
    let order = shop.db.fetch_order_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Paid);
    assert_eq!(shop.db.fetch_product(shop.kopi.id).await.unwrap().unwrap().stock_quantity, 3);

    let (status, response) = shop.post(WEBHOOK, body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome(&response)["outcome"], "already processed");
    assert_eq!(shop.db.fetch_product(shop.kopi.id).await.unwrap().unwrap().stock_quantity, 3);
    let records = shop.db.fetch_notifications_for_order(order_id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].raw_payload, body);
}

#[actix_web::test]
async fn bad_signatures_are_forbidden() {
    let shop = TestShop::new().await;
    let order_id = place_order(&shop, "INV-201").await;
    let mut notification = signed_notification("TX-2", "INV-201", "settlement", "50000.00", SECRET);
    notification.gross_amount = "1.00".to_string();
    let (status, response) = shop.post(WEBHOOK, notification_body(&notification)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(outcome(&response)["error"].as_str().unwrap().contains("signature"));
    let order = shop.db.fetch_order_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);
    assert!(shop.db.fetch_notifications_for_order(order_id).await.unwrap().is_empty());
}

#[actix_web::test]
async fn expiry_cancels_the_order_and_frees_the_stock() {
    let shop = TestShop::new().await;
    let order_id = place_order(&shop, "INV-202").await;
    assert_eq!(shop.available(&shop.kopi).await, 3);
    let body = notification_body(&signed_notification("TX-3", "INV-202", "expire", "50000.00", SECRET));
    let (status, response) = shop.post(WEBHOOK, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome(&response)["outcome"], "order INV-202 cancelled: payment expired");
    let order = shop.db.fetch_order_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Cancelled);
    assert_eq!(shop.available(&shop.kopi).await, 5);
}

#[actix_web::test]
async fn expiry_of_a_completed_order_is_a_conflict() {
    let shop = TestShop::new().await;
    let order_id = place_order(&shop, "INV-203").await;
    let paid = notification_body(&signed_notification("TX-4", "INV-203", "settlement", "50000.00", SECRET));
    assert_eq!(shop.post(WEBHOOK, paid).await.0, StatusCode::OK);
    shop.checkout_api().complete_order(order_id).await.unwrap();

    let expired = notification_body(&signed_notification("TX-5", "INV-203", "expire", "50000.00", SECRET));
    let (status, response) = shop.post(WEBHOOK, expired).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        outcome(&response)["error"],
        "The request conflicts with the current state of the order. An order cannot move from COMPLETE to CANCELLED"
    );
    let order = shop.db.fetch_order_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Complete);
}

#[actix_web::test]
async fn unknown_orders_and_garbage() {
    let shop = TestShop::new().await;
    let body = notification_body(&signed_notification("TX-6", "INV-404", "settlement", "50000.00", SECRET));
    let (status, _) = shop.post(WEBHOOK, body).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, response) = shop.post(WEBHOOK, "not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(outcome(&response)["error"].as_str().unwrap().contains("Malformed payment notification"));
}
