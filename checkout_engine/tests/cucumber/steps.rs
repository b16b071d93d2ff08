use checkout_common::Money;
use checkout_engine::{
    db_types::{NewOrder, NewProduct, OrderStatusType, ReservationStatus},
    notification_objects::NotificationOutcome,
    test_utils::signing::{notification_body, signed_notification},
    traits::{InventoryManagement, OrderManagement},
};
use chrono::{Duration, Utc};
use cucumber::{given, then, when};

use crate::cucumber::{CheckoutSystem, CheckoutWorld};

#[given(expr = "a shop {string} with signing secret {string} and a reservation time of {int} minutes")]
async fn fresh_shop(world: &mut CheckoutWorld, shop: String, secret: String, ttl: i64) {
    world.system = Some(CheckoutSystem::new(&shop, &secret, ttl).await);
}

#[given(expr = "the product {string} with {int} units in stock")]
async fn add_product(world: &mut CheckoutWorld, name: String, stock: i64) {
    let system = world.system_mut();
    let product = system
        .db
        .insert_product(NewProduct::new(system.tenant.id, name.clone(), stock))
        .await
        .expect("Error creating product");
    system.products.insert(name, product);
}

#[when(expr = "a customer places order {word} for {int} x {string} costing {word}")]
async fn place_order(world: &mut CheckoutWorld, reference: String, quantity: i64, name: String, total: String) {
    let system = world.system();
    let total = total.parse::<Money>().expect("Invalid amount");
    let order = NewOrder::new(system.tenant.id, reference, total).with_item(system.product(&name).id, quantity);
    world.last_checkout_error = system.checkout.place_order(order).await.err().map(|e| e.to_string());
}

#[when(expr = "the gateway sends a signed {string} notification with transaction id {word} for order {word} and amount {word}")]
async fn signed_gateway_notification(
    world: &mut CheckoutWorld,
    status: String,
    txid: String,
    reference: String,
    amount: String,
) {
    let system = world.system();
    let notification = signed_notification(&txid, &reference, &status, &amount, &system.secret);
    let result = system.reconciliation.process_raw_notification(&notification_body(&notification)).await;
    world.last_notification = Some(result.map_err(|e| e.to_string()));
}

#[when(
    expr = "the gateway sends a {string} notification with transaction id {word} for order {word} signed for {word} but \
            claiming {word}"
)]
async fn tampered_gateway_notification(
    world: &mut CheckoutWorld,
    status: String,
    txid: String,
    reference: String,
    signed_amount: String,
    claimed_amount: String,
) {
    let system = world.system();
    let mut notification = signed_notification(&txid, &reference, &status, &signed_amount, &system.secret);
    notification.gross_amount = claimed_amount;
    let result = system.reconciliation.process_raw_notification(&notification_body(&notification)).await;
    world.last_notification = Some(result.map_err(|e| e.to_string()));
}

#[when(expr = "the expiry sweeper runs {int} minutes from now")]
async fn sweep(world: &mut CheckoutWorld, minutes: i64) {
    let system = world.system();
    let result = system
        .reservations
        .sweep_expired_reservations(Utc::now() + Duration::minutes(minutes))
        .await
        .expect("Error sweeping reservations");
    assert_eq!(result.failed, 0);
}

#[then(expr = "the checkout fails with {string}")]
async fn checkout_failed(world: &mut CheckoutWorld, message: String) {
    let err = world.last_checkout_error.as_ref().expect("The last checkout succeeded");
    assert!(err.contains(&message), "Expected '{message}' in '{err}'");
}

#[then(expr = "the notification is accepted as {string}")]
async fn notification_accepted(world: &mut CheckoutWorld, expected: String) {
    let result = world.last_notification.as_ref().expect("No notification has been sent");
    let outcome = result.as_ref().unwrap_or_else(|e| panic!("The notification was rejected: {e}"));
    let kind = match outcome {
        NotificationOutcome::AlreadyProcessed => "already processed",
        NotificationOutcome::Paid { inventory_failure: None, .. } => "paid",
        NotificationOutcome::Paid { inventory_failure: Some(_), .. } => "paid with inventory failure",
        NotificationOutcome::Pending { .. } => "pending",
        NotificationOutcome::Cancelled { .. } => "cancelled",
        NotificationOutcome::Unhandled { .. } => "unhandled",
    };
    assert_eq!(kind, expected);
}

#[then(expr = "the notification is rejected with {string}")]
async fn notification_rejected(world: &mut CheckoutWorld, message: String) {
    let result = world.last_notification.as_ref().expect("No notification has been sent");
    match result {
        Ok(outcome) => panic!("The notification was accepted: {outcome:?}"),
        Err(e) => assert!(e.contains(&message), "Expected '{message}' in '{e}'"),
    }
}

#[then(expr = "order {word} is {word}")]
async fn order_status(world: &mut CheckoutWorld, reference: String, status: String) {
    let expected = status.parse::<OrderStatusType>().expect("Invalid order status");
    let order = world.system().order(&reference).await;
    assert_eq!(order.status, expected, "Status of order {reference} is incorrect");
}

#[then(expr = "order {word} has the note {string}")]
async fn order_note(world: &mut CheckoutWorld, reference: String, note: String) {
    let system = world.system();
    let order = system.order(&reference).await;
    let notes = system.db.fetch_notes_for_order(order.id).await.expect("Error fetching notes");
    assert!(notes.iter().any(|n| n.note == note), "Note '{note}' not found in {notes:?}");
}

#[then(expr = "the reservations for order {word} are {word}")]
async fn reservation_status(world: &mut CheckoutWorld, reference: String, status: String) {
    let expected = status.parse::<ReservationStatus>().expect("Invalid reservation status");
    let system = world.system();
    let order = system.order(&reference).await;
    let reservations = system.db.fetch_reservations_for_order(order.id).await.expect("Error fetching reservations");
    assert!(!reservations.is_empty(), "Order {reference} has no reservations");
    assert!(reservations.iter().all(|r| r.status == expected), "Unexpected reservations: {reservations:?}");
}

#[then(expr = "{string} has {int} in stock and {int} available to sell")]
async fn stock_levels(world: &mut CheckoutWorld, name: String, stock: i64, available: i64) {
    let system = world.system();
    let id = system.product(&name).id;
    let product = system.db.fetch_product(id).await.expect("Error fetching product").expect("Product vanished");
    assert_eq!(product.stock_quantity, stock, "Stock quantity of {name} is incorrect");
    let ats = system.db.available_to_sell(id).await.expect("Error fetching available to sell");
    assert_eq!(ats, available, "Available to sell of {name} is incorrect");
}
