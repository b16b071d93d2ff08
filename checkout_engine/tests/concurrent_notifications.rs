//! Racing payment notifications for one order against a real SQLite database.
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use checkout_common::{Money, Secret};
use checkout_engine::{
    db_types::{NewOrder, NewProduct, OrderStatusType, ReservationStatus},
    events::{EventHandler, EventProducers, Handler, OrderPaidEvent},
    notification_objects::NotificationOutcome,
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        signing::{notification_body, signed_notification},
    },
    traits::{InventoryManagement, OrderManagement, PaymentNotificationManagement, TenantManagement},
    CheckoutApi,
    PaymentReconciliationApi,
};
use chrono::Duration;
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

const SECRET: &str = "SB-Mid-server-toko-kopi";
const ROUNDS: usize = 10;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread().worker_threads(4).enable_all().build().unwrap()
}

#[test]
fn capture_and_settlement_race_pays_once() {
    runtime().block_on(async {
        let _ = env_logger::try_init();
        let url = random_db_path();
        let mut db = prepare_test_env(&url).await;
        let tenant = db.insert_tenant("Toko Kopi", Secret::new(SECRET.to_string())).await.unwrap();
        let checkout = CheckoutApi::new(db.clone(), Duration::minutes(15));

        let paid_events = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&paid_events);
        let handler: Handler<OrderPaidEvent> = Arc::new(move |_ev| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let paid_handler = EventHandler::new(8, handler);
        let producers =
            EventProducers { order_paid_producer: vec![paid_handler.subscribe()], ..EventProducers::default() };
        let handler_task = tokio::spawn(paid_handler.start_handler());
        let api = PaymentReconciliationApi::new(db.clone(), producers);

        for round in 0..ROUNDS {
            let reference = format!("INV-R{round}");
            let kopi = db.insert_product(NewProduct::new(tenant.id, "Kopi Tubruk 250g", 5)).await.unwrap();
            let order = NewOrder::new(tenant.id, &reference, Money::from_major(150_000)).with_item(kopi.id, 2);
            let placed = checkout.place_order(order).await.unwrap();

            let txid = format!("TX-R{round}");
            let capture = notification_body(&signed_notification(&txid, &reference, "capture", "150000.00", SECRET));
            let settlement =
                notification_body(&signed_notification(&txid, &reference, "settlement", "150000.00", SECRET));
            let (a, b) = (api.clone(), api.clone());
            let first = tokio::spawn(async move { a.process_raw_notification(&capture).await });
            let second = tokio::spawn(async move { b.process_raw_notification(&settlement).await });
            for outcome in [first.await.unwrap(), second.await.unwrap()] {
                let outcome = outcome.unwrap_or_else(|e| panic!("Round {round} failed: {e}"));
                assert!(matches!(outcome, NotificationOutcome::Paid { inventory_failure: None, .. }), "{outcome:?}");
            }

            let order = db.fetch_order_by_id(placed.order.id).await.unwrap().unwrap();
            assert_eq!(order.status, OrderStatusType::Paid);
            assert_eq!(db.fetch_product(kopi.id).await.unwrap().unwrap().stock_quantity, 3, "round {round}");
            assert_eq!(db.available_to_sell(kopi.id).await.unwrap(), 3);
            let reservations = db.fetch_reservations_for_order(order.id).await.unwrap();
            assert!(reservations.iter().all(|r| r.status == ReservationStatus::Converted));
            assert_eq!(db.fetch_notifications_for_order(order.id).await.unwrap().len(), 2);
        }

        // The handler drains once the last producer is gone
        drop(api);
        handler_task.await.unwrap();
        assert_eq!(paid_events.load(Ordering::SeqCst), ROUNDS);

        db.close().await;
        if let Err(e) = Sqlite::drop_database(&url).await {
            warn!("🚀️ Could not drop test database {url}: {e}");
        }
    });
}
