use std::collections::HashMap;

use checkout_common::Secret;
use checkout_engine::{
    db_types::{Order, Product, Tenant},
    events::EventProducers,
    notification_objects::NotificationOutcome,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::{OrderManagement, TenantManagement},
    CheckoutApi,
    PaymentReconciliationApi,
    ReservationApi,
    SqliteDatabase,
};
use chrono::Duration;
use cucumber::World;
use log::*;

#[derive(Default, Debug, World)]
pub struct CheckoutWorld {
    pub system: Option<CheckoutSystem>,
    pub last_checkout_error: Option<String>,
    pub last_notification: Option<Result<NotificationOutcome, String>>,
}

#[derive(Debug)]
pub struct CheckoutSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub tenant: Tenant,
    pub secret: String,
    pub products: HashMap<String, Product>,
    pub checkout: CheckoutApi<SqliteDatabase>,
    pub reservations: ReservationApi<SqliteDatabase>,
    pub reconciliation: PaymentReconciliationApi<SqliteDatabase>,
}

impl CheckoutWorld {
    pub fn system(&self) -> &CheckoutSystem {
        self.system.as_ref().expect("The shop has not been set up")
    }

    pub fn system_mut(&mut self) -> &mut CheckoutSystem {
        self.system.as_mut().expect("The shop has not been set up")
    }
}

impl CheckoutSystem {
    pub async fn new(shop: &str, secret: &str, ttl_minutes: i64) -> Self {
        let db_path = random_db_path();
        let db = prepare_test_env(&db_path).await;
        debug!("Created database: {db_path}");
        let tenant = db.insert_tenant(shop, Secret::new(secret.to_string())).await.expect("Error creating tenant");
        let checkout = CheckoutApi::new(db.clone(), Duration::minutes(ttl_minutes));
        let reservations = ReservationApi::new(db.clone());
        let reconciliation = PaymentReconciliationApi::new(db.clone(), EventProducers::default());
        Self {
            db_path,
            db,
            tenant,
            secret: secret.to_string(),
            products: HashMap::new(),
            checkout,
            reservations,
            reconciliation,
        }
    }

    pub fn product(&self, name: &str) -> &Product {
        self.products.get(name).unwrap_or_else(|| panic!("Product {name} does not exist"))
    }

    pub async fn order(&self, reference: &str) -> Order {
        self.db
            .fetch_order_by_reference(reference)
            .await
            .expect("Error fetching order")
            .unwrap_or_else(|| panic!("Order {reference} does not exist"))
    }
}
