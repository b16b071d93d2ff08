use actix_web::{
    http::{header::ContentType, StatusCode},
    test,
    test::TestRequest,
    web::ServiceConfig,
    App,
};
use checkout_common::{Money, Secret};
use checkout_engine::{
    db_types::{NewOrder, NewProduct, Product, Tenant},
    events::EventProducers,
    traits::{InventoryManagement, TenantManagement},
    CheckoutApi,
    MemoryDatabase,
    PaymentReconciliationApi,
};
use chrono::Duration;
use log::debug;

use crate::server::configure_routes;

pub const SECRET: &str = "SB-Mid-server-test-secret";

/// A single tenant with two products: 5 kopi and 1 teh.
pub struct TestShop {
    pub db: MemoryDatabase,
    pub tenant: Tenant,
    pub kopi: Product,
    pub teh: Product,
}

impl TestShop {
    pub async fn new() -> Self {
        let _ = env_logger::try_init().ok();
        let db = MemoryDatabase::new();
        let tenant = db.insert_tenant("Toko Kopi", Secret::new(SECRET.to_string())).await.unwrap();
        let kopi = db.insert_product(NewProduct::new(tenant.id, "kopi", 5)).await.unwrap();
        let teh = db.insert_product(NewProduct::new(tenant.id, "teh", 1)).await.unwrap();
        Self { db, tenant, kopi, teh }
    }

    pub fn checkout_api(&self) -> CheckoutApi<MemoryDatabase> {
        CheckoutApi::new(self.db.clone(), Duration::minutes(15))
    }

    pub fn configure(&self) -> impl FnOnce(&mut ServiceConfig) {
        let checkout_api = self.checkout_api();
        let reconciliation_api = PaymentReconciliationApi::new(self.db.clone(), EventProducers::default());
        move |cfg| configure_routes(cfg, checkout_api, reconciliation_api)
    }

    pub fn order_json(&self, reference: &str, kopi: i64, teh: i64) -> String {
        let mut order = NewOrder::new(self.tenant.id, reference, Money::from_major(50_000));
        if kopi > 0 {
            order = order.with_item(self.kopi.id, kopi);
        }
        if teh > 0 {
            order = order.with_item(self.teh.id, teh);
        }
        serde_json::to_string(&order).unwrap()
    }

    pub async fn post(&self, path: &str, body: String) -> (StatusCode, String) {
        post_request(path, body, self.configure()).await
    }

    pub async fn available(&self, product: &Product) -> i64 {
        self.db.available_to_sell(product.id).await.unwrap()
    }
}

pub async fn post_request(
    path: &str,
    body: String,
    configure: impl FnOnce(&mut ServiceConfig),
) -> (StatusCode, String) {
    let req = TestRequest::post().uri(path).insert_header(ContentType::json()).set_payload(body).to_request();
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request to {path}");
    let res = test::call_service(&service, req).await;
    let status = res.status();
    let body = test::read_body(res).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}
