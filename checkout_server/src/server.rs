use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use checkout_engine::{
    events::{EventHandlers, EventHooks, EventProducers, OrderAnnulledEvent, OrderPaidEvent},
    traits::CheckoutDatabase,
    CheckoutApi,
    PaymentReconciliationApi,
    ReservationApi,
    SqliteDatabase,
};
use futures::FutureExt;
use log::*;
use tokio::sync::watch;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    routes::{health, CheckoutRoute, PaymentNotificationRoute},
};

const EVENT_BUFFER_SIZE: usize = 64;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let mut db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if config.run_migrations {
        db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    }
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, logging_hooks());
    let producers = handlers.producers();
    handlers.start_handlers();

    let sweep_interval = config.sweep_interval;
    let srv = create_server_instance(config, db.clone(), producers)?;
    let (shutdown, shutdown_signal) = watch::channel(false);
    let worker = start_expiry_worker(ReservationApi::new(db.clone()), sweep_interval, shutdown_signal);

    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    info!("🚀️ Server has stopped. Waiting for the expiry worker to finish");
    // The worker may already be gone if it panicked, in which case the join below reports it.
    let _ = shutdown.send(true);
    if let Err(e) = worker.await {
        warn!("🕰️ The expiry worker did not shut down cleanly. {e}");
    }
    db.close().await;
    result
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let reservation_ttl = config.reservation_ttl;
    let srv = HttpServer::new(move || {
        let checkout_api = CheckoutApi::new(db.clone(), reservation_ttl);
        let reconciliation_api = PaymentReconciliationApi::new(db.clone(), producers.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("checkout::access_log"))
            .configure(|cfg| configure_routes(cfg, checkout_api, reconciliation_api))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Registers the engine APIs and every route against them.
pub fn configure_routes<B>(
    cfg: &mut web::ServiceConfig,
    checkout_api: CheckoutApi<B>,
    reconciliation_api: PaymentReconciliationApi<B>,
) where
    B: CheckoutDatabase + 'static,
{
    let json_config = web::JsonConfig::default()
        .error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into());
    cfg.app_data(json_config)
        .app_data(web::Data::new(checkout_api))
        .app_data(web::Data::new(reconciliation_api))
        .service(health)
        .service(CheckoutRoute::<B>::new())
        .service(PaymentNotificationRoute::<B>::new());
}

/// Hooks that record paid and annulled orders in the log. Delivery of receipts and the like hangs off the same hooks.
fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_order_paid(|ev: OrderPaidEvent| {
            async move {
                info!(
                    "📬️ Order {} was paid ({} via {}). {} line items converted",
                    ev.order.reference,
                    ev.gross_amount,
                    ev.payment_type.as_deref().unwrap_or("unknown"),
                    ev.items.len()
                );
            }
            .boxed()
        })
        .on_order_annulled(|ev: OrderAnnulledEvent| {
            async move {
                info!("📬️ Order {} was annulled: {}", ev.order.reference, ev.reason);
            }
            .boxed()
        });
    hooks
}
