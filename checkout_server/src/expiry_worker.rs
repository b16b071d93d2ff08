use std::time::Duration;

use checkout_engine::{traits::InventoryManagement, ReservationApi};
use chrono::Utc;
use log::*;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

/// Starts the expiry worker, which releases reservations whose hold has lapsed.
///
/// The first sweep runs immediately, then once per `period`. Setting the `shutdown` channel to `true` (or dropping its
/// sender) stops the worker between sweeps. A sweep that has started always runs to completion, so the returned handle
/// resolves once the worker has stopped.
///
/// Must be called from within the actix system (or a tokio `LocalSet`), since the backend's futures need not be
/// `Send`.
pub fn start_expiry_worker<B>(
    api: ReservationApi<B>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    B: InventoryManagement + 'static,
{
    actix_web::rt::spawn(async move {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("🕰️ Reservation expiry worker started. Sweeping every {period:?}");
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                },
                _ = timer.tick() => {},
            }
            trace!("🕰️ Running reservation expiry sweep");
            match api.sweep_expired_reservations(Utc::now()).await {
                Ok(result) if result.released == 0 && result.failed == 0 => {},
                Ok(result) => {
                    info!("🕰️ Sweep complete. {} reservations released, {} failed", result.released, result.failed);
                },
                Err(e) => {
                    error!("🕰️ Error running the reservation expiry sweep: {e}");
                },
            }
        }
        info!("🕰️ Reservation expiry worker has stopped");
    })
}

#[cfg(test)]
mod test {
    use checkout_common::{Money, Secret};
    use checkout_engine::{
        db_types::{NewOrder, NewProduct, ReservationStatus},
        traits::{OrderManagement, TenantManagement},
        MemoryDatabase,
    };
    use chrono::Duration as ChronoDuration;

    use super::*;

    #[actix_web::test]
    async fn lapsed_holds_are_released_and_the_worker_stops_on_request() {
        let _ = env_logger::try_init();
        let db = MemoryDatabase::new();
        let tenant = db.insert_tenant("Toko", Secret::new("s".into())).await.unwrap();
        let kopi = db.insert_product(NewProduct::new(tenant.id, "kopi", 5)).await.unwrap();
        let order = db.insert_order(NewOrder::new(tenant.id, "INV-1", Money::from_major(10))).await.unwrap();
        let api = ReservationApi::new(db.clone());
        let lapsed = api.create_reservation(tenant.id, kopi.id, order.id, 2, ChronoDuration::seconds(-1));
        let lapsed = lapsed.await.unwrap();
        let live = api.create_reservation(tenant.id, kopi.id, order.id, 1, ChronoDuration::minutes(15));
        let live = live.await.unwrap();
        assert_eq!(api.available_to_sell(kopi.id).await.unwrap(), 2);

        let (tx, rx) = watch::channel(false);
        let worker = start_expiry_worker(api.clone(), Duration::from_millis(20), rx);
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), worker).await.expect("worker did not stop").unwrap();

        let reservations = api.reservations_for_order(order.id).await.unwrap();
        let status_of = |id: i64| reservations.iter().find(|r| r.id == id).map(|r| r.status);
        assert_eq!(status_of(lapsed.id), Some(ReservationStatus::Released));
        assert_eq!(status_of(live.id), Some(ReservationStatus::Active));
        assert_eq!(api.available_to_sell(kopi.id).await.unwrap(), 4);
    }

    #[actix_web::test]
    async fn dropping_the_sender_stops_the_worker() {
        let _ = env_logger::try_init();
        let (tx, rx) = watch::channel(false);
        let worker = start_expiry_worker(ReservationApi::new(MemoryDatabase::new()), Duration::from_secs(60), rx);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), worker).await.expect("worker did not stop").unwrap();
    }
}
