use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{NewReservation, Reservation},
    traits::{InventoryError, InventoryManagement},
};

/// The outcome of one pass of the expiry sweeper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepResult {
    /// Reservations that this pass returned to available-to-sell
    pub released: usize,
    /// Reservations that could not be released. They are picked up again by the next pass.
    pub failed: usize,
}

/// `ReservationApi` manages time-bounded stock holds.
///
/// Available-to-sell for a product is its `stock_quantity` less every active reservation against it. Reservations
/// never change `stock_quantity`; only [`Self::convert_reservations_to_permanent`] does, when payment is confirmed.
pub struct ReservationApi<B> {
    db: B,
}

impl<B> Debug for ReservationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReservationApi")
    }
}

impl<B: Clone> Clone for ReservationApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone() }
    }
}

impl<B> ReservationApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> ReservationApi<B>
where B: InventoryManagement
{
    /// Holds `quantity` units of the product for the order until `now + ttl`.
    ///
    /// The availability check and the insert happen under the product's lock, so concurrent checkouts can never
    /// reserve more than is in stock. Returns [`InventoryError::InsufficientStock`] if the quantity does not fit.
    pub async fn create_reservation(
        &self,
        tenant_id: i64,
        product_id: i64,
        order_id: i64,
        quantity: i64,
        ttl: Duration,
    ) -> Result<Reservation, InventoryError> {
        let reservation = NewReservation::new(tenant_id, order_id, product_id, quantity, ttl);
        match self.db.reserve_stock(reservation).await {
            Ok(r) => {
                debug!(
                    "📦️ Reserved {quantity} of product #{product_id} for order #{order_id} until {}",
                    r.expires_at
                );
                Ok(r)
            },
            Err(e @ InventoryError::InsufficientStock { .. }) => {
                info!("📦️ Could not reserve stock for order #{order_id}. {e}");
                Err(e)
            },
            Err(e) => {
                warn!("📦️ Reservation of product #{product_id} for order #{order_id} failed. {e}");
                Err(e)
            },
        }
    }

    /// Turns every active reservation for the order into a permanent stock decrement.
    ///
    /// If no active reservations are left (e.g. they were already converted) nothing changes and an empty list is
    /// returned.
    pub async fn convert_reservations_to_permanent(&self, order_id: i64) -> Result<Vec<Reservation>, InventoryError> {
        let converted = self.db.convert_reservations_for_order(order_id, Utc::now()).await?;
        if converted.is_empty() {
            debug!("📦️ Order #{order_id} has no active reservations. Nothing to convert");
        } else {
            info!("📦️ {} reservations for order #{order_id} converted to permanent stock", converted.len());
        }
        Ok(converted)
    }

    /// Gives every active reservation for the order back to available-to-sell. Idempotent.
    pub async fn release_reservations(&self, order_id: i64) -> Result<Vec<Reservation>, InventoryError> {
        let released = self.db.release_reservations_for_order(order_id, Utc::now()).await?;
        if !released.is_empty() {
            info!("📦️ {} reservations for order #{order_id} released", released.len());
        }
        Ok(released)
    }

    /// All active reservations whose hold lapsed before `now`.
    pub async fn get_expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, InventoryError> {
        self.db.fetch_expired_reservations(now).await
    }

    pub async fn available_to_sell(&self, product_id: i64) -> Result<i64, InventoryError> {
        self.db.available_to_sell(product_id).await
    }

    pub async fn reservations_for_order(&self, order_id: i64) -> Result<Vec<Reservation>, InventoryError> {
        self.db.fetch_reservations_for_order(order_id).await
    }

    /// Releases every reservation that expired before `now`, one at a time.
    ///
    /// A failure to release one reservation is logged and counted, and does not stop the others from being released.
    /// Only the initial query failing is returned as an error.
    pub async fn sweep_expired_reservations(&self, now: DateTime<Utc>) -> Result<SweepResult, InventoryError> {
        let expired = self.get_expired_reservations(now).await?;
        let mut result = SweepResult::default();
        if expired.is_empty() {
            trace!("🕰️ No expired reservations");
            return Ok(result);
        }
        debug!("🕰️ {} reservations have expired", expired.len());
        for reservation in expired {
            match self.db.release_reservation(reservation.id, now).await {
                Ok(Some(r)) => {
                    info!(
                        "🕰️ Released expired reservation #{} ({} of product #{} for order #{})",
                        r.id, r.quantity, r.product_id, r.order_id
                    );
                    result.released += 1;
                },
                Ok(None) => {
                    debug!("🕰️ Reservation #{} was resolved before it could be released", reservation.id);
                },
                Err(e) => {
                    warn!("🕰️ Could not release expired reservation #{}. {e}", reservation.id);
                    result.failed += 1;
                },
            }
        }
        Ok(result)
    }
}
