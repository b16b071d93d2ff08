use std::fmt::Debug;

use chrono::Duration;
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    api::{
        errors::CheckoutError,
        order_state_api::{OrderStateApi, Transition},
        reservation_api::ReservationApi,
    },
    db_types::{NewOrder, Order, OrderStatusType, Reservation},
    traits::{CheckoutDatabase, InventoryError},
};

/// The author recorded on notes added by the checkout flow itself
pub const CHECKOUT_AUTHOR: &str = "checkout";

/// A newly placed order, with the stock held for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order: Order,
    pub reservations: Vec<Reservation>,
}

/// `CheckoutApi` creates orders and holds stock for them until they are paid for, or the hold lapses.
pub struct CheckoutApi<B> {
    reservations: ReservationApi<B>,
    orders: OrderStateApi<B>,
    reservation_ttl: Duration,
}

impl<B> Debug for CheckoutApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi (ttl: {})", self.reservation_ttl)
    }
}

impl<B: Clone> Clone for CheckoutApi<B> {
    fn clone(&self) -> Self {
        Self {
            reservations: self.reservations.clone(),
            orders: self.orders.clone(),
            reservation_ttl: self.reservation_ttl,
        }
    }
}

impl<B: Clone> CheckoutApi<B> {
    pub fn new(db: B, reservation_ttl: Duration) -> Self {
        Self { reservations: ReservationApi::new(db.clone()), orders: OrderStateApi::new(db), reservation_ttl }
    }

    pub fn reservation_ttl(&self) -> Duration {
        self.reservation_ttl
    }
}

impl<B> CheckoutApi<B>
where B: CheckoutDatabase
{
    /// Stores the order as `PENDING` and reserves stock for each of its line items.
    ///
    /// If any item cannot be reserved, the reservations already taken are released, the order is cancelled with a
    /// note explaining why, and the reservation error is returned.
    pub async fn place_order(&self, order: NewOrder) -> Result<PlacedOrder, CheckoutError> {
        let items = order.items.clone();
        let order = self.orders.db().insert_order(order).await?;
        info!("📦️ Order [{}] placed with {} line items", order.reference, items.len());
        let mut reservations = Vec::with_capacity(items.len());
        for item in items {
            let result = self
                .reservations
                .create_reservation(order.tenant_id, item.product_id, order.id, item.quantity, self.reservation_ttl)
                .await;
            match result {
                Ok(r) => reservations.push(r),
                Err(e) => {
                    let note = match &e {
                        InventoryError::InsufficientStock { product_id, .. } => {
                            format!("insufficient stock for product #{product_id}")
                        },
                        e => format!("stock reservation failed: {e}"),
                    };
                    self.abandon(&order, &note).await;
                    return Err(e.into());
                },
            }
        }
        Ok(PlacedOrder { order, reservations })
    }

    /// Cancels an order on behalf of staff, releasing any stock still held for it.
    pub async fn cancel_order(&self, order_id: i64, reason: &str, author: &str) -> Result<Transition, CheckoutError> {
        self.reservations.release_reservations(order_id).await?;
        let transition = self.orders.transition(order_id, OrderStatusType::Cancelled).await?;
        if transition.changed {
            self.orders.add_note(order_id, reason, author).await?;
        }
        Ok(transition)
    }

    /// Marks a paid order as fulfilled.
    pub async fn complete_order(&self, order_id: i64) -> Result<Transition, CheckoutError> {
        let transition = self.orders.transition(order_id, OrderStatusType::Complete).await?;
        Ok(transition)
    }

    pub fn reservations(&self) -> &ReservationApi<B> {
        &self.reservations
    }

    pub fn orders(&self) -> &OrderStateApi<B> {
        &self.orders
    }

    /// Best-effort cleanup after a failed checkout. Failures are logged; the original error is what the caller needs.
    async fn abandon(&self, order: &Order, note: &str) {
        if let Err(e) = self.reservations.release_reservations(order.id).await {
            error!("📦️ Could not release reservations for abandoned order [{}]. {e}", order.reference);
        }
        match self.orders.transition(order.id, OrderStatusType::Cancelled).await {
            Ok(_) => {
                if let Err(e) = self.orders.add_note(order.id, note, CHECKOUT_AUTHOR).await {
                    warn!("📦️ Could not add note to order [{}]. {e}", order.reference);
                }
                info!("📦️ Order [{}] cancelled: {note}", order.reference);
            },
            Err(e) => error!("📦️ Could not cancel abandoned order [{}]. {e}", order.reference),
        }
    }
}
