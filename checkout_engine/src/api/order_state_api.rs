use std::fmt::Debug;

use log::*;

use crate::{
    api::errors::OrderStateError,
    db_types::{Order, OrderNote, OrderStatusType},
    traits::{OrderManagement, StatusChange},
};

/// The compare-and-swap is retried when another writer changed the status between our read and our write. The
/// lifecycle has at most two forward steps, so a handful of attempts always suffices.
const MAX_CAS_ATTEMPTS: usize = 4;

/// The result of a status change request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub order: Order,
    /// False if the order was already in the requested status
    pub changed: bool,
}

/// `OrderStateApi` is the only code path that writes an order's status.
///
/// | From \ To | PENDING | PAID | COMPLETE | CANCELLED |
/// |-----------|---------|------|----------|-----------|
/// | PENDING   | no-op   | ✔    | Err      | ✔         |
/// | PAID      | Err     | no-op| ✔        | ✔         |
/// | COMPLETE  | Err     | Err  | no-op    | Err       |
/// | CANCELLED | Err     | Err  | Err      | no-op     |
///
/// The lifecycle timestamp (`paid_at`, `completed_at`, `cancelled_at`) is written in the same atomic update as the
/// status.
pub struct OrderStateApi<B> {
    db: B,
}

impl<B> Debug for OrderStateApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderStateApi")
    }
}

impl<B: Clone> Clone for OrderStateApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone() }
    }
}

impl<B> OrderStateApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderStateApi<B>
where B: OrderManagement
{
    pub async fn fetch_order(&self, order_id: i64) -> Result<Order, OrderStateError> {
        self.db.fetch_order_by_id(order_id).await?.ok_or(OrderStateError::OrderNotFound(order_id))
    }

    /// Moves the order to `new_status`.
    ///
    /// Requesting the status the order is already in succeeds without changing anything. Any move not in the
    /// transition table fails with [`OrderStateError::InvalidTransition`].
    pub async fn transition(&self, order_id: i64, new_status: OrderStatusType) -> Result<Transition, OrderStateError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let order = self.fetch_order(order_id).await?;
            let current = order.status;
            if current == new_status {
                trace!("🔄️ Order #{order_id} is already {new_status}");
                return Ok(Transition { order, changed: false });
            }
            if !current.can_transition_to(new_status) {
                debug!("🔄️ Rejected status change for order #{order_id}: {current} -> {new_status}");
                return Err(OrderStateError::InvalidTransition { from: current, to: new_status });
            }
            let change = StatusChange::new(current, new_status);
            if let Some(order) = self.db.update_order_status(order_id, change).await? {
                info!("🔄️ Order [{}] (#{order_id}) moved from {current} to {new_status}", order.reference);
                return Ok(Transition { order, changed: true });
            }
            debug!("🔄️ Order #{order_id} changed status while we were updating it. Trying again");
        }
        Err(OrderStateError::DatabaseError(format!(
            "Order #{order_id} status kept changing. Gave up after {MAX_CAS_ATTEMPTS} attempts"
        )))
    }

    pub async fn add_note(&self, order_id: i64, note: &str, author: &str) -> Result<OrderNote, OrderStateError> {
        let note = self.db.add_note(order_id, note, author).await?;
        debug!("🔄️ Note added to order #{order_id} by {author}: {}", note.note);
        Ok(note)
    }

    pub async fn notes(&self, order_id: i64) -> Result<Vec<OrderNote>, OrderStateError> {
        let notes = self.db.fetch_notes_for_order(order_id).await?;
        Ok(notes)
    }
}
