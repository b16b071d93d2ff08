use checkout_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderItem};

/// Published after a payment notification moves an order to `PAID`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
    /// The line items whose reservations were converted. Empty if conversion failed and needs manual attention.
    pub items: Vec<OrderItem>,
    /// The amount the gateway reported as paid
    pub gross_amount: Money,
    pub payment_type: Option<String>,
}

impl OrderPaidEvent {
    pub fn new(order: Order, items: Vec<OrderItem>, gross_amount: Money, payment_type: Option<String>) -> Self {
        Self { order, items, gross_amount, payment_type }
    }
}

/// Published after a payment failure (expiry, cancellation or denial) cancels an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub reason: String,
}

impl OrderAnnulledEvent {
    pub fn new<S: Into<String>>(order: Order, reason: S) -> Self {
        Self { order, reason: reason.into() }
    }
}
