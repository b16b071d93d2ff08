use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    db_types::OrderStatusType,
    traits::{InventoryError, NotificationStoreError, OrderManagementError, TenantError},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderStateError {
    #[error("An order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatusType, to: OrderStatusType },
    #[error("Order #{0} does not exist")]
    OrderNotFound(i64),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<OrderManagementError> for OrderStateError {
    fn from(e: OrderManagementError) -> Self {
        match e {
            OrderManagementError::OrderNotFound(id) => Self::OrderNotFound(id),
            e => Self::DatabaseError(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    #[error("An order with reference {0} already exists")]
    OrderAlreadyExists(String),
    #[error("{0}")]
    Inventory(#[from] InventoryError),
    #[error("{0}")]
    OrderState(#[from] OrderStateError),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<OrderManagementError> for CheckoutError {
    fn from(e: OrderManagementError) -> Self {
        match e {
            OrderManagementError::OrderAlreadyExists(reference) => Self::OrderAlreadyExists(reference),
            OrderManagementError::OrderNotFound(id) => Self::OrderState(OrderStateError::OrderNotFound(id)),
            OrderManagementError::DatabaseError(s) => Self::DatabaseError(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconciliationError {
    #[error("The signature on the payment notification for order {0} is invalid")]
    SignatureInvalid(String),
    #[error("The payment notification refers to order {0}, which does not exist")]
    OrderNotFound(String),
    #[error("No signing secret is configured for tenant #{0}")]
    TenantSecretMissing(i64),
    #[error("Malformed payment notification: {0}")]
    MalformedNotification(String),
    #[error("An order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatusType, to: OrderStatusType },
    #[error("Temporary storage failure. The notification can be retried. {0}")]
    TransientStoreFailure(String),
}

impl From<OrderStateError> for ReconciliationError {
    fn from(e: OrderStateError) -> Self {
        match e {
            OrderStateError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
            OrderStateError::OrderNotFound(id) => Self::OrderNotFound(format!("#{id}")),
            OrderStateError::DatabaseError(s) => Self::TransientStoreFailure(s),
        }
    }
}

impl From<OrderManagementError> for ReconciliationError {
    fn from(e: OrderManagementError) -> Self {
        Self::TransientStoreFailure(e.to_string())
    }
}

impl From<InventoryError> for ReconciliationError {
    fn from(e: InventoryError) -> Self {
        Self::TransientStoreFailure(e.to_string())
    }
}

impl From<NotificationStoreError> for ReconciliationError {
    fn from(e: NotificationStoreError) -> Self {
        Self::TransientStoreFailure(e.to_string())
    }
}

impl From<TenantError> for ReconciliationError {
    fn from(e: TenantError) -> Self {
        Self::TransientStoreFailure(e.to_string())
    }
}

/// The order was marked `PAID`, but its reservations could not be converted into stock decrements. The order is not
/// rolled back; an operator has to reconcile the stock by hand.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Order {reference} (#{order_id}) is PAID but its inventory could not be converted: {reason}")]
pub struct PartialInventoryFailure {
    pub order_id: i64,
    pub reference: String,
    pub reason: String,
}
