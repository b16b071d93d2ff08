use thiserror::Error;

use crate::{
    db_types::{NewOrder, Order, OrderNote},
    traits::StatusChange,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderManagementError {
    #[error("Cannot insert order, since an order with reference {0} already exists")]
    OrderAlreadyExists(String),
    #[error("The requested order (internal id {0}) does not exist")]
    OrderNotFound(i64),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for OrderManagementError {
    fn from(e: sqlx::Error) -> Self {
        OrderManagementError::DatabaseError(e.to_string())
    }
}

/// Persistence for orders and their staff-visible notes.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    /// Stores a new order in `PENDING` status. Line items are not stored here; stock for them is held through
    /// reservations.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderManagementError>;

    async fn fetch_order_by_reference(&self, reference: &str) -> Result<Option<Order>, OrderManagementError>;

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, OrderManagementError>;

    /// Atomically sets the order status to `change.to` and stamps the matching lifecycle timestamp, if and only if the
    /// order is currently in `change.from`.
    ///
    /// Returns the updated order, or `None` if the order's status was no longer `change.from`.
    async fn update_order_status(&self, id: i64, change: StatusChange) -> Result<Option<Order>, OrderManagementError>;

    async fn add_note(&self, id: i64, note: &str, author: &str) -> Result<OrderNote, OrderManagementError>;

    async fn fetch_notes_for_order(&self, id: i64) -> Result<Vec<OrderNote>, OrderManagementError>;
}
