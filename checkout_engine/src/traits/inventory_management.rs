use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{NewProduct, NewReservation, Product, Reservation};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("Insufficient stock for product #{product_id}. Requested {requested}, but only {available} available")]
    InsufficientStock { product_id: i64, requested: i64, available: i64 },
    #[error("Product #{0} does not exist")]
    ProductNotFound(i64),
    #[error("Product #{product_id} does not belong to tenant #{tenant_id}")]
    TenantMismatch { product_id: i64, tenant_id: i64 },
    #[error("Reservation quantities must be positive. Got {0}")]
    InvalidQuantity(i64),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for InventoryError {
    fn from(e: sqlx::Error) -> Self {
        InventoryError::DatabaseError(e.to_string())
    }
}

/// Products and time-bounded stock holds against them.
///
/// For any product, `stock_quantity - Σ(quantity of active reservations)` (available-to-sell) must never be negative
/// after a method returns. Backends guarantee this by serialising [`reserve_stock`](Self::reserve_stock) and
/// [`convert_reservations_for_order`](Self::convert_reservations_for_order) on the affected product rows.
#[allow(async_fn_in_trait)]
pub trait InventoryManagement: Clone {
    async fn insert_product(&self, product: NewProduct) -> Result<Product, InventoryError>;

    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, InventoryError>;

    /// `stock_quantity` less the quantity held by active reservations.
    async fn available_to_sell(&self, product_id: i64) -> Result<i64, InventoryError>;

    /// In a single atomic transaction,
    /// * takes an exclusive lock on the product row,
    /// * computes available-to-sell,
    /// * inserts the reservation if the requested quantity fits.
    ///
    /// Returns [`InventoryError::InsufficientStock`] (and writes nothing) otherwise.
    async fn reserve_stock(&self, reservation: NewReservation) -> Result<Reservation, InventoryError>;

    /// In a single atomic transaction, locks the product rows of every active reservation for the order, decrements
    /// their `stock_quantity` and marks the reservations `converted`.
    ///
    /// Returns the reservations that were converted by this call. If there are no active reservations left, nothing
    /// changes and an empty vector is returned.
    async fn convert_reservations_for_order(
        &self,
        order_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, InventoryError>;

    /// Marks every active reservation for the order as `released`. Returns the reservations released by this call.
    async fn release_reservations_for_order(
        &self,
        order_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, InventoryError>;

    /// Releases a single reservation, if it is still active. Returns `None` if the reservation was already resolved.
    async fn release_reservation(
        &self,
        reservation_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Reservation>, InventoryError>;

    /// All active reservations with `expires_at < now`, oldest first.
    async fn fetch_expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, InventoryError>;

    async fn fetch_reservations_for_order(&self, order_id: i64) -> Result<Vec<Reservation>, InventoryError>;
}
