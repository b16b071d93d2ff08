use thiserror::Error;

use crate::{
    db_types::{NewPaymentNotification, PaymentNotificationRecord},
    traits::InsertNotificationResult,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationStoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for NotificationStoreError {
    fn from(e: sqlx::Error) -> Self {
        NotificationStoreError::DatabaseError(e.to_string())
    }
}

/// The ledger of processed payment notifications, keyed by idempotency key.
#[allow(async_fn_in_trait)]
pub trait PaymentNotificationManagement: Clone {
    async fn fetch_notification_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<PaymentNotificationRecord>, NotificationStoreError>;

    /// Inserts the record unless one with the same idempotency key exists already, in which case the existing record
    /// is returned untouched.
    async fn insert_notification(
        &self,
        notification: NewPaymentNotification,
    ) -> Result<InsertNotificationResult, NotificationStoreError>;

    async fn fetch_notifications_for_order(
        &self,
        order_id: i64,
    ) -> Result<Vec<PaymentNotificationRecord>, NotificationStoreError>;
}
