use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{OrderStatusType, PaymentNotificationRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertNotificationResult {
    Inserted(PaymentNotificationRecord),
    AlreadyExists(PaymentNotificationRecord),
}

impl InsertNotificationResult {
    pub fn record(&self) -> &PaymentNotificationRecord {
        match self {
            Self::Inserted(r) | Self::AlreadyExists(r) => r,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// A requested order status change. The backend writes `to` and stamps the lifecycle timestamp for `to` with `at`,
/// but only if the order is still in status `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: OrderStatusType,
    pub to: OrderStatusType,
    pub at: DateTime<Utc>,
}

impl StatusChange {
    pub fn new(from: OrderStatusType, to: OrderStatusType) -> Self {
        Self { from, to, at: Utc::now() }
    }

    /// The name of the order column that records when the order entered `to`.
    pub fn timestamp_column(&self) -> Option<&'static str> {
        match self.to {
            OrderStatusType::Paid => Some("paid_at"),
            OrderStatusType::Complete => Some("completed_at"),
            OrderStatusType::Cancelled => Some("cancelled_at"),
            OrderStatusType::Pending => None,
        }
    }
}
