use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{
    api::errors::PartialInventoryFailure,
    db_types::{idempotency_key, Order},
};

/// A payment status callback, as posted by the payment gateway.
///
/// The gateway may send the same notification several times, and notifications for one transaction may arrive out of
/// order. Nothing in here is trusted until the signature has been checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub transaction_id: String,
    #[serde(rename = "order_id", alias = "order_reference")]
    pub order_reference: String,
    pub status_code: String,
    /// The amount exactly as the gateway formatted it. The signature is calculated over this text.
    pub gross_amount: String,
    #[serde(rename = "signature_key", alias = "signature")]
    pub signature: String,
    pub transaction_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraud_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_type: Option<String>,
}

impl PaymentNotification {
    pub fn idempotency_key(&self) -> String {
        idempotency_key(&self.transaction_id, &self.transaction_status)
    }

    pub fn gateway_status(&self) -> GatewayStatus {
        GatewayStatus::from_notification(&self.transaction_status, self.fraud_status.as_deref())
    }

    /// Names the first required field that is blank, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("transaction_id", &self.transaction_id),
            ("order_id", &self.order_reference),
            ("status_code", &self.status_code),
            ("gross_amount", &self.gross_amount),
            ("signature_key", &self.signature),
            ("transaction_status", &self.transaction_status),
        ]
        .into_iter()
        .find(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| name)
    }
}

/// Why a payment failure cancelled an order. Recorded as an order note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancellationReason {
    Expired,
    Cancelled,
    Denied,
}

impl CancellationReason {
    pub fn note(&self) -> &'static str {
        match self {
            CancellationReason::Expired => "payment expired",
            CancellationReason::Cancelled => "payment cancelled",
            CancellationReason::Denied => "payment denied",
        }
    }
}

impl Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.note())
    }
}

/// What a gateway transaction status means for the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayStatus {
    Success,
    Pending,
    Failure(CancellationReason),
    Unknown(String),
}

impl GatewayStatus {
    /// Status matching ignores case. A `capture` that the gateway's fraud detection flagged as `challenge` is still
    /// under review and counts as pending.
    pub fn from_notification(transaction_status: &str, fraud_status: Option<&str>) -> Self {
        let status = transaction_status.trim().to_lowercase();
        match status.as_str() {
            "settlement" => GatewayStatus::Success,
            "capture" => match fraud_status.map(str::trim) {
                Some(f) if f.eq_ignore_ascii_case("challenge") => GatewayStatus::Pending,
                _ => GatewayStatus::Success,
            },
            "pending" => GatewayStatus::Pending,
            "cancel" => GatewayStatus::Failure(CancellationReason::Cancelled),
            "deny" => GatewayStatus::Failure(CancellationReason::Denied),
            "expire" => GatewayStatus::Failure(CancellationReason::Expired),
            _ => GatewayStatus::Unknown(status),
        }
    }
}

/// What processing a payment notification did. Every variant is a success from the gateway's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// A notification with the same idempotency key was processed before. Nothing was changed.
    AlreadyProcessed,
    /// The order is `PAID`. If converting its reservations failed, `inventory_failure` says why; the order stays paid.
    Paid { order: Order, inventory_failure: Option<PartialInventoryFailure> },
    /// Payment is still outstanding. The order and its reservations are untouched.
    Pending { order: Order },
    /// The payment failed. The order is `CANCELLED` and its reservations released.
    Cancelled { order: Order, reason: CancellationReason },
    /// The gateway sent a status this engine does not act on.
    Unhandled { status: String },
}

impl NotificationOutcome {
    pub fn describe(&self) -> String {
        match self {
            NotificationOutcome::AlreadyProcessed => "already processed".to_string(),
            NotificationOutcome::Paid { order, inventory_failure: None } => format!("order {} paid", order.reference),
            NotificationOutcome::Paid { order, inventory_failure: Some(_) } => {
                format!("order {} paid, inventory needs manual reconciliation", order.reference)
            },
            NotificationOutcome::Pending { order } => format!("order {} awaiting payment", order.reference),
            NotificationOutcome::Cancelled { order, reason } => format!("order {} cancelled: {reason}", order.reference),
            NotificationOutcome::Unhandled { status } => format!("status {status} ignored"),
        }
    }
}
