use std::{fmt::Display, str::FromStr};

use checkout_common::Money;
use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------        Tenant         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------        Product        ---------------------------------------------------------
/// The shared, finite resource. `stock_quantity` is only ever decremented when reservations are converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub stock_quantity: i64,
    pub lock_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub tenant_id: i64,
    pub name: String,
    pub stock_quantity: i64,
}

impl NewProduct {
    pub fn new<S: Into<String>>(tenant_id: i64, name: S, stock_quantity: i64) -> Self {
        Self { tenant_id, name: name.into(), stock_quantity }
    }
}

//--------------------------------------   ReservationStatus   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// The stock is being held for the order.
    Active,
    /// Payment was confirmed and the held quantity was permanently deducted from stock. Terminal.
    Converted,
    /// The hold was given back to available-to-sell. Terminal.
    Released,
}

impl Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReservationStatus::Active => write!(f, "active"),
            ReservationStatus::Converted => write!(f, "converted"),
            ReservationStatus::Released => write!(f, "released"),
        }
    }
}

impl FromStr for ReservationStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "converted" => Ok(Self::Converted),
            "released" => Ok(Self::Released),
            s => Err(ConversionError(format!("Invalid reservation status: {s}"))),
        }
    }
}

//--------------------------------------      Reservation      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Reservation {
    pub id: i64,
    pub tenant_id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// When the reservation was converted or released
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at < now
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub tenant_id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewReservation {
    pub fn new(tenant_id: i64, order_id: i64, product_id: i64, quantity: i64, ttl: chrono::Duration) -> Self {
        let created_at = Utc::now();
        Self { tenant_id, order_id, product_id, quantity, created_at, expires_at: created_at + ttl }
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatusType {
    /// The order was placed at checkout and is waiting for payment.
    Pending,
    /// The payment gateway confirmed the payment.
    Paid,
    /// Staff have fulfilled the order. Terminal.
    Complete,
    /// The order was cancelled by staff, or the payment failed or expired. Terminal.
    Cancelled,
}

impl OrderStatusType {
    /// The transition table for orders. Re-requesting the current status is handled by the caller as a no-op and is
    /// not part of this table.
    ///
    /// | From \ To | Pending | Paid | Complete | Cancelled |
    /// |-----------|---------|------|----------|-----------|
    /// | Pending   | -       | ✔    |          | ✔         |
    /// | Paid      |         | -    | ✔        | ✔         |
    /// | Complete  |         |      | -        |           |
    /// | Cancelled |         |      |          | -         |
    pub fn can_transition_to(self, next: OrderStatusType) -> bool {
        use OrderStatusType::*;
        matches!((self, next), (Pending, Paid) | (Pending, Cancelled) | (Paid, Complete) | (Paid, Cancelled))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatusType::Complete | OrderStatusType::Cancelled)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "PENDING"),
            OrderStatusType::Paid => write!(f, "PAID"),
            OrderStatusType::Complete => write!(f, "COMPLETE"),
            OrderStatusType::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to PENDING");
            OrderStatusType::Pending
        })
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "COMPLETE" => Ok(Self::Complete),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
/// Orders are never deleted. Their status is only ever changed through [`crate::OrderStateApi`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub tenant_id: i64,
    /// The tenant-facing identifier that the payment gateway uses to refer to this order
    pub reference: String,
    pub status: OrderStatusType,
    pub total_price: Money,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: i64,
    pub quantity: i64,
}

impl OrderItem {
    pub fn new(product_id: i64, quantity: i64) -> Self {
        Self { product_id, quantity }
    }
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub tenant_id: i64,
    pub reference: String,
    pub total_price: Money,
    pub currency: String,
    /// The line items to reserve stock for
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl NewOrder {
    pub fn new<S: Into<String>>(tenant_id: i64, reference: S, total_price: Money) -> Self {
        Self { tenant_id, reference: reference.into(), total_price, currency: "IDR".to_string(), items: Vec::new() }
    }

    pub fn with_item(mut self, product_id: i64, quantity: i64) -> Self {
        self.items.push(OrderItem::new(product_id, quantity));
        self
    }

    pub fn with_currency<S: Into<String>>(mut self, currency: S) -> Self {
        self.currency = currency.into();
        self
    }
}

//--------------------------------------      OrderNote        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct OrderNote {
    pub id: i64,
    pub order_id: i64,
    pub note: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

//---------------------------------   PaymentNotificationRecord  -------------------------------------------------------
/// The dedupe ledger for payment gateway callbacks. At most one record exists per idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PaymentNotificationRecord {
    pub id: i64,
    pub gateway_transaction_id: String,
    pub idempotency_key: String,
    pub order_id: i64,
    pub transaction_status: String,
    pub raw_payload: String,
    pub signature_verified: bool,
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentNotification {
    pub gateway_transaction_id: String,
    pub idempotency_key: String,
    pub order_id: i64,
    pub transaction_status: String,
    pub raw_payload: String,
    pub signature_verified: bool,
    pub settled_at: Option<DateTime<Utc>>,
}

/// Derives the key used to deduplicate payment notifications: the gateway transaction id followed by the lowercased
/// transaction status. The same transaction legitimately produces several notifications as its status moves on
/// (`pending` then `settlement`), and each of those is processed exactly once.
pub fn idempotency_key(transaction_id: &str, transaction_status: &str) -> String {
    format!("{transaction_id}{}", transaction_status.trim().to_lowercase())
}
