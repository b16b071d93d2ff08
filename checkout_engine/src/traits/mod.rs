//! #  Storage ports
//!
//! This module defines the interface contracts that storage *backends* must fulfil to support the checkout engine.
//! The engine's APIs never talk to a database directly; they are handed a backend at construction time that implements
//! the traits they need. [`crate::SqliteDatabase`] is the production backend, and `MemoryDatabase` (behind the
//! `test_utils` feature) is an in-process backend for tests.
//!
//! Every trait method is one atomic unit of work. A backend must run a method that touches more than one row inside a
//! single transaction.
//!
//! ## Traits
//! * [`InventoryManagement`] owns products and reservations: stock holds, conversion into permanent stock decrements,
//!   and releases.
//! * [`OrderManagement`] owns orders and order notes. Order status may only be written through
//!   [`OrderManagement::update_order_status`], which is a compare-and-swap on the current status.
//! * [`PaymentNotificationManagement`] is the dedupe ledger for payment gateway callbacks.
//! * [`TenantManagement`] resolves per-tenant signing secrets.
mod data_objects;
mod inventory_management;
mod notification_management;
mod order_management;
mod tenant_management;

pub use data_objects::{InsertNotificationResult, StatusChange};
pub use inventory_management::{InventoryError, InventoryManagement};
pub use notification_management::{NotificationStoreError, PaymentNotificationManagement};
pub use order_management::{OrderManagementError, OrderManagement};
pub use tenant_management::{TenantError, TenantManagement};

/// A backend that supports every engine API.
pub trait CheckoutDatabase:
    InventoryManagement + OrderManagement + PaymentNotificationManagement + TenantManagement
{
}

impl<T> CheckoutDatabase for T where T: InventoryManagement + OrderManagement + PaymentNotificationManagement + TenantManagement
{}
