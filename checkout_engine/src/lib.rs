//! Checkout Engine
//!
//! The checkout engine keeps a multi-tenant shop from overselling its stock, and reconciles orders with the
//! asynchronous payment notifications sent by a payment gateway.
//!
//! The library is divided into these sections:
//! 1. Storage ports ([`mod@traits`]) and their adapters. [`SqliteDatabase`] is the production backend; `MemoryDatabase`
//!    (behind the `test_utils` feature) keeps everything in process for tests. The data types used by the backends
//!    live in [`mod@db_types`] and are public.
//! 2. The public APIs:
//!    * [`ReservationApi`] holds stock for an order for a limited time, converts the hold into a permanent stock
//!      decrement once the order is paid, or releases it again. It also sweeps expired holds.
//!    * [`OrderStateApi`] is the order status state machine.
//!    * [`CheckoutApi`] places orders and reserves their stock in one step.
//!    * [`PaymentReconciliationApi`] authenticates, deduplicates and applies payment gateway notifications.
//!
//! The engine also publishes events (see [`mod@events`]) when orders are paid or annulled, so that other parts of the
//! system, such as customer notifications, can react to them.
mod api;

pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod memory;
#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use api::{
    checkout_api::{CheckoutApi, PlacedOrder, CHECKOUT_AUTHOR},
    errors::{CheckoutError, OrderStateError, PartialInventoryFailure, ReconciliationError},
    notification_objects,
    order_state_api::{OrderStateApi, Transition},
    reconciliation_api::{PaymentReconciliationApi, PAYMENT_GATEWAY_AUTHOR},
    reservation_api::{ReservationApi, SweepResult},
};
#[cfg(any(feature = "test_utils", test))]
pub use memory::MemoryDatabase;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::CheckoutDatabase;
