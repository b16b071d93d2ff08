//! SQLite backend for the checkout engine.
//!
//! SQLite has no row-level `SELECT ... FOR UPDATE`. Transactions that need a product lock open with a write to the
//! product row (bumping `lock_version`), which takes the database write lock before anything is read and holds it
//! until commit. Every write transaction in this module starts with a write statement for that reason: a deferred
//! transaction that reads first fails with `SQLITE_BUSY`, without waiting, when it later needs the write lock and
//! another writer holds it.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
