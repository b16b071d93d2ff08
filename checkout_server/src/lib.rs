//! # Checkout server
//! This crate hosts the HTTP front end for the checkout engine. It is responsible for:
//! * Accepting orders at checkout and holding stock for them.
//! * Receiving payment notifications from the payment gateway and handing them to the reconciliation processor.
//! * Running the expiry worker that gives lapsed stock holds back to available-to-sell.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/checkout`: Places an order and reserves stock for each line item.
//! * `/notifications/payment`: The webhook route for payment gateway notifications.

pub mod cli;
pub mod config;
pub mod errors;
pub mod expiry_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
