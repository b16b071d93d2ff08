pub mod checkout_api;
pub mod errors;
pub mod notification_objects;
pub mod order_state_api;
pub mod reconciliation_api;
pub mod reservation_api;
