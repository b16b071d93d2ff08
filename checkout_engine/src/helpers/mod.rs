mod signature;

pub use signature::{calculate_notification_signature, verify_notification_signature};
