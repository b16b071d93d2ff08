//! Builders for signed payment notifications, as the payment gateway would send them.
use crate::{helpers::calculate_notification_signature, notification_objects::PaymentNotification};

pub fn signed_notification(
    transaction_id: &str,
    order_reference: &str,
    transaction_status: &str,
    gross_amount: &str,
    secret: &str,
) -> PaymentNotification {
    let status_code = match transaction_status.to_lowercase().as_str() {
        "settlement" | "capture" => "200",
        "pending" => "201",
        _ => "202",
    };
    let signature = calculate_notification_signature(order_reference, status_code, gross_amount, secret);
    PaymentNotification {
        transaction_id: transaction_id.to_string(),
        order_reference: order_reference.to_string(),
        status_code: status_code.to_string(),
        gross_amount: gross_amount.to_string(),
        signature,
        transaction_status: transaction_status.to_string(),
        fraud_status: None,
        payment_type: Some("bank_transfer".to_string()),
    }
}

/// The JSON body the gateway would post for the notification.
pub fn notification_body(notification: &PaymentNotification) -> String {
    serde_json::to_string(notification).expect("notification serializes")
}
