use chrono::Utc;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPaymentNotification, PaymentNotificationRecord},
    traits::InsertNotificationResult,
};

const NOTIFICATION_COLUMNS: &str = "id, gateway_transaction_id, idempotency_key, order_id, transaction_status, \
                                    raw_payload, signature_verified, settled_at, created_at";

pub async fn fetch_notification_by_key(
    idempotency_key: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentNotificationRecord>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {NOTIFICATION_COLUMNS} FROM payment_notifications WHERE idempotency_key = $1"))
        .bind(idempotency_key)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_notifications_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentNotificationRecord>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM payment_notifications WHERE order_id = $1 ORDER BY id ASC"
    ))
    .bind(order_id)
    .fetch_all(conn)
    .await
}

/// Inserts the notification record keyed by its idempotency key. If the key is already present, the existing record
/// is returned and nothing is written.
pub async fn idempotent_insert(
    notification: NewPaymentNotification,
    conn: &mut SqliteConnection,
) -> Result<InsertNotificationResult, sqlx::Error> {
    let inserted: Option<PaymentNotificationRecord> = sqlx::query_as(&format!(
        "INSERT INTO payment_notifications (gateway_transaction_id, idempotency_key, order_id, transaction_status, \
         raw_payload, signature_verified, settled_at, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) ON CONFLICT \
         (idempotency_key) DO NOTHING RETURNING {NOTIFICATION_COLUMNS}"
    ))
    .bind(&notification.gateway_transaction_id)
    .bind(&notification.idempotency_key)
    .bind(notification.order_id)
    .bind(&notification.transaction_status)
    .bind(&notification.raw_payload)
    .bind(notification.signature_verified)
    .bind(notification.settled_at)
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?;
    match inserted {
        Some(record) => Ok(InsertNotificationResult::Inserted(record)),
        None => {
            let existing = fetch_notification_by_key(&notification.idempotency_key, conn)
                .await?
                .ok_or(sqlx::Error::RowNotFound)?;
            Ok(InsertNotificationResult::AlreadyExists(existing))
        },
    }
}
