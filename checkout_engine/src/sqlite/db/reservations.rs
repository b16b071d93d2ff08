use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{NewReservation, Reservation};

const RESERVATION_COLUMNS: &str =
    "id, tenant_id, order_id, product_id, quantity, status, created_at, expires_at, resolved_at";

/// Sum of the quantities held by active reservations for the product.
pub async fn reserved_quantity(product_id: i64, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COALESCE(SUM(quantity), 0) FROM reservations WHERE product_id = $1 AND status = 'active'")
        .bind(product_id)
        .fetch_one(conn)
        .await
}

/// Inserts a new active reservation. This does not check stock levels; callers must hold the product lock and have
/// checked availability in the same transaction.
pub async fn insert_reservation(
    reservation: NewReservation,
    conn: &mut SqliteConnection,
) -> Result<Reservation, sqlx::Error> {
    sqlx::query_as(&format!(
        "INSERT INTO reservations (tenant_id, order_id, product_id, quantity, status, created_at, expires_at) VALUES \
         ($1, $2, $3, $4, 'active', $5, $6) RETURNING {RESERVATION_COLUMNS}"
    ))
    .bind(reservation.tenant_id)
    .bind(reservation.order_id)
    .bind(reservation.product_id)
    .bind(reservation.quantity)
    .bind(reservation.created_at)
    .bind(reservation.expires_at)
    .fetch_one(conn)
    .await
}

pub async fn fetch_reservations_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Reservation>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE order_id = $1 ORDER BY id ASC"))
        .bind(order_id)
        .fetch_all(conn)
        .await
}

pub async fn fetch_active_reservations_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Reservation>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE order_id = $1 AND status = 'active' ORDER BY product_id, \
         id"
    ))
    .bind(order_id)
    .fetch_all(conn)
    .await
}

pub async fn fetch_expired_reservations(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Reservation>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE status = 'active' AND expires_at < $1 ORDER BY \
         expires_at ASC"
    ))
    .bind(now)
    .fetch_all(conn)
    .await
}

/// Marks one reservation as converted, if it is still active.
pub async fn mark_converted(
    reservation_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Reservation>, sqlx::Error> {
    sqlx::query_as(&format!(
        "UPDATE reservations SET status = 'converted', resolved_at = $1 WHERE id = $2 AND status = 'active' \
         RETURNING {RESERVATION_COLUMNS}"
    ))
    .bind(now)
    .bind(reservation_id)
    .fetch_optional(conn)
    .await
}

/// Marks one reservation as released, if it is still active.
pub async fn release_reservation(
    reservation_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Reservation>, sqlx::Error> {
    sqlx::query_as(&format!(
        "UPDATE reservations SET status = 'released', resolved_at = $1 WHERE id = $2 AND status = 'active' RETURNING \
         {RESERVATION_COLUMNS}"
    ))
    .bind(now)
    .bind(reservation_id)
    .fetch_optional(conn)
    .await
}

/// Marks every active reservation for the order as released, in a single statement.
pub async fn release_reservations_for_order(
    order_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Reservation>, sqlx::Error> {
    sqlx::query_as(&format!(
        "UPDATE reservations SET status = 'released', resolved_at = $1 WHERE order_id = $2 AND status = 'active' \
         RETURNING {RESERVATION_COLUMNS}"
    ))
    .bind(now)
    .bind(order_id)
    .fetch_all(conn)
    .await
}
