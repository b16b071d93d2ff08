use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, Order, OrderNote},
    traits::{OrderManagementError, StatusChange},
};

const ORDER_COLUMNS: &str = "id, tenant_id, reference, status, total_price, currency, created_at, updated_at, paid_at, \
                             completed_at, cancelled_at";

/// Inserts a new order in `PENDING` status. A duplicate reference results in
/// [`OrderManagementError::OrderAlreadyExists`].
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, OrderManagementError> {
    let now = Utc::now();
    let result = sqlx::query_as(&format!(
        "INSERT INTO orders (tenant_id, reference, status, total_price, currency, created_at, updated_at) VALUES ($1, \
         $2, 'PENDING', $3, $4, $5, $5) RETURNING {ORDER_COLUMNS}"
    ))
    .bind(order.tenant_id)
    .bind(&order.reference)
    .bind(order.total_price)
    .bind(&order.currency)
    .bind(now)
    .fetch_one(conn)
    .await;
    match result {
        Ok(order) => Ok(order),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            debug!("🗃️ Order {} already exists", order.reference);
            Err(OrderManagementError::OrderAlreadyExists(order.reference))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_order_by_reference(
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE reference = $1"))
        .bind(reference)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1")).bind(id).fetch_optional(conn).await
}

/// Compare-and-swap on the order status. The lifecycle timestamp for the new status is written in the same statement.
/// Returns `None` if the order is not currently in `change.from`.
pub async fn update_order_status(
    id: i64,
    change: StatusChange,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let stamp = change.timestamp_column().map(|col| format!(", {col} = $1")).unwrap_or_default();
    let sql = format!(
        "UPDATE orders SET status = $2, updated_at = $1{stamp} WHERE id = $3 AND status = $4 RETURNING {ORDER_COLUMNS}"
    );
    trace!("🗃️ Executing query: {sql}");
    sqlx::query_as(&sql)
        .bind(change.at)
        .bind(change.to)
        .bind(id)
        .bind(change.from)
        .fetch_optional(conn)
        .await
}

pub async fn insert_note(
    order_id: i64,
    note: &str,
    author: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<OrderNote, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO order_notes (order_id, note, author, created_at) VALUES ($1, $2, $3, $4)
            RETURNING id, order_id, note, author, created_at;
        "#,
    )
    .bind(order_id)
    .bind(note)
    .bind(author)
    .bind(now)
    .fetch_one(conn)
    .await
}

pub async fn fetch_notes_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderNote>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, order_id, note, author, created_at FROM order_notes WHERE order_id = $1 ORDER BY id ASC",
    )
    .bind(order_id)
    .fetch_all(conn)
    .await
}
