use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{NewProduct, Product};

const PRODUCT_COLUMNS: &str = "id, tenant_id, name, stock_quantity, lock_version, created_at, updated_at";

pub async fn insert_product(product: NewProduct, conn: &mut SqliteConnection) -> Result<Product, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as(&format!(
        "INSERT INTO products (tenant_id, name, stock_quantity, created_at, updated_at) VALUES ($1, $2, $3, $4, $4) \
         RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(product.tenant_id)
    .bind(product.name)
    .bind(product.stock_quantity)
    .bind(now)
    .fetch_one(conn)
    .await
}

pub async fn fetch_product(product_id: i64, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
        .bind(product_id)
        .fetch_optional(conn)
        .await
}

/// Takes the write lock on the product row by bumping its `lock_version`, and returns the locked row.
///
/// This must be the first statement of the enclosing transaction. The lock is held until the transaction commits or
/// rolls back.
pub async fn lock_product(product_id: i64, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    trace!("🗃️ Locking product #{product_id}");
    sqlx::query_as(&format!(
        "UPDATE products SET lock_version = lock_version + 1 WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(product_id)
    .fetch_optional(conn)
    .await
}

/// Locks every product that has an active reservation for the given order. Returns the number of products locked.
pub async fn lock_products_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE products SET lock_version = lock_version + 1
            WHERE id IN (SELECT product_id FROM reservations WHERE order_id = $1 AND status = 'active');
        "#,
    )
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Permanently removes `quantity` units from the product's stock. Returns the new stock level.
pub async fn decrement_stock(
    product_id: i64,
    quantity: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
            UPDATE products SET stock_quantity = stock_quantity - $1, updated_at = $2
            WHERE id = $3
            RETURNING stock_quantity;
        "#,
    )
    .bind(quantity)
    .bind(now)
    .bind(product_id)
    .fetch_one(conn)
    .await
}
