use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db_types::Tenant;

pub async fn insert_tenant(name: &str, signing_secret: &str, conn: &mut SqliteConnection) -> Result<Tenant, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO tenants (name, signing_secret, created_at) VALUES ($1, $2, $3)
            RETURNING id, name, created_at;
        "#,
    )
    .bind(name)
    .bind(signing_secret)
    .bind(Utc::now())
    .fetch_one(conn)
    .await
}

pub async fn fetch_signing_secret(tenant_id: i64, conn: &mut SqliteConnection) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT signing_secret FROM tenants WHERE id = $1").bind(tenant_id).fetch_optional(conn).await
}
