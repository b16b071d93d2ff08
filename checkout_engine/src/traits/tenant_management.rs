use checkout_common::Secret;
use thiserror::Error;

use crate::db_types::Tenant;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TenantError {
    #[error("Tenant #{0} does not exist")]
    TenantNotFound(i64),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for TenantError {
    fn from(e: sqlx::Error) -> Self {
        TenantError::DatabaseError(e.to_string())
    }
}

#[allow(async_fn_in_trait)]
pub trait TenantManagement: Clone {
    async fn insert_tenant(&self, name: &str, signing_secret: Secret<String>) -> Result<Tenant, TenantError>;

    /// The secret the payment gateway uses to sign notifications for this tenant's orders.
    async fn fetch_signing_secret(&self, tenant_id: i64) -> Result<Option<Secret<String>>, TenantError>;
}
