//! `SqliteDatabase` is the production backend for the checkout engine.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
use std::{collections::BTreeMap, fmt::Debug};

use checkout_common::Secret;
use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{db_url, new_pool, notifications, orders, products, reservations, tenants};
use crate::{
    db_types::{
        NewOrder,
        NewPaymentNotification,
        NewProduct,
        NewReservation,
        Order,
        OrderNote,
        PaymentNotificationRecord,
        Product,
        Reservation,
        Tenant,
    },
    traits::{
        InsertNotificationResult,
        InventoryError,
        InventoryManagement,
        NotificationStoreError,
        OrderManagement,
        OrderManagementError,
        PaymentNotificationManagement,
        StatusChange,
        TenantError,
        TenantManagement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl InventoryManagement for SqliteDatabase {
    async fn insert_product(&self, product: NewProduct) -> Result<Product, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        let product = products::insert_product(product, &mut conn).await?;
        debug!("🗃️ Product #{} created with {} units in stock", product.id, product.stock_quantity);
        Ok(product)
    }

    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        let product = products::fetch_product(product_id, &mut conn).await?;
        Ok(product)
    }

    async fn available_to_sell(&self, product_id: i64) -> Result<i64, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        let product =
            products::fetch_product(product_id, &mut conn).await?.ok_or(InventoryError::ProductNotFound(product_id))?;
        let reserved = reservations::reserved_quantity(product_id, &mut conn).await?;
        Ok(product.stock_quantity - reserved)
    }

    async fn reserve_stock(&self, reservation: NewReservation) -> Result<Reservation, InventoryError> {
        if reservation.quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(reservation.quantity));
        }
        let product_id = reservation.product_id;
        let mut tx = self.pool.begin().await?;
        // Dropping `tx` on any early return rolls the transaction back and releases the lock.
        let product =
            products::lock_product(product_id, &mut tx).await?.ok_or(InventoryError::ProductNotFound(product_id))?;
        if product.tenant_id != reservation.tenant_id {
            return Err(InventoryError::TenantMismatch { product_id, tenant_id: reservation.tenant_id });
        }
        let reserved = reservations::reserved_quantity(product_id, &mut tx).await?;
        let available = product.stock_quantity - reserved;
        if reservation.quantity > available {
            trace!("🗃️ Product #{product_id}: {} requested, {available} available", reservation.quantity);
            return Err(InventoryError::InsufficientStock { product_id, requested: reservation.quantity, available });
        }
        let reservation = reservations::insert_reservation(reservation, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Reservation #{} holds {} of product #{product_id} for order #{} until {}",
            reservation.id, reservation.quantity, reservation.order_id, reservation.expires_at
        );
        Ok(reservation)
    }

    async fn convert_reservations_for_order(
        &self,
        order_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, InventoryError> {
        let mut tx = self.pool.begin().await?;
        let locked = products::lock_products_for_order(order_id, &mut tx).await?;
        if locked == 0 {
            trace!("🗃️ Order #{order_id} has no active reservations to convert");
            return Ok(Vec::new());
        }
        let active = reservations::fetch_active_reservations_for_order(order_id, &mut tx).await?;
        let mut per_product = BTreeMap::<i64, i64>::new();
        for r in &active {
            *per_product.entry(r.product_id).or_default() += r.quantity;
        }
        for (product_id, quantity) in per_product {
            let remaining = products::decrement_stock(product_id, quantity, now, &mut tx).await?;
            trace!("🗃️ Product #{product_id} stock reduced by {quantity} to {remaining}");
        }
        let mut converted = Vec::with_capacity(active.len());
        for r in active {
            if let Some(r) = reservations::mark_converted(r.id, now, &mut tx).await? {
                converted.push(r);
            }
        }
        tx.commit().await?;
        debug!("🗃️ {} reservations converted to permanent stock for order #{order_id}", converted.len());
        Ok(converted)
    }

    async fn release_reservations_for_order(
        &self,
        order_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        let released = reservations::release_reservations_for_order(order_id, now, &mut conn).await?;
        debug!("🗃️ {} reservations released for order #{order_id}", released.len());
        Ok(released)
    }

    async fn release_reservation(
        &self,
        reservation_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Reservation>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        let released = reservations::release_reservation(reservation_id, now, &mut conn).await?;
        Ok(released)
    }

    async fn fetch_expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        let expired = reservations::fetch_expired_reservations(now, &mut conn).await?;
        Ok(expired)
    }

    async fn fetch_reservations_for_order(&self, order_id: i64) -> Result<Vec<Reservation>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        let result = reservations::fetch_reservations_for_order(order_id, &mut conn).await?;
        Ok(result)
    }
}

impl OrderManagement for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::insert_order(order, &mut conn).await?;
        debug!("🗃️ Order [{}] has been saved in the DB with id {}", order.reference, order.id);
        Ok(order)
    }

    async fn fetch_order_by_reference(&self, reference: &str) -> Result<Option<Order>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_reference(reference, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_id(id, &mut conn).await?;
        Ok(order)
    }

    async fn update_order_status(&self, id: i64, change: StatusChange) -> Result<Option<Order>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::update_order_status(id, change, &mut conn).await?;
        match &order {
            Some(_) => trace!("🗃️ Order #{id} status changed from {} to {}", change.from, change.to),
            None => trace!("🗃️ Order #{id} was not in status {}. No update made", change.from),
        }
        Ok(order)
    }

    async fn add_note(&self, id: i64, note: &str, author: &str) -> Result<OrderNote, OrderManagementError> {
        let mut tx = self.pool.begin().await?;
        let note = orders::insert_note(id, note, author, Utc::now(), &mut tx).await.map_err(|e| match e {
            sqlx::Error::Database(ref dbe) if dbe.is_foreign_key_violation() => OrderManagementError::OrderNotFound(id),
            e => e.into(),
        })?;
        tx.commit().await?;
        Ok(note)
    }

    async fn fetch_notes_for_order(&self, id: i64) -> Result<Vec<OrderNote>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let notes = orders::fetch_notes_for_order(id, &mut conn).await?;
        Ok(notes)
    }
}

impl PaymentNotificationManagement for SqliteDatabase {
    async fn fetch_notification_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<PaymentNotificationRecord>, NotificationStoreError> {
        let mut conn = self.pool.acquire().await?;
        let record = notifications::fetch_notification_by_key(idempotency_key, &mut conn).await?;
        Ok(record)
    }

    async fn insert_notification(
        &self,
        notification: NewPaymentNotification,
    ) -> Result<InsertNotificationResult, NotificationStoreError> {
        let mut conn = self.pool.acquire().await?;
        let result = notifications::idempotent_insert(notification, &mut conn).await?;
        if let InsertNotificationResult::AlreadyExists(r) = &result {
            debug!("🗃️ Payment notification [{}] was already recorded", r.idempotency_key);
        }
        Ok(result)
    }

    async fn fetch_notifications_for_order(
        &self,
        order_id: i64,
    ) -> Result<Vec<PaymentNotificationRecord>, NotificationStoreError> {
        let mut conn = self.pool.acquire().await?;
        let records = notifications::fetch_notifications_for_order(order_id, &mut conn).await?;
        Ok(records)
    }
}

impl TenantManagement for SqliteDatabase {
    async fn insert_tenant(&self, name: &str, signing_secret: Secret<String>) -> Result<Tenant, TenantError> {
        let mut conn = self.pool.acquire().await?;
        let tenant = tenants::insert_tenant(name, signing_secret.reveal(), &mut conn).await?;
        Ok(tenant)
    }

    async fn fetch_signing_secret(&self, tenant_id: i64) -> Result<Option<Secret<String>>, TenantError> {
        let mut conn = self.pool.acquire().await?;
        let secret = tenants::fetch_signing_secret(tenant_id, &mut conn).await?;
        Ok(secret.map(Secret::new))
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `CKO_DATABASE_URL`
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// The URL of the database
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    pub async fn close(&mut self) {
        self.pool.close().await;
    }
}
