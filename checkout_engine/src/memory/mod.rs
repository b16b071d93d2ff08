//! An in-process storage backend for tests.
//!
//! All state lives behind a single mutex. No trait method awaits while holding it, so each method is one atomic unit
//! of work, which gives the same per-product serialisation that the SQLite backend gets from its row lock.
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};

use checkout_common::Secret;
use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{
        NewOrder,
        NewPaymentNotification,
        NewProduct,
        NewReservation,
        Order,
        OrderNote,
        OrderStatusType,
        PaymentNotificationRecord,
        Product,
        Reservation,
        ReservationStatus,
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

#[derive(Default)]
struct MemoryState {
    last_id: i64,
    tenants: BTreeMap<i64, (Tenant, String)>,
    products: BTreeMap<i64, Product>,
    reservations: BTreeMap<i64, Reservation>,
    orders: BTreeMap<i64, Order>,
    notes: Vec<OrderNote>,
    notifications: HashMap<String, PaymentNotificationRecord>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn reserved_quantity(&self, product_id: i64) -> i64 {
        self.reservations.values().filter(|r| r.product_id == product_id && r.is_active()).map(|r| r.quantity).sum()
    }

    fn resolve(&mut self, reservation_id: i64, status: ReservationStatus, now: DateTime<Utc>) -> Option<Reservation> {
        let r = self.reservations.get_mut(&reservation_id).filter(|r| r.is_active())?;
        r.status = status;
        r.resolved_at = Some(now);
        Some(r.clone())
    }
}

/// A [`crate::traits::CheckoutDatabase`] that keeps everything in memory. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
    fail_next_conversion: Arc<AtomicBool>,
    fail_next_note: Arc<AtomicBool>,
}

impl std::fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemoryDatabase")
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next call to `convert_reservations_for_order` fails with a database error and changes nothing.
    pub fn fail_next_conversion(&self) {
        self.fail_next_conversion.store(true, Ordering::SeqCst);
    }

    /// The next call to `add_note` fails with a database error and writes nothing.
    pub fn fail_next_note(&self) {
        self.fail_next_note.store(true, Ordering::SeqCst);
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock cannot leave a half-applied change behind, since every method validates
        // before it writes.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl InventoryManagement for MemoryDatabase {
    async fn insert_product(&self, product: NewProduct) -> Result<Product, InventoryError> {
        let mut state = self.state();
        if !state.tenants.contains_key(&product.tenant_id) {
            return Err(InventoryError::DatabaseError(format!("Tenant #{} does not exist", product.tenant_id)));
        }
        if product.stock_quantity < 0 {
            return Err(InventoryError::InvalidQuantity(product.stock_quantity));
        }
        let now = Utc::now();
        let id = state.next_id();
        let product = Product {
            id,
            tenant_id: product.tenant_id,
            name: product.name,
            stock_quantity: product.stock_quantity,
            lock_version: 0,
            created_at: now,
            updated_at: now,
        };
        state.products.insert(id, product.clone());
        Ok(product)
    }

    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, InventoryError> {
        Ok(self.state().products.get(&product_id).cloned())
    }

    async fn available_to_sell(&self, product_id: i64) -> Result<i64, InventoryError> {
        let state = self.state();
        let product = state.products.get(&product_id).ok_or(InventoryError::ProductNotFound(product_id))?;
        Ok(product.stock_quantity - state.reserved_quantity(product_id))
    }

    async fn reserve_stock(&self, reservation: NewReservation) -> Result<Reservation, InventoryError> {
        if reservation.quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(reservation.quantity));
        }
        let product_id = reservation.product_id;
        let mut state = self.state();
        let product = state.products.get(&product_id).ok_or(InventoryError::ProductNotFound(product_id))?;
        if product.tenant_id != reservation.tenant_id {
            return Err(InventoryError::TenantMismatch { product_id, tenant_id: reservation.tenant_id });
        }
        if !state.orders.contains_key(&reservation.order_id) {
            return Err(InventoryError::DatabaseError(format!("Order #{} does not exist", reservation.order_id)));
        }
        let available = product.stock_quantity - state.reserved_quantity(product_id);
        if reservation.quantity > available {
            return Err(InventoryError::InsufficientStock { product_id, requested: reservation.quantity, available });
        }
        let id = state.next_id();
        let reservation = Reservation {
            id,
            tenant_id: reservation.tenant_id,
            order_id: reservation.order_id,
            product_id,
            quantity: reservation.quantity,
            status: ReservationStatus::Active,
            created_at: reservation.created_at,
            expires_at: reservation.expires_at,
            resolved_at: None,
        };
        state.reservations.insert(id, reservation.clone());
        Ok(reservation)
    }

    async fn convert_reservations_for_order(
        &self,
        order_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, InventoryError> {
        if self.fail_next_conversion.swap(false, Ordering::SeqCst) {
            warn!("🗃️ Failing conversion for order #{order_id} on request");
            return Err(InventoryError::DatabaseError("injected conversion failure".to_string()));
        }
        let mut state = self.state();
        let active = state
            .reservations
            .values()
            .filter(|r| r.order_id == order_id && r.is_active())
            .map(|r| (r.id, r.product_id, r.quantity))
            .collect::<Vec<_>>();
        let mut per_product = BTreeMap::<i64, i64>::new();
        for (_, product_id, quantity) in &active {
            *per_product.entry(*product_id).or_default() += quantity;
        }
        // Check every product before touching any of them, so a failure leaves nothing half-converted.
        for (product_id, quantity) in &per_product {
            let product = state.products.get(product_id).ok_or(InventoryError::ProductNotFound(*product_id))?;
            if product.stock_quantity < *quantity {
                return Err(InventoryError::DatabaseError(format!(
                    "CHECK constraint failed: stock_quantity >= 0 for product #{product_id}"
                )));
            }
        }
        for (product_id, quantity) in per_product {
            if let Some(product) = state.products.get_mut(&product_id) {
                product.stock_quantity -= quantity;
                product.lock_version += 1;
                product.updated_at = now;
            }
        }
        let converted =
            active.into_iter().filter_map(|(id, _, _)| state.resolve(id, ReservationStatus::Converted, now)).collect();
        Ok(converted)
    }

    async fn release_reservations_for_order(
        &self,
        order_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, InventoryError> {
        let mut state = self.state();
        let ids = state
            .reservations
            .values()
            .filter(|r| r.order_id == order_id && r.is_active())
            .map(|r| r.id)
            .collect::<Vec<_>>();
        Ok(ids.into_iter().filter_map(|id| state.resolve(id, ReservationStatus::Released, now)).collect())
    }

    async fn release_reservation(
        &self,
        reservation_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Reservation>, InventoryError> {
        Ok(self.state().resolve(reservation_id, ReservationStatus::Released, now))
    }

    async fn fetch_expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, InventoryError> {
        let state = self.state();
        let mut expired = state.reservations.values().filter(|r| r.is_expired_at(now)).cloned().collect::<Vec<_>>();
        expired.sort_by_key(|r| (r.expires_at, r.id));
        Ok(expired)
    }

    async fn fetch_reservations_for_order(&self, order_id: i64) -> Result<Vec<Reservation>, InventoryError> {
        let state = self.state();
        Ok(state.reservations.values().filter(|r| r.order_id == order_id).cloned().collect())
    }
}

impl OrderManagement for MemoryDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderManagementError> {
        let mut state = self.state();
        if state.orders.values().any(|o| o.reference == order.reference) {
            return Err(OrderManagementError::OrderAlreadyExists(order.reference));
        }
        if !state.tenants.contains_key(&order.tenant_id) {
            return Err(OrderManagementError::DatabaseError(format!("Tenant #{} does not exist", order.tenant_id)));
        }
        let now = Utc::now();
        let id = state.next_id();
        let order = Order {
            id,
            tenant_id: order.tenant_id,
            reference: order.reference,
            status: OrderStatusType::Pending,
            total_price: order.total_price,
            currency: order.currency,
            created_at: now,
            updated_at: now,
            paid_at: None,
            completed_at: None,
            cancelled_at: None,
        };
        state.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn fetch_order_by_reference(&self, reference: &str) -> Result<Option<Order>, OrderManagementError> {
        Ok(self.state().orders.values().find(|o| o.reference == reference).cloned())
    }

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, OrderManagementError> {
        Ok(self.state().orders.get(&id).cloned())
    }

    async fn update_order_status(&self, id: i64, change: StatusChange) -> Result<Option<Order>, OrderManagementError> {
        let mut state = self.state();
        let Some(order) = state.orders.get_mut(&id).filter(|o| o.status == change.from) else {
            return Ok(None);
        };
        order.status = change.to;
        order.updated_at = change.at;
        match change.to {
            OrderStatusType::Paid => order.paid_at = Some(change.at),
            OrderStatusType::Complete => order.completed_at = Some(change.at),
            OrderStatusType::Cancelled => order.cancelled_at = Some(change.at),
            OrderStatusType::Pending => {},
        }
        Ok(Some(order.clone()))
    }

    async fn add_note(&self, id: i64, note: &str, author: &str) -> Result<OrderNote, OrderManagementError> {
        if self.fail_next_note.swap(false, Ordering::SeqCst) {
            warn!("🗃️ Failing note for order #{id} on request");
            return Err(OrderManagementError::DatabaseError("injected note failure".to_string()));
        }
        let mut state = self.state();
        if !state.orders.contains_key(&id) {
            return Err(OrderManagementError::OrderNotFound(id));
        }
        let note_id = state.next_id();
        let note =
            OrderNote { id: note_id, order_id: id, note: note.to_string(), author: author.to_string(), created_at: Utc::now() };
        state.notes.push(note.clone());
        Ok(note)
    }

    async fn fetch_notes_for_order(&self, id: i64) -> Result<Vec<OrderNote>, OrderManagementError> {
        Ok(self.state().notes.iter().filter(|n| n.order_id == id).cloned().collect())
    }
}

impl PaymentNotificationManagement for MemoryDatabase {
    async fn fetch_notification_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<PaymentNotificationRecord>, NotificationStoreError> {
        Ok(self.state().notifications.get(idempotency_key).cloned())
    }

    async fn insert_notification(
        &self,
        notification: NewPaymentNotification,
    ) -> Result<InsertNotificationResult, NotificationStoreError> {
        let mut state = self.state();
        if let Some(existing) = state.notifications.get(&notification.idempotency_key) {
            return Ok(InsertNotificationResult::AlreadyExists(existing.clone()));
        }
        let id = state.next_id();
        let record = PaymentNotificationRecord {
            id,
            gateway_transaction_id: notification.gateway_transaction_id,
            idempotency_key: notification.idempotency_key,
            order_id: notification.order_id,
            transaction_status: notification.transaction_status,
            raw_payload: notification.raw_payload,
            signature_verified: notification.signature_verified,
            settled_at: notification.settled_at,
            created_at: Utc::now(),
        };
        state.notifications.insert(record.idempotency_key.clone(), record.clone());
        Ok(InsertNotificationResult::Inserted(record))
    }

    async fn fetch_notifications_for_order(
        &self,
        order_id: i64,
    ) -> Result<Vec<PaymentNotificationRecord>, NotificationStoreError> {
        let state = self.state();
        let mut records =
            state.notifications.values().filter(|n| n.order_id == order_id).cloned().collect::<Vec<_>>();
        records.sort_by_key(|n| n.id);
        Ok(records)
    }
}

impl TenantManagement for MemoryDatabase {
    async fn insert_tenant(&self, name: &str, signing_secret: Secret<String>) -> Result<Tenant, TenantError> {
        let mut state = self.state();
        let id = state.next_id();
        let tenant = Tenant { id, name: name.to_string(), created_at: Utc::now() };
        state.tenants.insert(id, (tenant.clone(), signing_secret.reveal().clone()));
        Ok(tenant)
    }

    async fn fetch_signing_secret(&self, tenant_id: i64) -> Result<Option<Secret<String>>, TenantError> {
        Ok(self.state().tenants.get(&tenant_id).map(|(_, secret)| Secret::new(secret.clone())))
    }
}

#[cfg(test)]
mod test {
    use checkout_common::Money;
    use chrono::Duration;

    use super::*;

    async fn seed(db: &MemoryDatabase, stock: i64) -> (Tenant, Product, Order) {
        let tenant = db.insert_tenant("toko", Secret::new("s3cret".into())).await.unwrap();
        let product = db.insert_product(NewProduct::new(tenant.id, "kopi", stock)).await.unwrap();
        let order = db.insert_order(NewOrder::new(tenant.id, "INV-1", Money::from_major(10))).await.unwrap();
        (tenant, product, order)
    }

    #[tokio::test]
    async fn reservations_never_exceed_stock() {
        let db = MemoryDatabase::new();
        let (tenant, product, order) = seed(&db, 5).await;
        let ttl = Duration::minutes(15);
        db.reserve_stock(NewReservation::new(tenant.id, order.id, product.id, 3, ttl)).await.unwrap();
        let err = db.reserve_stock(NewReservation::new(tenant.id, order.id, product.id, 3, ttl)).await.unwrap_err();
        assert_eq!(err, InventoryError::InsufficientStock { product_id: product.id, requested: 3, available: 2 });
        assert_eq!(db.available_to_sell(product.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn conversion_happens_once() {
        let db = MemoryDatabase::new();
        let (tenant, product, order) = seed(&db, 5).await;
        db.reserve_stock(NewReservation::new(tenant.id, order.id, product.id, 2, Duration::minutes(15))).await.unwrap();
        let first = db.convert_reservations_for_order(order.id, Utc::now()).await.unwrap();
        let second = db.convert_reservations_for_order(order.id, Utc::now()).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(db.fetch_product(product.id).await.unwrap().unwrap().stock_quantity, 3);
    }

    #[tokio::test]
    async fn injected_conversion_failure_changes_nothing() {
        let db = MemoryDatabase::new();
        let (tenant, product, order) = seed(&db, 5).await;
        db.reserve_stock(NewReservation::new(tenant.id, order.id, product.id, 2, Duration::minutes(15))).await.unwrap();
        db.fail_next_conversion();
        assert!(db.convert_reservations_for_order(order.id, Utc::now()).await.is_err());
        assert_eq!(db.fetch_product(product.id).await.unwrap().unwrap().stock_quantity, 5);
        assert_eq!(db.convert_reservations_for_order(order.id, Utc::now()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn status_update_is_compare_and_swap() {
        let db = MemoryDatabase::new();
        let (_, _, order) = seed(&db, 1).await;
        let change = StatusChange::new(OrderStatusType::Pending, OrderStatusType::Paid);
        let paid = db.update_order_status(order.id, change).await.unwrap().unwrap();
        assert_eq!(paid.paid_at, Some(change.at));
        assert!(db.update_order_status(order.id, change).await.unwrap().is_none());
    }
}
