use std::{collections::BTreeMap, fmt::Debug};

use checkout_common::Money;
use chrono::Utc;
use log::*;

use crate::{
    api::{
        errors::{PartialInventoryFailure, ReconciliationError},
        notification_objects::{CancellationReason, GatewayStatus, NotificationOutcome, PaymentNotification},
        order_state_api::OrderStateApi,
        reservation_api::ReservationApi,
    },
    db_types::{NewPaymentNotification, Order, OrderItem, OrderStatusType, Reservation},
    events::{EventProducers, OrderAnnulledEvent, OrderPaidEvent},
    helpers::{calculate_notification_signature, verify_notification_signature},
    traits::{CheckoutDatabase, InsertNotificationResult},
};

/// The author recorded on notes that payment notifications add to orders
pub const PAYMENT_GATEWAY_AUTHOR: &str = "payment-gateway";

/// `PaymentReconciliationApi` consumes payment gateway notifications and drives orders and their reservations
/// accordingly.
///
/// Notifications are untrusted and are delivered at least once, so every notification is
/// 1. deduplicated by its idempotency key (transaction id plus status),
/// 2. matched to its order by reference,
/// 3. authenticated against the signing secret of the order's tenant,
/// 4. applied to the order: `settlement`/`capture` pay it and convert its reservations, `pending` leaves it alone,
///    `cancel`/`deny`/`expire` release its reservations and cancel it,
/// 5. recorded in the notification ledger, which closes the idempotency window.
///
/// Signature failures, unknown orders and invalid transitions are returned as errors and leave no trace in the ledger.
pub struct PaymentReconciliationApi<B> {
    db: B,
    reservations: ReservationApi<B>,
    orders: OrderStateApi<B>,
    producers: EventProducers,
}

impl<B> Debug for PaymentReconciliationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentReconciliationApi")
    }
}

impl<B: Clone> Clone for PaymentReconciliationApi<B> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            reservations: self.reservations.clone(),
            orders: self.orders.clone(),
            producers: self.producers.clone(),
        }
    }
}

impl<B: Clone> PaymentReconciliationApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        let reservations = ReservationApi::new(db.clone());
        let orders = OrderStateApi::new(db.clone());
        Self { db, reservations, orders, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> PaymentReconciliationApi<B>
where B: CheckoutDatabase
{
    /// Parses a raw notification body and processes it. The body is stored verbatim in the notification ledger.
    pub async fn process_raw_notification(&self, body: &str) -> Result<NotificationOutcome, ReconciliationError> {
        let notification = serde_json::from_str::<PaymentNotification>(body).map_err(|e| {
            warn!("💳️ Could not parse payment notification. {e}");
            ReconciliationError::MalformedNotification(e.to_string())
        })?;
        self.process_notification(notification, body).await
    }

    pub async fn process_notification(
        &self,
        notification: PaymentNotification,
        raw_payload: &str,
    ) -> Result<NotificationOutcome, ReconciliationError> {
        if let Some(field) = notification.missing_field() {
            return Err(ReconciliationError::MalformedNotification(format!("{field} is missing")));
        }
        let key = notification.idempotency_key();
        if self.db.fetch_notification_by_key(&key).await?.is_some() {
            info!("💳️ Payment notification [{key}] has already been processed. Ignoring it.");
            return Ok(NotificationOutcome::AlreadyProcessed);
        }
        let order = self
            .db
            .fetch_order_by_reference(&notification.order_reference)
            .await?
            .ok_or_else(|| {
                warn!("💳️ Payment notification [{key}] refers to unknown order {}", notification.order_reference);
                ReconciliationError::OrderNotFound(notification.order_reference.clone())
            })?;
        self.authenticate(&notification, &order).await?;
        let amount = self.check_amount(&notification, &order);
        let order_id = order.id;

        let status = notification.gateway_status();
        debug!("💳️ Payment notification [{key}] for order {} maps to {status:?}", order.reference);
        let (outcome, settled) = match status {
            GatewayStatus::Success => (self.on_payment_success(&notification, order, amount).await?, true),
            GatewayStatus::Pending => {
                info!("💳️ Payment for order {} is pending. Nothing to do yet.", order.reference);
                (NotificationOutcome::Pending { order }, false)
            },
            GatewayStatus::Failure(reason) => (self.on_payment_failure(order, reason).await?, false),
            GatewayStatus::Unknown(status) => {
                warn!("💳️ Unhandled transaction status '{status}' for order {}. No action taken.", order.reference);
                (NotificationOutcome::Unhandled { status }, false)
            },
        };
        self.record_notification(&notification, order_id, raw_payload, settled).await?;
        Ok(outcome)
    }

    async fn authenticate(&self, notification: &PaymentNotification, order: &Order) -> Result<(), ReconciliationError> {
        let secret = self
            .db
            .fetch_signing_secret(order.tenant_id)
            .await?
            .ok_or(ReconciliationError::TenantSecretMissing(order.tenant_id))?;
        let valid = verify_notification_signature(
            &notification.signature,
            &notification.order_reference,
            &notification.status_code,
            &notification.gross_amount,
            secret.reveal(),
        );
        if !valid {
            let expected = calculate_notification_signature(
                &notification.order_reference,
                &notification.status_code,
                &notification.gross_amount,
                secret.reveal(),
            );
            warn!(
                "💳️ Invalid signature on payment notification [{}] for order {}. Expected {expected}, received {}",
                notification.transaction_id, order.reference, notification.signature
            );
            return Err(ReconciliationError::SignatureInvalid(order.reference.clone()));
        }
        trace!("💳️ Signature verified for payment notification [{}]", notification.transaction_id);
        Ok(())
    }

    /// The reported amount is advisory. The signature already binds it, so an amount that disagrees with the order or
    /// cannot be read is logged and the order total stands in for it.
    fn check_amount(&self, notification: &PaymentNotification, order: &Order) -> Money {
        match notification.gross_amount.parse::<Money>() {
            Ok(amount) if amount != order.total_price => {
                warn!(
                    "💳️ Payment notification for order {} reports {amount}, but the order total is {}",
                    order.reference, order.total_price
                );
                amount
            },
            Ok(amount) => amount,
            Err(e) => {
                warn!(
                    "💳️ Payment notification for order {} has an unreadable amount '{}'. Using the order total {}. {e}",
                    order.reference, notification.gross_amount, order.total_price
                );
                order.total_price
            },
        }
    }

    async fn on_payment_success(
        &self,
        notification: &PaymentNotification,
        order: Order,
        amount: Money,
    ) -> Result<NotificationOutcome, ReconciliationError> {
        let transition = self.orders.transition(order.id, OrderStatusType::Paid).await?;
        let order = transition.order;
        let (items, inventory_failure) = match self.reservations.convert_reservations_to_permanent(order.id).await {
            Ok(converted) => (line_items(&converted), None),
            Err(e) => {
                let failure =
                    PartialInventoryFailure { order_id: order.id, reference: order.reference.clone(), reason: e.to_string() };
                error!("🚨️ {failure}. Manual stock reconciliation is required.");
                (Vec::new(), Some(failure))
            },
        };
        if transition.changed {
            info!("💳️ Order {} has been paid", order.reference);
            let event = OrderPaidEvent::new(order.clone(), items, amount, notification.payment_type.clone());
            for emitter in &self.producers.order_paid_producer {
                debug!("💳️ Notifying order paid hook subscribers");
                emitter.publish_event(event.clone()).await;
            }
        }
        Ok(NotificationOutcome::Paid { order, inventory_failure })
    }

    async fn on_payment_failure(
        &self,
        order: Order,
        reason: CancellationReason,
    ) -> Result<NotificationOutcome, ReconciliationError> {
        self.reservations.release_reservations(order.id).await?;
        let transition = self.orders.transition(order.id, OrderStatusType::Cancelled).await?;
        let order = transition.order;
        // A retry after a failed note write finds the order already cancelled, so the note is keyed off its absence.
        let noted = self.orders.notes(order.id).await?.iter().any(|n| n.author == PAYMENT_GATEWAY_AUTHOR);
        if !noted {
            self.orders.add_note(order.id, reason.note(), PAYMENT_GATEWAY_AUTHOR).await?;
        }
        if transition.changed {
            info!("💳️ Order {} has been cancelled: {reason}", order.reference);
            let event = OrderAnnulledEvent::new(order.clone(), reason.note());
            for emitter in &self.producers.order_annulled_producer {
                debug!("💳️ Notifying order annulled hook subscribers");
                emitter.publish_event(event.clone()).await;
            }
        }
        Ok(NotificationOutcome::Cancelled { order, reason })
    }

    async fn record_notification(
        &self,
        notification: &PaymentNotification,
        order_id: i64,
        raw_payload: &str,
        settled: bool,
    ) -> Result<(), ReconciliationError> {
        let record = NewPaymentNotification {
            gateway_transaction_id: notification.transaction_id.clone(),
            idempotency_key: notification.idempotency_key(),
            order_id,
            transaction_status: notification.transaction_status.trim().to_lowercase(),
            raw_payload: raw_payload.to_string(),
            signature_verified: true,
            settled_at: settled.then(Utc::now),
        };
        match self.db.insert_notification(record).await? {
            InsertNotificationResult::Inserted(r) => {
                debug!("💳️ Payment notification [{}] recorded", r.idempotency_key);
            },
            InsertNotificationResult::AlreadyExists(r) => {
                debug!("💳️ Payment notification [{}] was recorded concurrently", r.idempotency_key);
            },
        }
        Ok(())
    }
}

/// Sums converted reservations into one line item per product.
fn line_items(reservations: &[Reservation]) -> Vec<OrderItem> {
    let mut items = BTreeMap::<i64, i64>::new();
    for r in reservations {
        *items.entry(r.product_id).or_default() += r.quantity;
    }
    items.into_iter().map(|(product_id, quantity)| OrderItem::new(product_id, quantity)).collect()
}
