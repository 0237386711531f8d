//! The notification dispatcher.

use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use common::{CatalogItemId, NotificationId, NotificationKind};
use futures_util::future::join_all;
use store::{NewNotification, Notification, Store};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::{DeliveryError, Result};
use crate::message::{OutboundMessage, condition_message};
use crate::transport::NotificationTransport;

/// Bounds on delivery retries.
#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    /// Total attempts per message, the first one included.
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl DeliveryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
            .with_jitter()
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Recipient of admin stock alerts.
    pub admin_email: String,
    pub delivery: DeliveryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            admin_email: "admin@localhost".to_string(),
            delivery: DeliveryPolicy::default(),
        }
    }
}

/// Final result of delivering one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed,
}

/// What `raise_stock_condition` did.
#[derive(Debug)]
pub enum StockAlert {
    /// An unread notification for the same condition already exists.
    Suppressed,
    /// A notification was recorded and its admin message is being delivered.
    Raised {
        notification: Notification,
        delivery: JoinHandle<DeliveryOutcome>,
    },
}

impl StockAlert {
    pub fn is_raised(&self) -> bool {
        matches!(self, StockAlert::Raised { .. })
    }

    pub fn notification(&self) -> Option<&Notification> {
        match self {
            StockAlert::Raised { notification, .. } => Some(notification),
            StockAlert::Suppressed => None,
        }
    }
}

/// Summary of one restock batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestockReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Subscriptions flipped to notified once the batch settled.
    pub marked: u64,
}

/// Records stock-condition notifications and sends their messages.
pub struct NotificationDispatcher<S: Store> {
    store: Arc<S>,
    transport: Arc<dyn NotificationTransport>,
    config: DispatcherConfig,
}

impl<S: Store> Clone for NotificationDispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
        }
    }
}

impl<S: Store + 'static> NotificationDispatcher<S> {
    pub fn new(
        store: Arc<S>,
        transport: Arc<dyn NotificationTransport>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            transport,
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Records a stock condition for the admin unless it is already unread.
    ///
    /// On a fresh notification the admin message is sent on a detached task;
    /// delivery failures never affect the recorded notification.
    #[instrument(skip(self), fields(kind = %kind, item_id = %item_id))]
    pub async fn raise_stock_condition(
        &self,
        kind: NotificationKind,
        item_id: CatalogItemId,
        current_stock: i32,
    ) -> Result<StockAlert> {
        if self
            .store
            .find_unread_notification(kind, item_id)
            .await?
            .is_some()
        {
            debug!("Condition already raised and unread");
            metrics::counter!("stock_alerts_total", "kind" => kind.as_str(), "outcome" => "suppressed")
                .increment(1);
            return Ok(StockAlert::Suppressed);
        }

        let item_name = self.item_name(item_id).await?;
        let priority = kind.priority();
        let inserted = self
            .store
            .insert_notification(NewNotification {
                kind,
                item_id,
                message: condition_message(kind, &item_name, current_stock),
                priority,
            })
            .await?;

        // A concurrent raise can win between the check and the insert
        let Some(notification) = inserted else {
            metrics::counter!("stock_alerts_total", "kind" => kind.as_str(), "outcome" => "suppressed")
                .increment(1);
            return Ok(StockAlert::Suppressed);
        };

        info!(notification_id = %notification.id, "Stock condition raised");
        metrics::counter!("stock_alerts_total", "kind" => kind.as_str(), "outcome" => "raised")
            .increment(1);

        let message = OutboundMessage::stock_alert(
            &self.config.admin_email,
            kind,
            priority,
            &item_name,
            &notification.message,
        );
        let delivery = self.spawn_delivery(message);

        Ok(StockAlert::Raised {
            notification,
            delivery,
        })
    }

    /// Sends a restock notice to every subscriber not yet notified.
    ///
    /// Returns `None` when nobody is waiting. Otherwise the batch runs on a
    /// detached task: all deliveries are attempted, and once they have all
    /// settled every attempted subscription is marked notified, failed ones
    /// included.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn notify_restock_subscribers(
        &self,
        item_id: CatalogItemId,
    ) -> Result<Option<JoinHandle<RestockReport>>> {
        let subscriptions = self.store.pending_restock_subscriptions(item_id).await?;
        if subscriptions.is_empty() {
            debug!("No pending restock subscriptions");
            return Ok(None);
        }

        let (item_name, stock) = match self.store.get_catalog_item(item_id).await? {
            Some(item) => (item.name, item.stock),
            None => (format!("item #{item_id}"), 0),
        };

        let store = Arc::clone(&self.store);
        let transport = Arc::clone(&self.transport);
        let policy = self.config.delivery.clone();

        let handle = tokio::spawn(async move {
            let ids: Vec<_> = subscriptions.iter().map(|s| s.id).collect();
            let outcomes = join_all(subscriptions.iter().map(|subscription| {
                let message =
                    OutboundMessage::restock_notice(&subscription.email, &item_name, stock);
                let transport = Arc::clone(&transport);
                let policy = policy.clone();
                async move { deliver(transport.as_ref(), &policy, &message).await }
            }))
            .await;

            let delivered = outcomes
                .iter()
                .filter(|outcome| **outcome == DeliveryOutcome::Delivered)
                .count();
            let mut report = RestockReport {
                attempted: outcomes.len(),
                delivered,
                failed: outcomes.len() - delivered,
                marked: 0,
            };

            match store.mark_subscriptions_notified(&ids).await {
                Ok(marked) => report.marked = marked,
                Err(e) => warn!(item_id = %item_id, error = %e, "Failed to mark subscriptions notified"),
            }

            info!(
                item_id = %item_id,
                attempted = report.attempted,
                delivered = report.delivered,
                failed = report.failed,
                "Restock batch settled"
            );
            report
        });

        Ok(Some(handle))
    }

    pub async fn list_notifications(&self, unread_only: bool) -> Result<Vec<Notification>> {
        Ok(self.store.list_notifications(unread_only).await?)
    }

    /// Returns false when the notification does not exist.
    #[instrument(skip(self))]
    pub async fn mark_read(&self, notification_id: NotificationId) -> Result<bool> {
        Ok(self.store.mark_notification_read(notification_id).await?)
    }

    #[instrument(skip(self))]
    pub async fn mark_all_read(&self) -> Result<u64> {
        Ok(self.store.mark_all_notifications_read().await?)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, notification_id: NotificationId) -> Result<bool> {
        Ok(self.store.delete_notification(notification_id).await?)
    }

    pub async fn count_unread(&self) -> Result<u64> {
        Ok(self.store.count_unread_notifications().await?)
    }

    async fn item_name(&self, item_id: CatalogItemId) -> Result<String> {
        Ok(self
            .store
            .get_catalog_item(item_id)
            .await?
            .map(|item| item.name)
            .unwrap_or_else(|| format!("item #{item_id}")))
    }

    fn spawn_delivery(&self, message: OutboundMessage) -> JoinHandle<DeliveryOutcome> {
        let transport = Arc::clone(&self.transport);
        let policy = self.config.delivery.clone();
        tokio::spawn(async move { deliver(transport.as_ref(), &policy, &message).await })
    }
}

/// Delivers one message, retrying retryable failures within `policy`.
async fn deliver(
    transport: &dyn NotificationTransport,
    policy: &DeliveryPolicy,
    message: &OutboundMessage,
) -> DeliveryOutcome {
    let result = (|| async { transport.send(message).await })
        .retry(policy.backoff())
        .when(|e: &DeliveryError| e.is_retryable())
        .notify(|err: &DeliveryError, dur: Duration| {
            warn!(
                transport = transport.name(),
                to = %message.to,
                error = %err,
                delay = ?dur,
                "Delivery failed, retrying"
            );
        })
        .await;

    match result {
        Ok(()) => {
            metrics::counter!("notification_deliveries_total", "outcome" => "delivered")
                .increment(1);
            DeliveryOutcome::Delivered
        }
        Err(e) => {
            warn!(
                transport = transport.name(),
                to = %message.to,
                error = %e,
                "Delivery abandoned"
            );
            metrics::counter!("notification_deliveries_total", "outcome" => "failed")
                .increment(1);
            DeliveryOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryTransport;
    use common::CustomerId;
    use store::{InMemoryStore, NewRestockSubscription};

    fn fast_config() -> DispatcherConfig {
        DispatcherConfig {
            admin_email: "ops@example.com".to_string(),
            delivery: DeliveryPolicy {
                max_attempts: 3,
                min_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
        }
    }

    fn setup() -> (
        Arc<InMemoryStore>,
        InMemoryTransport,
        NotificationDispatcher<InMemoryStore>,
    ) {
        let store = Arc::new(InMemoryStore::new());
        let transport = InMemoryTransport::new();
        let dispatcher = NotificationDispatcher::new(
            Arc::clone(&store),
            Arc::new(transport.clone()),
            fast_config(),
        );
        (store, transport, dispatcher)
    }

    async fn delivered(alert: StockAlert) -> DeliveryOutcome {
        match alert {
            StockAlert::Raised { delivery, .. } => delivery.await.unwrap(),
            StockAlert::Suppressed => panic!("expected a raised alert"),
        }
    }

    #[tokio::test]
    async fn raise_records_and_mails_admin() {
        let (store, transport, dispatcher) = setup();
        let lamp = store.seed_catalog_item("Desk Lamp", 0).await;

        let alert = dispatcher
            .raise_stock_condition(NotificationKind::OutOfStock, lamp.id, 0)
            .await
            .unwrap();
        let notification = alert.notification().unwrap().clone();
        assert_eq!(notification.message, "Desk Lamp is out of stock");
        assert_eq!(notification.priority, common::Priority::High);
        assert_eq!(delivered(alert).await, DeliveryOutcome::Delivered);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ops@example.com");
    }

    #[tokio::test]
    async fn repeated_condition_is_suppressed_while_unread() {
        let (store, transport, dispatcher) = setup();
        let lamp = store.seed_catalog_item("Desk Lamp", 2).await;

        let first = dispatcher
            .raise_stock_condition(NotificationKind::LowStock, lamp.id, 2)
            .await
            .unwrap();
        delivered(first).await;
        let second = dispatcher
            .raise_stock_condition(NotificationKind::LowStock, lamp.id, 1)
            .await
            .unwrap();

        assert!(!second.is_raised());
        assert_eq!(dispatcher.list_notifications(false).await.unwrap().len(), 1);
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn different_kind_for_same_item_is_not_suppressed() {
        let (store, _transport, dispatcher) = setup();
        let lamp = store.seed_catalog_item("Desk Lamp", 0).await;

        assert!(
            dispatcher
                .raise_stock_condition(NotificationKind::LowStock, lamp.id, 1)
                .await
                .unwrap()
                .is_raised()
        );
        assert!(
            dispatcher
                .raise_stock_condition(NotificationKind::OutOfStock, lamp.id, 0)
                .await
                .unwrap()
                .is_raised()
        );
        assert_eq!(dispatcher.count_unread().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn reading_all_rearms_the_condition() {
        let (store, _transport, dispatcher) = setup();
        let lamp = store.seed_catalog_item("Desk Lamp", 0).await;

        dispatcher
            .raise_stock_condition(NotificationKind::OutOfStock, lamp.id, 0)
            .await
            .unwrap();
        assert_eq!(dispatcher.mark_all_read().await.unwrap(), 1);

        let again = dispatcher
            .raise_stock_condition(NotificationKind::OutOfStock, lamp.id, 0)
            .await
            .unwrap();
        assert!(again.is_raised());
        assert_eq!(dispatcher.list_notifications(false).await.unwrap().len(), 2);
        assert_eq!(dispatcher.list_notifications(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_delivery_keeps_the_notification() {
        let (store, transport, dispatcher) = setup();
        let lamp = store.seed_catalog_item("Desk Lamp", 0).await;
        transport.set_fail_on_send(true);

        let alert = dispatcher
            .raise_stock_condition(NotificationKind::OutOfStock, lamp.id, 0)
            .await
            .unwrap();

        assert_eq!(delivered(alert).await, DeliveryOutcome::Failed);
        assert_eq!(transport.attempt_count(), 3);
        assert_eq!(dispatcher.count_unread().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let (store, transport, dispatcher) = setup();
        let lamp = store.seed_catalog_item("Desk Lamp", 0).await;
        transport.fail_next(2);

        let alert = dispatcher
            .raise_stock_condition(NotificationKind::OutOfStock, lamp.id, 0)
            .await
            .unwrap();

        assert_eq!(delivered(alert).await, DeliveryOutcome::Delivered);
        assert_eq!(transport.attempt_count(), 3);
    }

    #[tokio::test]
    async fn no_pending_subscribers_is_a_no_op() {
        let (store, transport, dispatcher) = setup();
        let lamp = store.seed_catalog_item("Desk Lamp", 4).await;

        let handle = dispatcher.notify_restock_subscribers(lamp.id).await.unwrap();
        assert!(handle.is_none());
        assert_eq!(transport.attempt_count(), 0);
    }

    #[tokio::test]
    async fn restock_batch_marks_everyone_even_on_failure() {
        let (store, transport, dispatcher) = setup();
        let lamp = store.seed_catalog_item("Desk Lamp", 4).await;
        for (customer, email) in [(1, "a@example.com"), (2, "gone@example.com")] {
            store
                .upsert_restock_subscription(NewRestockSubscription {
                    customer_id: CustomerId::new(customer),
                    item_id: lamp.id,
                    email: email.to_string(),
                })
                .await
                .unwrap();
        }
        transport.reject_recipient("gone@example.com");

        let report = dispatcher
            .notify_restock_subscribers(lamp.id)
            .await
            .unwrap()
            .unwrap()
            .await
            .unwrap();

        assert_eq!(
            report,
            RestockReport {
                attempted: 2,
                delivered: 1,
                failed: 1,
                marked: 2,
            }
        );
        assert_eq!(transport.sent()[0].subject, "Desk Lamp is back in stock");
        assert!(
            store
                .pending_restock_subscriptions(lamp.id)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(
            dispatcher
                .notify_restock_subscribers(lamp.id)
                .await
                .unwrap()
                .is_none()
        );
    }
}
