use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{
    CatalogItemId, CustomerId, NotificationId, NotificationKind, OrderId, OrderStatus,
    SubscriptionId,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    CatalogItem, NewNotification, NewOrder, NewOrderItem, NewRestockSubscription, Notification,
    OrderDetails, OrderItemRecord, OrderRecord, RestockSubscription, Result, StoreError,
    store::{Store, UnitOfWork},
};

#[derive(Debug, Clone, Copy)]
struct ItemRow {
    order_id: OrderId,
    item_id: CatalogItemId,
    quantity: u32,
    unit_price: common::Money,
}

#[derive(Debug, Clone, Default)]
struct Sequences {
    catalog: i64,
    order: i64,
    notification: i64,
    subscription: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    catalog: BTreeMap<CatalogItemId, CatalogItem>,
    orders: BTreeMap<OrderId, OrderRecord>,
    order_items: Vec<ItemRow>,
    notifications: BTreeMap<NotificationId, Notification>,
    subscriptions: BTreeMap<SubscriptionId, RestockSubscription>,
    sequences: Sequences,
    fail_item_inserts: bool,
}

impl MemoryState {
    fn items_for(&self, order_id: OrderId) -> Vec<OrderItemRecord> {
        self.order_items
            .iter()
            .filter(|row| row.order_id == order_id)
            .map(|row| OrderItemRecord {
                order_id: row.order_id,
                item_id: row.item_id,
                item_name: self.catalog.get(&row.item_id).map(|c| c.name.clone()),
                quantity: row.quantity,
                unit_price: row.unit_price,
            })
            .collect()
    }

    fn details<'a>(&self, orders: impl Iterator<Item = &'a OrderRecord>) -> Vec<OrderDetails> {
        let mut details: Vec<OrderDetails> = orders
            .map(|order| OrderDetails {
                order: order.clone(),
                items: self.items_for(order.id),
            })
            .collect();
        details.sort_by(|a, b| {
            b.order
                .created_at
                .cmp(&a.order.created_at)
                .then(b.order.id.cmp(&a.order.id))
        });
        details
    }
}

/// In-memory store implementation for tests and local runs.
///
/// Units of work are serialized behind a single async mutex: a unit works on
/// a private copy of the state and publishes it on commit, so concurrent
/// checkouts observe each other's committed stock exactly as they would under
/// row locks in PostgreSQL.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a catalog item, standing in for the catalog collaborator.
    pub async fn seed_catalog_item(&self, name: impl Into<String>, stock: i32) -> CatalogItem {
        let mut state = self.state.lock().await;
        let id = CatalogItemId::new(next(&mut state.sequences.catalog));
        let item = CatalogItem {
            id,
            name: name.into(),
            stock: stock.max(0),
        };
        state.catalog.insert(id, item.clone());
        item
    }

    /// Makes every subsequent order-item insert fail until switched off.
    pub async fn set_fail_item_inserts(&self, fail: bool) {
        self.state.lock().await.fail_item_inserts = fail;
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Returns the total number of order items stored.
    pub async fn order_item_count(&self) -> usize {
        self.state.lock().await.order_items.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork { guard, working }))
    }

    async fn get_catalog_item(&self, item_id: CatalogItemId) -> Result<Option<CatalogItem>> {
        Ok(self.state.lock().await.catalog.get(&item_id).cloned())
    }

    async fn find_catalog_items(&self, item_ids: &[CatalogItemId]) -> Result<Vec<CatalogItem>> {
        let state = self.state.lock().await;
        let mut found: Vec<CatalogItem> = state
            .catalog
            .values()
            .filter(|item| item_ids.contains(&item.id))
            .cloned()
            .collect();
        found.sort_by_key(|item| item.id);
        Ok(found)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.state.lock().await.orders.get(&order_id).cloned())
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItemRecord>> {
        Ok(self.state.lock().await.items_for(order_id))
    }

    async fn list_orders_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<OrderDetails>> {
        let state = self.state.lock().await;
        Ok(state.details(
            state
                .orders
                .values()
                .filter(|order| order.customer_id == customer_id),
        ))
    }

    async fn list_orders(&self) -> Result<Vec<OrderDetails>> {
        let state = self.state.lock().await;
        Ok(state.details(state.orders.values()))
    }

    async fn find_unread_notification(
        &self,
        kind: NotificationKind,
        item_id: CatalogItemId,
    ) -> Result<Option<Notification>> {
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .values()
            .find(|n| !n.read && n.kind == kind && n.item_id == item_id)
            .cloned())
    }

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Option<Notification>> {
        let mut state = self.state.lock().await;

        // Mirrors the partial unique index on (kind, item_id) WHERE NOT is_read
        let duplicate = state
            .notifications
            .values()
            .any(|n| !n.read && n.kind == notification.kind && n.item_id == notification.item_id);
        if duplicate {
            return Ok(None);
        }

        let id = NotificationId::new(next(&mut state.sequences.notification));
        let record = Notification {
            id,
            kind: notification.kind,
            item_id: notification.item_id,
            message: notification.message,
            priority: notification.priority,
            read: false,
            created_at: Utc::now(),
        };
        state.notifications.insert(id, record.clone());
        Ok(Some(record))
    }

    async fn list_notifications(&self, unread_only: bool) -> Result<Vec<Notification>> {
        let state = self.state.lock().await;
        let mut notifications: Vec<Notification> = state
            .notifications
            .values()
            .filter(|n| !unread_only || !n.read)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(notifications)
    }

    async fn mark_notification_read(&self, notification_id: NotificationId) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.notifications.get_mut(&notification_id) {
            Some(n) => {
                n.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_notifications_read(&self) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut changed = 0;
        for n in state.notifications.values_mut().filter(|n| !n.read) {
            n.read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn delete_notification(&self, notification_id: NotificationId) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .await
            .notifications
            .remove(&notification_id)
            .is_some())
    }

    async fn count_unread_notifications(&self) -> Result<u64> {
        let state = self.state.lock().await;
        Ok(state.notifications.values().filter(|n| !n.read).count() as u64)
    }

    async fn upsert_restock_subscription(
        &self,
        subscription: NewRestockSubscription,
    ) -> Result<RestockSubscription> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.subscriptions.values_mut().find(|s| {
            s.customer_id == subscription.customer_id && s.item_id == subscription.item_id
        }) {
            existing.email = subscription.email;
            existing.notified = false;
            return Ok(existing.clone());
        }

        let id = SubscriptionId::new(next(&mut state.sequences.subscription));
        let record = RestockSubscription {
            id,
            customer_id: subscription.customer_id,
            item_id: subscription.item_id,
            email: subscription.email,
            notified: false,
            created_at: Utc::now(),
        };
        state.subscriptions.insert(id, record.clone());
        Ok(record)
    }

    async fn pending_restock_subscriptions(
        &self,
        item_id: CatalogItemId,
    ) -> Result<Vec<RestockSubscription>> {
        let state = self.state.lock().await;
        Ok(state
            .subscriptions
            .values()
            .filter(|s| s.item_id == item_id && !s.notified)
            .cloned()
            .collect())
    }

    async fn mark_subscriptions_notified(
        &self,
        subscription_ids: &[SubscriptionId],
    ) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut changed = 0;
        for id in subscription_ids {
            if let Some(s) = state.subscriptions.get_mut(id)
                && !s.notified
            {
                s.notified = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn list_restock_subscriptions(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<RestockSubscription>> {
        let state = self.state.lock().await;
        Ok(state
            .subscriptions
            .values()
            .filter(|s| s.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn delete_restock_subscription(
        &self,
        subscription_id: SubscriptionId,
        customer_id: CustomerId,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        let owned = state
            .subscriptions
            .get(&subscription_id)
            .is_some_and(|s| s.customer_id == customer_id);
        if owned {
            state.subscriptions.remove(&subscription_id);
        }
        Ok(owned)
    }
}

/// A unit of work holding the store's lock and a private working copy.
struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderRecord> {
        let id = OrderId::new(next(&mut self.working.sequences.order));
        let record = OrderRecord {
            id,
            code: order.code,
            customer_id: order.customer_id,
            total: order.total,
            status: OrderStatus::Pending,
            payment_method: order.payment_method,
            contact: order.contact,
            created_at: Utc::now(),
        };
        self.working.orders.insert(id, record.clone());
        Ok(record)
    }

    async fn insert_order_items(
        &mut self,
        order_id: OrderId,
        items: &[NewOrderItem],
    ) -> Result<()> {
        if self.working.fail_item_inserts {
            return Err(StoreError::Database(sqlx::Error::Protocol(
                "order item insert rejected".to_string(),
            )));
        }
        if !self.working.orders.contains_key(&order_id) {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        }
        for item in items {
            if !self.working.catalog.contains_key(&item.item_id) {
                return Err(StoreError::ItemNotFound(item.item_id));
            }
            self.working.order_items.push(ItemRow {
                order_id,
                item_id: item.item_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
            });
        }
        Ok(())
    }

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItemRecord>> {
        Ok(self.working.items_for(order_id))
    }

    async fn compare_and_set_status(
        &mut self,
        order_id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool> {
        match self.working.orders.get_mut(&order_id) {
            Some(order) if order.status == expected => {
                order.status = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn decrement_stock(
        &mut self,
        item_id: CatalogItemId,
        quantity: u32,
    ) -> Result<Option<i32>> {
        let Some(item) = self.working.catalog.get_mut(&item_id) else {
            return Ok(None);
        };
        if i64::from(item.stock) < i64::from(quantity) {
            return Ok(None);
        }
        // stock >= quantity, so quantity fits in i32
        item.stock -= quantity as i32;
        Ok(Some(item.stock))
    }

    async fn restore_stock(&mut self, item_id: CatalogItemId, quantity: u32) -> Result<i32> {
        let item = self
            .working
            .catalog
            .get_mut(&item_id)
            .ok_or(StoreError::ItemNotFound(item_id))?;
        let restored = i64::from(item.stock) + i64::from(quantity);
        item.stock = i32::try_from(restored)
            .map_err(|_| StoreError::Decode(format!("stock overflow for item {item_id}")))?;
        Ok(item.stock)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
