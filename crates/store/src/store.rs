use async_trait::async_trait;
use common::{
    CatalogItemId, CustomerId, NotificationId, NotificationKind, OrderId, OrderStatus,
    SubscriptionId,
};

use crate::{
    CatalogItem, NewNotification, NewOrder, NewOrderItem, NewRestockSubscription, Notification,
    OrderDetails, OrderItemRecord, OrderRecord, RestockSubscription, Result,
};

/// Core persistence port for the order engine.
///
/// Plain reads and the notification/subscription bookkeeping run directly
/// against the store. Anything that must change orders and stock together
/// goes through a [`UnitOfWork`] obtained from [`Store::begin`].
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    /// Starts an atomic unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    // -- catalog (read-only; the catalog collaborator owns these rows) --

    async fn get_catalog_item(&self, item_id: CatalogItemId) -> Result<Option<CatalogItem>>;

    /// Looks up the given items. Missing ids are simply absent from the result.
    async fn find_catalog_items(&self, item_ids: &[CatalogItemId]) -> Result<Vec<CatalogItem>>;

    // -- orders --

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>>;

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItemRecord>>;

    /// Orders placed by a customer with their line items, newest first.
    async fn list_orders_for_customer(&self, customer_id: CustomerId)
    -> Result<Vec<OrderDetails>>;

    /// Every order with its line items, newest first.
    async fn list_orders(&self) -> Result<Vec<OrderDetails>>;

    // -- notifications --

    async fn find_unread_notification(
        &self,
        kind: NotificationKind,
        item_id: CatalogItemId,
    ) -> Result<Option<Notification>>;

    /// Inserts a notification unless an unread one already exists for the
    /// same (kind, item). Returns `None` when the insert was suppressed.
    async fn insert_notification(&self, notification: NewNotification)
    -> Result<Option<Notification>>;

    /// Lists notifications newest first.
    async fn list_notifications(&self, unread_only: bool) -> Result<Vec<Notification>>;

    /// Returns false when no such notification exists.
    async fn mark_notification_read(&self, notification_id: NotificationId) -> Result<bool>;

    /// Returns the number of notifications that changed from unread to read.
    async fn mark_all_notifications_read(&self) -> Result<u64>;

    async fn delete_notification(&self, notification_id: NotificationId) -> Result<bool>;

    async fn count_unread_notifications(&self) -> Result<u64>;

    // -- restock subscriptions --

    /// Creates a subscription, or re-arms the customer's existing one for the
    /// same item (new email, `notified = false`).
    async fn upsert_restock_subscription(
        &self,
        subscription: NewRestockSubscription,
    ) -> Result<RestockSubscription>;

    /// Subscriptions for the item that have not been notified yet, oldest first.
    async fn pending_restock_subscriptions(
        &self,
        item_id: CatalogItemId,
    ) -> Result<Vec<RestockSubscription>>;

    async fn mark_subscriptions_notified(&self, subscription_ids: &[SubscriptionId])
    -> Result<u64>;

    async fn list_restock_subscriptions(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<RestockSubscription>>;

    /// Deletes the subscription only if it belongs to `customer_id`.
    async fn delete_restock_subscription(
        &self,
        subscription_id: SubscriptionId,
        customer_id: CustomerId,
    ) -> Result<bool>;
}

/// An atomic unit of work over orders and stock.
///
/// Nothing written through a unit of work is visible to other readers until
/// [`UnitOfWork::commit`]. Dropping a unit without committing discards it.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Inserts an order in `pending` status.
    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderRecord>;

    async fn insert_order_items(&mut self, order_id: OrderId, items: &[NewOrderItem])
    -> Result<()>;

    /// Reads an order and holds it against concurrent status changes until
    /// the unit ends.
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<OrderRecord>>;

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItemRecord>>;

    /// Moves the order to `next` only if it is still in `expected`.
    /// Returns false when the status had already changed.
    async fn compare_and_set_status(
        &mut self,
        order_id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool>;

    /// Takes `quantity` units in a single conditional update.
    ///
    /// Returns the remaining stock, or `None` when the item does not hold
    /// `quantity` units (zero rows affected). Stock never goes negative.
    async fn decrement_stock(&mut self, item_id: CatalogItemId, quantity: u32)
    -> Result<Option<i32>>;

    /// Adds `quantity` units back and returns the new stock.
    async fn restore_stock(&mut self, item_id: CatalogItemId, quantity: u32) -> Result<i32>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
