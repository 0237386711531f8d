//! Row types read from and written to the store.

use chrono::{DateTime, Utc};
use common::{
    CatalogItemId, CustomerId, Money, NotificationId, NotificationKind, OrderCode, OrderId,
    OrderStatus, Priority, SubscriptionId,
};
use serde::{Deserialize, Serialize};

/// Inventory view of a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogItem {
    pub id: CatalogItemId,
    pub name: String,
    /// Units on hand; never negative.
    pub stock: i32,
}

/// Denormalized shipping contact captured with an order.
///
/// Used only for display; nothing here is validated against an address service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
}

/// An order about to be inserted. Status always starts at `pending`.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub code: OrderCode,
    pub customer_id: CustomerId,
    pub total: Money,
    pub payment_method: String,
    pub contact: ContactInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub code: OrderCode,
    pub customer_id: CustomerId,
    pub total: Money,
    pub status: OrderStatus,
    pub payment_method: String,
    pub contact: ContactInfo,
    pub created_at: DateTime<Utc>,
}

/// A line item about to be inserted; `unit_price` is the checkout-time snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrderItem {
    pub item_id: CatalogItemId,
    pub quantity: u32,
    pub unit_price: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItemRecord {
    pub order_id: OrderId,
    pub item_id: CatalogItemId,
    /// Current catalog name, if the item still exists.
    pub item_name: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderItemRecord {
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// An order together with its line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetails {
    pub order: OrderRecord,
    pub items: Vec<OrderItemRecord>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub item_id: CatalogItemId,
    pub message: String,
    pub priority: Priority,
}

/// An admin-facing record of a raised stock condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub item_id: CatalogItemId,
    pub message: String,
    pub priority: Priority,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRestockSubscription {
    pub customer_id: CustomerId,
    pub item_id: CatalogItemId,
    pub email: String,
}

/// A customer's standing request to hear when an item is back in stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestockSubscription {
    pub id: SubscriptionId,
    pub customer_id: CustomerId,
    pub item_id: CatalogItemId,
    pub email: String,
    pub notified: bool,
    pub created_at: DateTime<Utc>,
}
