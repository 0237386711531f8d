pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use common::{CatalogItemId, CustomerId, NotificationId, OrderId, SubscriptionId};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use records::{
    CatalogItem, ContactInfo, NewNotification, NewOrder, NewOrderItem, NewRestockSubscription,
    Notification, OrderDetails, OrderItemRecord, OrderRecord, RestockSubscription,
};
pub use store::{Store, UnitOfWork};
