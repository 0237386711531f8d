//! Stock-condition notifications for the order engine.
//!
//! The [`NotificationDispatcher`] records admin notifications (deduplicated
//! per unread `(kind, item)` pair) and restock alerts for subscribed
//! customers. Outbound messages go through a [`NotificationTransport`] on
//! detached tasks, so delivery never holds up or fails the caller.

pub mod dispatcher;
pub mod error;
pub mod message;
pub mod transport;

pub use dispatcher::{
    DeliveryOutcome, DeliveryPolicy, DispatcherConfig, NotificationDispatcher, RestockReport,
    StockAlert,
};
pub use error::{DeliveryError, NotificationError, Result};
pub use message::OutboundMessage;
pub use transport::{
    InMemoryTransport, LogTransport, NotificationTransport, WebhookConfig, WebhookTransport,
};
