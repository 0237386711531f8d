//! Outbound message and the text of each notification kind.

use common::{NotificationKind, Priority};
use serde::{Deserialize, Serialize};

/// An email-style message handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutboundMessage {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Admin alert for a freshly recorded notification.
    pub fn stock_alert(
        admin_email: &str,
        kind: NotificationKind,
        priority: Priority,
        item_name: &str,
        message: &str,
    ) -> Self {
        let label = match kind {
            NotificationKind::LowStock => "Low stock",
            NotificationKind::OutOfStock => "Out of stock",
            NotificationKind::Restock => "Restocked",
        };
        Self::new(
            admin_email,
            format!("[{priority}] {label}: {item_name}"),
            format!("{message}\n\nReview the item in the admin notifications panel."),
        )
    }

    /// Customer notice that a subscribed item is available again.
    pub fn restock_notice(to: &str, item_name: &str, stock: i32) -> Self {
        Self::new(
            to,
            format!("{item_name} is back in stock"),
            format!(
                "Good news: {item_name} is available again ({stock} in stock). \
                 Stock is limited, so order soon if you are still interested."
            ),
        )
    }
}

/// The text recorded on a notification row.
pub fn condition_message(kind: NotificationKind, item_name: &str, stock: i32) -> String {
    match kind {
        NotificationKind::OutOfStock => format!("{item_name} is out of stock"),
        NotificationKind::LowStock => format!("{item_name} is running low: {stock} left"),
        NotificationKind::Restock => {
            format!("{item_name} is back in stock: {stock} available")
        }
    }
}
