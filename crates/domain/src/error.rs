//! Domain error types.

use common::{CatalogItemId, Money, OrderId, OrderStatus, SubscriptionId};
use store::StoreError;
use thiserror::Error;

/// Coarse classification of an [`OrderError`], used for status mapping and
/// metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, rejected before anything is written.
    Validation,
    NotFound,
    /// The order's status does not allow the requested action.
    InvalidTransition,
    /// Concurrent demand the store could not satisfy.
    Conflict,
    Forbidden,
    Persistence,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Persistence => "persistence",
        }
    }
}

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The order request carried no lines.
    #[error("Order has no items")]
    EmptyOrder,

    /// Quantity must be a positive integer.
    #[error("Invalid quantity {quantity} for item {item_id} (must be greater than 0)")]
    InvalidQuantity { item_id: CatalogItemId, quantity: i64 },

    /// Unit price must not be negative.
    #[error("Invalid price {price} for item {item_id}")]
    InvalidPrice { item_id: CatalogItemId, price: Money },

    /// The order total does not fit the money representation.
    #[error("Order total is out of range")]
    TotalOutOfRange,

    #[error("Payment method is required")]
    MissingPaymentMethod,

    /// A text field exceeds what the order record can hold.
    #[error("{field} is longer than {max} characters")]
    FieldTooLong { field: &'static str, max: usize },

    /// Restock subscriptions need a deliverable address.
    #[error("Invalid email address: {0:?}")]
    InvalidEmail(String),

    /// Direct status updates only accept a fixed set of targets.
    #[error("Status {0} cannot be set directly")]
    StatusNotSettable(OrderStatus),

    /// A referenced catalog item does not exist.
    #[error("Catalog item not found: {0}")]
    ItemNotFound(CatalogItemId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Restock subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    /// The order's current status blocks the action.
    #[error("Cannot {action} order in {current} status")]
    InvalidTransition {
        current: OrderStatus,
        action: &'static str,
    },

    /// Not enough stock was on hand when the decrement ran.
    #[error("Insufficient stock for item {item_id}: requested {requested}")]
    InsufficientStock {
        item_id: CatalogItemId,
        requested: u32,
    },

    /// A customer tried to act on someone else's order.
    #[error("Order {0} belongs to another customer")]
    NotOrderOwner(OrderId),

    /// Storage failed while the order was being written; nothing was kept.
    #[error("Order creation failed: {0}")]
    OrderCreationFailed(#[source] StoreError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::EmptyOrder
            | OrderError::InvalidQuantity { .. }
            | OrderError::InvalidPrice { .. }
            | OrderError::TotalOutOfRange
            | OrderError::MissingPaymentMethod
            | OrderError::FieldTooLong { .. }
            | OrderError::InvalidEmail(_)
            | OrderError::StatusNotSettable(_) => ErrorKind::Validation,
            OrderError::ItemNotFound(_)
            | OrderError::OrderNotFound(_)
            | OrderError::SubscriptionNotFound(_) => ErrorKind::NotFound,
            OrderError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            OrderError::InsufficientStock { .. } => ErrorKind::Conflict,
            OrderError::NotOrderOwner(_) => ErrorKind::Forbidden,
            OrderError::OrderCreationFailed(_) | OrderError::Persistence(_) => {
                ErrorKind::Persistence
            }
        }
    }
}

/// Convenience type alias for order results.
pub type Result<T> = std::result::Result<T, OrderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_names_the_blocking_status() {
        let err = OrderError::InvalidTransition {
            current: OrderStatus::Shipped,
            action: "request cancellation of",
        };
        assert_eq!(
            err.to_string(),
            "Cannot request cancellation of order in shipped status"
        );
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(OrderError::EmptyOrder.kind(), ErrorKind::Validation);
        assert_eq!(
            OrderError::ItemNotFound(CatalogItemId::new(1)).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            OrderError::InsufficientStock {
                item_id: CatalogItemId::new(1),
                requested: 3
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            OrderError::NotOrderOwner(OrderId::new(1)).kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            OrderError::OrderCreationFailed(StoreError::Decode("bad".into())).kind(),
            ErrorKind::Persistence
        );
    }
}
