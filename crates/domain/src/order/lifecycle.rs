//! Order status transition table.
//!
//! ```text
//! pending ─────────┬──► pending_cancellation ──┬──► cancelled
//! processing ──────┘                           └──► processing
//!
//! any status ──(admin set)──► pending | shipped | delivered | completed | cancelled
//! ```
//!
//! Every status change in the crate is validated here before it is written.

use common::OrderStatus;

use crate::error::{OrderError, Result};

/// Something a customer or admin asks to do to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    /// Customer asks to cancel; stock is untouched until approval.
    RequestCancellation,
    ApproveCancellation,
    /// Admin declines the cancellation and resumes the order.
    RejectCancellation,
    /// Admin correction to an explicit status.
    SetStatus(OrderStatus),
}

impl OrderAction {
    /// Metric label for the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::RequestCancellation => "request_cancellation",
            OrderAction::ApproveCancellation => "approve_cancellation",
            OrderAction::RejectCancellation => "reject_cancellation",
            OrderAction::SetStatus(_) => "set_status",
        }
    }

    /// Phrase used in transition errors.
    pub(crate) fn verb(&self) -> &'static str {
        match self {
            OrderAction::RequestCancellation => "request cancellation of",
            OrderAction::ApproveCancellation => "approve cancellation of",
            OrderAction::RejectCancellation => "reject cancellation of",
            OrderAction::SetStatus(_) => "set status of",
        }
    }

    /// The status this action leads to from `current`, if it is allowed.
    pub fn target(&self, current: OrderStatus) -> Option<OrderStatus> {
        use OrderStatus::*;

        match (self, current) {
            (OrderAction::RequestCancellation, Pending | Processing) => Some(PendingCancellation),
            (OrderAction::ApproveCancellation, PendingCancellation) => Some(Cancelled),
            (OrderAction::RejectCancellation, PendingCancellation) => Some(Processing),
            (OrderAction::SetStatus(target), _) if is_settable(*target) => Some(*target),
            _ => None,
        }
    }
}

/// Statuses an admin may set directly.
pub fn is_settable(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::Pending
            | OrderStatus::Shipped
            | OrderStatus::Delivered
            | OrderStatus::Completed
            | OrderStatus::Cancelled
    )
}

/// Validates `action` against `current` and returns the next status.
pub fn next_status(current: OrderStatus, action: OrderAction) -> Result<OrderStatus> {
    if let OrderAction::SetStatus(target) = action
        && !is_settable(target)
    {
        return Err(OrderError::StatusNotSettable(target));
    }

    action
        .target(current)
        .ok_or(OrderError::InvalidTransition {
            current,
            action: action.verb(),
        })
}
