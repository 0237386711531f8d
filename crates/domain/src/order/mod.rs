//! Order lifecycle: placement, cancellation, and the status table behind them.

mod cancellation;
mod commands;
mod lifecycle;
mod pipeline;
mod service;

pub use cancellation::{
    ApprovedCancellation, CancellationWorkflow, RestockEffect, RestoredStock,
};
pub use commands::{OrderLine, PlaceOrder};
pub use lifecycle::{OrderAction, is_settable, next_status};
pub use pipeline::{OrderPipeline, PlacedOrder};
pub use service::OrderService;

/// Order engine settings.
#[derive(Debug, Clone)]
pub struct OrderConfig {
    /// Remaining stock at or below this raises a low-stock alert.
    pub low_stock_threshold: i32,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            low_stock_threshold: 5,
        }
    }
}
