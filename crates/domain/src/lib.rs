//! Domain layer for the storefront order engine.
//!
//! This crate provides:
//! - the order status transition table
//! - the inventory ledger, the only writer of catalog stock
//! - the order creation pipeline and the cancellation workflow
//! - `OrderService`, the facade the HTTP layer talks to

pub mod error;
pub mod inventory;
pub mod order;

pub use error::{ErrorKind, OrderError, Result};
pub use inventory::{InventoryLedger, stock_condition};
pub use order::{
    ApprovedCancellation, CancellationWorkflow, OrderAction, OrderConfig, OrderLine,
    OrderPipeline, OrderService, PlaceOrder, PlacedOrder, RestockEffect, RestoredStock,
    is_settable, next_status,
};
