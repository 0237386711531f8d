//! Shared vocabulary for the storefront order engine.
//!
//! Identifiers, money, and the status/kind enums that every other crate
//! persists or reasons about.

mod money;
mod status;
mod types;

pub use money::Money;
pub use status::{NotificationKind, OrderStatus, ParseEnumError, Priority};
pub use types::{CatalogItemId, CustomerId, NotificationId, OrderCode, OrderId, SubscriptionId};
