use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a numeric row identifier.
///
/// Every table keys its rows by a `BIGINT` identity column; wrapping the raw
/// `i64` keeps an order id from being passed where a catalog item id is expected.
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database identifier.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw database identifier.
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

numeric_id!(
    /// Internal identifier of an order.
    OrderId
);

numeric_id!(
    /// Identifier of an authenticated customer, as issued by the auth collaborator.
    CustomerId
);

numeric_id!(
    /// Identifier of a catalog item (the inventory-bearing product row).
    CatalogItemId
);

numeric_id!(
    /// Identifier of an admin notification row.
    NotificationId
);

numeric_id!(
    /// Identifier of a restock subscription.
    SubscriptionId
);

/// Human-facing order code, e.g. `ORD-3F9A12C07B44`.
///
/// Shown to customers and support staff instead of the internal numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderCode(String);

impl OrderCode {
    const PREFIX: &'static str = "ORD-";

    /// Generates a fresh random order code.
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("{}{}", Self::PREFIX, hex[..12].to_uppercase()))
    }

    /// Wraps an existing code read back from storage.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OrderCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
