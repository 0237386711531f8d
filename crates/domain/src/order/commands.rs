//! Order commands.

use common::{CatalogItemId, CustomerId, Money};
use store::ContactInfo;

/// One requested line: an item, how many, and the price shown at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub item_id: CatalogItemId,

    /// Requested units. Signed so that bad input can be reported rather
    /// than wrapped.
    pub quantity: i64,

    /// Unit price snapshot supplied by the caller.
    pub price: Money,
}

impl OrderLine {
    pub fn new(item_id: CatalogItemId, quantity: i64, price: Money) -> Self {
        Self {
            item_id,
            quantity,
            price,
        }
    }
}

/// Command to place a new order.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    /// The customer placing the order.
    pub customer_id: CustomerId,

    /// Lines in submission order. Repeated items stay separate lines.
    pub lines: Vec<OrderLine>,

    /// Recorded label only; no payment is taken.
    pub payment_method: String,

    pub contact: ContactInfo,
}

impl PlaceOrder {
    /// Creates a new PlaceOrder command with no lines.
    pub fn new(customer_id: CustomerId, payment_method: impl Into<String>) -> Self {
        Self {
            customer_id,
            lines: Vec::new(),
            payment_method: payment_method.into(),
            contact: ContactInfo::default(),
        }
    }

    /// Adds a line to the command.
    pub fn with_line(mut self, item_id: CatalogItemId, quantity: i64, price: Money) -> Self {
        self.lines.push(OrderLine::new(item_id, quantity, price));
        self
    }

    pub fn with_contact(mut self, contact: ContactInfo) -> Self {
        self.contact = contact;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keeps_repeated_items_as_separate_lines() {
        let item = CatalogItemId::new(1);
        let cmd = PlaceOrder::new(CustomerId::new(9), "card")
            .with_line(item, 1, Money::from_cents(100))
            .with_line(item, 2, Money::from_cents(100));

        assert_eq!(cmd.lines.len(), 2);
        assert_eq!(cmd.payment_method, "card");
        assert_eq!(cmd.contact, ContactInfo::default());
    }
}
