//! Inventory ledger: the only code that moves catalog stock.

use common::{CatalogItemId, NotificationKind};
use store::{StoreError, UnitOfWork};
use tracing::debug;

use crate::error::{OrderError, Result};

/// Stock mutations inside one unit of work.
///
/// Deductions happen when an order is placed and restorations when a
/// cancellation is approved; no other path writes stock.
pub struct InventoryLedger<'u> {
    uow: &'u mut dyn UnitOfWork,
}

impl<'u> InventoryLedger<'u> {
    pub fn new(uow: &'u mut dyn UnitOfWork) -> Self {
        Self { uow }
    }

    /// Takes `quantity` units with a single conditional decrement.
    ///
    /// Returns the remaining stock, or `InsufficientStock` when the item did
    /// not hold that many units at the moment of the update.
    pub async fn deduct(&mut self, item_id: CatalogItemId, quantity: u32) -> Result<i32> {
        match self.uow.decrement_stock(item_id, quantity).await {
            Ok(Some(remaining)) => {
                debug!(item_id = %item_id, quantity, remaining, "Stock deducted");
                Ok(remaining)
            }
            Ok(None) => Err(OrderError::InsufficientStock {
                item_id,
                requested: quantity,
            }),
            Err(e) => Err(stock_error(e)),
        }
    }

    /// Adds `quantity` units back and returns the new stock. Uncapped.
    pub async fn restore(&mut self, item_id: CatalogItemId, quantity: u32) -> Result<i32> {
        let stock = self
            .uow
            .restore_stock(item_id, quantity)
            .await
            .map_err(stock_error)?;
        debug!(item_id = %item_id, quantity, stock, "Stock restored");
        metrics::counter!("stock_restored_units_total").increment(u64::from(quantity));
        Ok(stock)
    }
}

fn stock_error(e: StoreError) -> OrderError {
    match e {
        StoreError::ItemNotFound(item_id) => OrderError::ItemNotFound(item_id),
        other => OrderError::Persistence(other),
    }
}

/// The stock condition worth telling an admin about, if any.
///
/// Zero is out of stock; anything at or below `low_stock_threshold` is low.
pub fn stock_condition(stock: i32, low_stock_threshold: i32) -> Option<NotificationKind> {
    if stock <= 0 {
        Some(NotificationKind::OutOfStock)
    } else if stock <= low_stock_threshold {
        Some(NotificationKind::LowStock)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::{InMemoryStore, Store};

    #[test]
    fn classifies_stock_levels() {
        assert_eq!(stock_condition(0, 5), Some(NotificationKind::OutOfStock));
        assert_eq!(stock_condition(1, 5), Some(NotificationKind::LowStock));
        assert_eq!(stock_condition(5, 5), Some(NotificationKind::LowStock));
        assert_eq!(stock_condition(6, 5), None);
        assert_eq!(stock_condition(0, 0), Some(NotificationKind::OutOfStock));
        assert_eq!(stock_condition(1, 0), None);
    }

    #[tokio::test]
    async fn deduct_reports_insufficient_stock() {
        let store = InMemoryStore::new();
        let item = store.seed_catalog_item("Mug", 2).await;

        let mut uow = store.begin().await.unwrap();
        let mut ledger = InventoryLedger::new(uow.as_mut());
        assert_eq!(ledger.deduct(item.id, 2).await.unwrap(), 0);
        assert!(matches!(
            ledger.deduct(item.id, 1).await,
            Err(OrderError::InsufficientStock { requested: 1, .. })
        ));
    }

    #[tokio::test]
    async fn restore_of_missing_item_is_not_found() {
        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let mut ledger = InventoryLedger::new(uow.as_mut());

        let missing = CatalogItemId::new(42);
        assert!(matches!(
            ledger.restore(missing, 1).await,
            Err(OrderError::ItemNotFound(id)) if id == missing
        ));
    }
}
