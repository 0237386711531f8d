//! Cancellation workflow and admin status changes.

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{CatalogItemId, CustomerId, NotificationKind, OrderId, OrderStatus};
use notifications::{NotificationDispatcher, RestockReport, StockAlert};
use store::{OrderRecord, Store, UnitOfWork};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::error::{OrderError, Result};
use crate::inventory::InventoryLedger;

use super::lifecycle::{OrderAction, next_status};

/// Stock put back for one item by an approved cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoredStock {
    pub item_id: CatalogItemId,
    pub quantity: u32,
    /// Stock after the restoration.
    pub stock: i32,
}

impl RestoredStock {
    /// True when the restoration brought the item back from zero.
    pub fn is_restock(&self) -> bool {
        self.stock > 0 && i64::from(self.stock) <= i64::from(self.quantity)
    }
}

/// Side effects for an item that came back into stock.
#[derive(Debug)]
pub struct RestockEffect {
    pub item_id: CatalogItemId,
    pub alert: StockAlert,
    /// Present when subscribers were waiting.
    pub subscribers: Option<JoinHandle<RestockReport>>,
}

/// Result of approving a cancellation.
#[derive(Debug)]
pub struct ApprovedCancellation {
    pub order: OrderRecord,
    /// One entry per item, duplicate lines summed.
    pub restored: Vec<RestoredStock>,
    pub restocks: Vec<RestockEffect>,
}

/// Moves existing orders through the cancellation state machine.
pub struct CancellationWorkflow<S: Store> {
    store: Arc<S>,
    dispatcher: NotificationDispatcher<S>,
}

impl<S: Store + 'static> CancellationWorkflow<S> {
    pub fn new(store: Arc<S>, dispatcher: NotificationDispatcher<S>) -> Self {
        Self { store, dispatcher }
    }

    /// Customer request to cancel their own order. Stock is untouched.
    #[instrument(skip(self))]
    pub async fn request(&self, order_id: OrderId, customer_id: CustomerId) -> Result<OrderRecord> {
        let action = OrderAction::RequestCancellation;
        let mut uow = self.store.begin().await?;

        let order = lock(uow.as_mut(), order_id).await?;
        if order.customer_id != customer_id {
            return Err(OrderError::NotOrderOwner(order_id));
        }
        let order = apply(uow.as_mut(), order, action).await?;

        uow.commit().await?;
        record_transition(&order, action);
        Ok(order)
    }

    /// Admin approval: cancels the order and restores every line's stock in
    /// the same unit of work.
    ///
    /// Items that come back from zero then get a `restock` notification and
    /// their waiting subscribers are notified. Those effects run after the
    /// commit and never fail the approval.
    #[instrument(skip(self))]
    pub async fn approve(&self, order_id: OrderId) -> Result<ApprovedCancellation> {
        let action = OrderAction::ApproveCancellation;
        let mut uow = self.store.begin().await?;

        let order = lock(uow.as_mut(), order_id).await?;
        let order = apply(uow.as_mut(), order, action).await?;
        let restored = restore_order_stock(uow.as_mut(), order_id).await?;

        uow.commit().await?;
        record_transition(&order, action);

        let mut restocks = Vec::new();
        for entry in restored.iter().filter(|entry| entry.is_restock()) {
            if let Some(effect) = self.announce_restock(entry).await {
                restocks.push(effect);
            }
        }

        Ok(ApprovedCancellation {
            order,
            restored,
            restocks,
        })
    }

    /// Admin rejection: the order resumes as `processing`.
    #[instrument(skip(self))]
    pub async fn reject(&self, order_id: OrderId) -> Result<OrderRecord> {
        self.transition(order_id, OrderAction::RejectCancellation)
            .await
    }

    /// Admin correction to an explicit status. Never moves stock.
    #[instrument(skip(self))]
    pub async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<OrderRecord> {
        self.transition(order_id, OrderAction::SetStatus(status))
            .await
    }

    async fn transition(&self, order_id: OrderId, action: OrderAction) -> Result<OrderRecord> {
        let mut uow = self.store.begin().await?;
        let order = lock(uow.as_mut(), order_id).await?;
        let order = apply(uow.as_mut(), order, action).await?;
        uow.commit().await?;

        record_transition(&order, action);
        Ok(order)
    }

    async fn announce_restock(&self, entry: &RestoredStock) -> Option<RestockEffect> {
        let alert = match self
            .dispatcher
            .raise_stock_condition(NotificationKind::Restock, entry.item_id, entry.stock)
            .await
        {
            Ok(alert) => alert,
            Err(e) => {
                warn!(item_id = %entry.item_id, error = %e, "Restock alert failed");
                return None;
            }
        };

        let subscribers = match self.dispatcher.notify_restock_subscribers(entry.item_id).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(item_id = %entry.item_id, error = %e, "Restock subscriber notification failed");
                None
            }
        };

        Some(RestockEffect {
            item_id: entry.item_id,
            alert,
            subscribers,
        })
    }
}

async fn lock(uow: &mut dyn UnitOfWork, order_id: OrderId) -> Result<OrderRecord> {
    uow.lock_order(order_id)
        .await?
        .ok_or(OrderError::OrderNotFound(order_id))
}

/// Validates the action against the locked order and writes the new status.
async fn apply(
    uow: &mut dyn UnitOfWork,
    mut order: OrderRecord,
    action: OrderAction,
) -> Result<OrderRecord> {
    let next = next_status(order.status, action)?;

    if !uow
        .compare_and_set_status(order.id, order.status, next)
        .await?
    {
        return Err(OrderError::InvalidTransition {
            current: order.status,
            action: action.verb(),
        });
    }

    order.status = next;
    Ok(order)
}

async fn restore_order_stock(
    uow: &mut dyn UnitOfWork,
    order_id: OrderId,
) -> Result<Vec<RestoredStock>> {
    let items = uow.order_items(order_id).await?;

    let mut quantities: BTreeMap<CatalogItemId, u32> = BTreeMap::new();
    for item in &items {
        let total = quantities.entry(item.item_id).or_default();
        *total = total.saturating_add(item.quantity);
    }

    let mut ledger = InventoryLedger::new(uow);
    let mut restored = Vec::with_capacity(quantities.len());
    for (item_id, quantity) in quantities {
        match ledger.restore(item_id, quantity).await {
            Ok(stock) => restored.push(RestoredStock {
                item_id,
                quantity,
                stock,
            }),
            // The catalog may have dropped the item since the order was placed
            Err(OrderError::ItemNotFound(_)) => {
                warn!(item_id = %item_id, quantity, "Cannot restore stock for removed item");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(restored)
}

fn record_transition(order: &OrderRecord, action: OrderAction) {
    metrics::counter!("order_transitions_total", "action" => action.as_str()).increment(1);
    info!(order_id = %order.id, status = %order.status, action = action.as_str(), "Order status changed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn restored(quantity: u32, stock: i32) -> RestoredStock {
        RestoredStock {
            item_id: CatalogItemId::new(1),
            quantity,
            stock,
        }
    }

    #[test]
    fn restock_means_coming_back_from_zero() {
        assert!(restored(2, 2).is_restock());
        assert!(!restored(2, 5).is_restock());
        assert!(!restored(0, 0).is_restock());
    }
}
