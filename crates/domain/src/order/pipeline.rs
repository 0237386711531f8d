//! Order creation pipeline.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use common::{CatalogItemId, Money, OrderCode};
use notifications::{NotificationDispatcher, StockAlert};
use store::{ContactInfo, NewOrder, NewOrderItem, OrderDetails, Store, StoreError, UnitOfWork};
use tracing::{info, instrument, warn};

use crate::error::{OrderError, Result};
use crate::inventory::{InventoryLedger, stock_condition};

use super::{OrderConfig, PlaceOrder};

/// A committed order and the stock alerts it raised afterwards.
#[derive(Debug)]
pub struct PlacedOrder {
    pub order: OrderDetails,

    /// Alerts raised after commit; suppressed ones included.
    pub alerts: Vec<StockAlert>,
}

/// Validates, persists, and deducts stock for new orders.
pub struct OrderPipeline<S: Store> {
    store: Arc<S>,
    dispatcher: NotificationDispatcher<S>,
    config: OrderConfig,
}

impl<S: Store + 'static> OrderPipeline<S> {
    pub fn new(store: Arc<S>, dispatcher: NotificationDispatcher<S>, config: OrderConfig) -> Self {
        Self {
            store,
            dispatcher,
            config,
        }
    }

    /// Places an order.
    ///
    /// Either the order, all of its lines, and every stock deduction are
    /// committed together, or nothing is. Stock alerts are raised only after
    /// the commit and can never fail the order.
    #[instrument(skip(self, cmd), fields(customer_id = %cmd.customer_id, lines = cmd.lines.len()))]
    pub async fn place(&self, cmd: PlaceOrder) -> Result<PlacedOrder> {
        let started = Instant::now();
        let result = self.place_inner(cmd).await;

        match &result {
            Ok(placed) => {
                metrics::counter!("orders_placed_total").increment(1);
                metrics::histogram!("order_placement_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                info!(
                    order_id = %placed.order.order.id,
                    code = %placed.order.order.code,
                    total = %placed.order.order.total,
                    "Order placed"
                );
            }
            Err(e) => {
                metrics::counter!("orders_rejected_total", "reason" => e.kind().as_str())
                    .increment(1);
                warn!(error = %e, "Order rejected");
            }
        }

        result
    }

    async fn place_inner(&self, cmd: PlaceOrder) -> Result<PlacedOrder> {
        let items = validate_lines(&cmd)?;
        self.ensure_items_exist(&items).await?;
        let total = order_total(&items)?;

        let new_order = NewOrder {
            code: OrderCode::generate(),
            customer_id: cmd.customer_id,
            total,
            payment_method: cmd.payment_method.trim().to_string(),
            contact: cmd.contact,
        };

        let mut uow = self
            .store
            .begin()
            .await
            .map_err(OrderError::OrderCreationFailed)?;

        let (order, remaining) = match write_order(uow.as_mut(), new_order, &items).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                return Err(e);
            }
        };

        uow.commit().await.map_err(OrderError::OrderCreationFailed)?;

        let details = match self.store.get_order_items(order.id).await {
            Ok(items) => OrderDetails { order, items },
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "Could not reload order items");
                OrderDetails { order, items: Vec::new() }
            }
        };

        let alerts = self.raise_stock_alerts(remaining).await;

        Ok(PlacedOrder {
            order: details,
            alerts,
        })
    }

    async fn ensure_items_exist(&self, items: &[NewOrderItem]) -> Result<()> {
        let mut ids: Vec<CatalogItemId> = items.iter().map(|item| item.item_id).collect();
        ids.sort();
        ids.dedup();

        let found: HashSet<CatalogItemId> = self
            .store
            .find_catalog_items(&ids)
            .await?
            .into_iter()
            .map(|item| item.id)
            .collect();

        match items.iter().find(|item| !found.contains(&item.item_id)) {
            Some(missing) => Err(OrderError::ItemNotFound(missing.item_id)),
            None => Ok(()),
        }
    }

    /// Best-effort: failures are logged and never reach the caller.
    async fn raise_stock_alerts(&self, remaining: BTreeMap<CatalogItemId, i32>) -> Vec<StockAlert> {
        let mut alerts = Vec::new();

        for (item_id, stock) in remaining {
            let Some(kind) = stock_condition(stock, self.config.low_stock_threshold) else {
                continue;
            };

            match self
                .dispatcher
                .raise_stock_condition(kind, item_id, stock)
                .await
            {
                Ok(alert) => alerts.push(alert),
                Err(e) => warn!(item_id = %item_id, kind = %kind, error = %e, "Stock alert failed"),
            }
        }

        alerts
    }
}

/// Checks every line and converts it into an insertable item.
fn validate_lines(cmd: &PlaceOrder) -> Result<Vec<NewOrderItem>> {
    if cmd.lines.is_empty() {
        return Err(OrderError::EmptyOrder);
    }
    if cmd.payment_method.trim().is_empty() {
        return Err(OrderError::MissingPaymentMethod);
    }
    check_length("payment_method", cmd.payment_method.trim(), PAYMENT_METHOD_MAX)?;
    validate_contact(&cmd.contact)?;

    cmd.lines
        .iter()
        .map(|line| {
            let quantity = u32::try_from(line.quantity)
                .ok()
                .filter(|quantity| *quantity > 0)
                .ok_or(OrderError::InvalidQuantity {
                    item_id: line.item_id,
                    quantity: line.quantity,
                })?;

            if line.price.is_negative() {
                return Err(OrderError::InvalidPrice {
                    item_id: line.item_id,
                    price: line.price,
                });
            }

            Ok(NewOrderItem {
                item_id: line.item_id,
                quantity,
                unit_price: line.price,
            })
        })
        .collect()
}

/// Column widths of the `orders` table.
const PAYMENT_METHOD_MAX: usize = 64;
const SHORT_TEXT_MAX: usize = 255;
const PHONE_MAX: usize = 64;
const POSTAL_CODE_MAX: usize = 32;

fn validate_contact(contact: &ContactInfo) -> Result<()> {
    let fields = [
        ("full_name", &contact.full_name, SHORT_TEXT_MAX),
        ("email", &contact.email, SHORT_TEXT_MAX),
        ("phone", &contact.phone, PHONE_MAX),
        ("city", &contact.city, SHORT_TEXT_MAX),
        ("postal_code", &contact.postal_code, POSTAL_CODE_MAX),
    ];
    for (field, value, max) in fields {
        if let Some(value) = value {
            check_length(field, value, max)?;
        }
    }
    Ok(())
}

pub(crate) fn check_length(field: &'static str, value: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(OrderError::FieldTooLong { field, max });
    }
    Ok(())
}

fn order_total(items: &[NewOrderItem]) -> Result<Money> {
    items.iter().try_fold(Money::zero(), |total, item| {
        item.unit_price
            .checked_times(item.quantity)
            .and_then(|line| total.checked_add(line))
            .ok_or(OrderError::TotalOutOfRange)
    })
}

/// Steps inside the unit of work. Returns the order and the last remaining
/// stock seen for each item.
async fn write_order(
    uow: &mut dyn UnitOfWork,
    new_order: NewOrder,
    items: &[NewOrderItem],
) -> Result<(store::OrderRecord, BTreeMap<CatalogItemId, i32>)> {
    let order = uow.insert_order(new_order).await.map_err(creation_failed)?;
    uow.insert_order_items(order.id, items)
        .await
        .map_err(creation_failed)?;

    let mut ledger = InventoryLedger::new(uow);
    let mut remaining = BTreeMap::new();
    for item in deduction_order(items) {
        let stock = ledger
            .deduct(item.item_id, item.quantity)
            .await
            .map_err(|e| match e {
                OrderError::Persistence(store_err) => creation_failed(store_err),
                other => other,
            })?;
        remaining.insert(item.item_id, stock);
    }

    Ok((order, remaining))
}

/// Lines sorted by item id. Every unit of work locks catalog rows in
/// ascending id order, the same order approvals restore in.
fn deduction_order(items: &[NewOrderItem]) -> Vec<&NewOrderItem> {
    let mut ordered: Vec<&NewOrderItem> = items.iter().collect();
    ordered.sort_by_key(|item| item.item_id);
    ordered
}

fn creation_failed(e: StoreError) -> OrderError {
    match e {
        StoreError::ItemNotFound(item_id) => OrderError::ItemNotFound(item_id),
        other => OrderError::OrderCreationFailed(other),
    }
}
