//! Order service providing a simplified API for order operations.

use std::sync::Arc;

use common::{CatalogItemId, CustomerId, OrderId, OrderStatus, SubscriptionId};
use notifications::NotificationDispatcher;
use store::{
    NewRestockSubscription, OrderDetails, OrderRecord, RestockSubscription, Store,
};
use tracing::{info, instrument};

use crate::error::{OrderError, Result};

use super::pipeline::check_length;
use super::{
    ApprovedCancellation, CancellationWorkflow, OrderConfig, OrderPipeline, PlaceOrder,
    PlacedOrder,
};

/// Service for managing orders.
///
/// Wraps the creation pipeline and the cancellation workflow, and adds the
/// read side and restock subscription management.
pub struct OrderService<S: Store> {
    store: Arc<S>,
    dispatcher: NotificationDispatcher<S>,
    pipeline: OrderPipeline<S>,
    cancellations: CancellationWorkflow<S>,
}

impl<S: Store + 'static> OrderService<S> {
    pub fn new(store: Arc<S>, dispatcher: NotificationDispatcher<S>, config: OrderConfig) -> Self {
        Self {
            pipeline: OrderPipeline::new(Arc::clone(&store), dispatcher.clone(), config),
            cancellations: CancellationWorkflow::new(Arc::clone(&store), dispatcher.clone()),
            store,
            dispatcher,
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the dispatcher used for stock notifications.
    pub fn dispatcher(&self) -> &NotificationDispatcher<S> {
        &self.dispatcher
    }

    /// Places a new order.
    pub async fn place_order(&self, cmd: PlaceOrder) -> Result<PlacedOrder> {
        self.pipeline.place(cmd).await
    }

    /// Orders placed by `customer_id`, newest first, with their items.
    #[instrument(skip(self))]
    pub async fn list_my_orders(&self, customer_id: CustomerId) -> Result<Vec<OrderDetails>> {
        Ok(self.store.list_orders_for_customer(customer_id).await?)
    }

    /// Every order, newest first. Admin only.
    #[instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<OrderDetails>> {
        Ok(self.store.list_orders().await?)
    }

    /// Loads an order with its items.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<OrderDetails> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;
        let items = self.store.get_order_items(order_id).await?;
        Ok(OrderDetails { order, items })
    }

    /// Loads an order on behalf of a customer, who must own it.
    pub async fn get_customer_order(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
    ) -> Result<OrderDetails> {
        let details = self.get_order(order_id).await?;
        if details.order.customer_id != customer_id {
            return Err(OrderError::NotOrderOwner(order_id));
        }
        Ok(details)
    }

    /// Customer cancellation request; the order waits for admin approval.
    pub async fn request_cancellation(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
    ) -> Result<OrderRecord> {
        self.cancellations.request(order_id, customer_id).await
    }

    pub async fn approve_cancellation(&self, order_id: OrderId) -> Result<ApprovedCancellation> {
        self.cancellations.approve(order_id).await
    }

    pub async fn reject_cancellation(&self, order_id: OrderId) -> Result<OrderRecord> {
        self.cancellations.reject(order_id).await
    }

    pub async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<OrderRecord> {
        self.cancellations.update_status(order_id, status).await
    }

    /// Subscribes a customer to a restock alert for an item.
    ///
    /// Subscribing again re-arms an already notified subscription.
    #[instrument(skip(self, email))]
    pub async fn subscribe_restock(
        &self,
        customer_id: CustomerId,
        item_id: CatalogItemId,
        email: &str,
    ) -> Result<RestockSubscription> {
        let email = email.trim();
        if !is_plausible_email(email) {
            return Err(OrderError::InvalidEmail(email.to_string()));
        }
        check_length("email", email, 255)?;
        if self.store.get_catalog_item(item_id).await?.is_none() {
            return Err(OrderError::ItemNotFound(item_id));
        }

        let subscription = self
            .store
            .upsert_restock_subscription(NewRestockSubscription {
                customer_id,
                item_id,
                email: email.to_string(),
            })
            .await?;
        info!(subscription_id = %subscription.id, "Restock subscription saved");
        Ok(subscription)
    }

    pub async fn list_restock_subscriptions(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<RestockSubscription>> {
        Ok(self.store.list_restock_subscriptions(customer_id).await?)
    }

    /// Removes one of the customer's subscriptions.
    #[instrument(skip(self))]
    pub async fn unsubscribe_restock(
        &self,
        customer_id: CustomerId,
        subscription_id: SubscriptionId,
    ) -> Result<()> {
        if self
            .store
            .delete_restock_subscription(subscription_id, customer_id)
            .await?
        {
            Ok(())
        } else {
            Err(OrderError::SubscriptionNotFound(subscription_id))
        }
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}
