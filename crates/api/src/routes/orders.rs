//! Customer order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CatalogItemId, Money, OrderId, OrderStatus};
use domain::{OrderService, PlaceOrder};
use serde::{Deserialize, Serialize};
use store::{ContactInfo, OrderDetails, OrderItemRecord, OrderRecord, Store};

use crate::auth::Identity;
use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub orders: OrderService<S>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    pub items: Vec<OrderItemRequest>,
    pub payment_method: String,
    #[serde(default)]
    pub contact: ContactInfo,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub item_id: i64,
    pub quantity: i64,
    /// Unit price in cents as shown at checkout.
    pub price_cents: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub code: String,
    pub customer_id: i64,
    pub status: OrderStatus,
    pub payment_method: String,
    pub total_cents: i64,
    pub total: String,
    pub contact: ContactInfo,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub item_id: CatalogItemId,
    pub item_name: Option<String>,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

/// Status after a state-machine action.
#[derive(Serialize)]
pub struct OrderStatusResponse {
    pub order_id: OrderId,
    pub code: String,
    pub status: OrderStatus,
}

impl OrderResponse {
    pub(crate) fn from_details(details: OrderDetails) -> Self {
        let OrderDetails { order, items } = details;
        Self {
            id: order.id,
            code: order.code.as_str().to_string(),
            customer_id: order.customer_id.as_i64(),
            status: order.status,
            payment_method: order.payment_method,
            total_cents: order.total.cents(),
            total: order.total.to_string(),
            contact: order.contact,
            created_at: order.created_at,
            items: items.iter().map(OrderItemResponse::from_record).collect(),
        }
    }
}

impl OrderItemResponse {
    fn from_record(item: &OrderItemRecord) -> Self {
        Self {
            item_id: item.item_id,
            item_name: item.item_name.clone(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
            line_total_cents: item.line_total().cents(),
        }
    }
}

impl From<&OrderRecord> for OrderStatusResponse {
    fn from(order: &OrderRecord) -> Self {
        Self {
            order_id: order.id,
            code: order.code.as_str().to_string(),
            status: order.status,
        }
    }
}

// -- Handlers --

/// POST /orders
#[tracing::instrument(skip(state, req), fields(customer_id = %identity.user_id))]
pub async fn create<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let cmd = req.items.into_iter().fold(
        PlaceOrder::new(identity.user_id, req.payment_method).with_contact(req.contact),
        |cmd, line| {
            cmd.with_line(
                CatalogItemId::new(line.item_id),
                line.quantity,
                Money::from_cents(line.price_cents),
            )
        },
    );

    let placed = state.orders.place_order(cmd).await?;
    Ok((
        StatusCode::CREATED,
        Json(OrderResponse::from_details(placed.order)),
    ))
}

/// GET /orders
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.list_my_orders(identity.user_id).await?;
    Ok(Json(
        orders.into_iter().map(OrderResponse::from_details).collect(),
    ))
}

/// GET /orders/{id}; admins may read any order.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = OrderId::new(id);
    let details = if identity.is_admin() {
        state.orders.get_order(order_id).await?
    } else {
        state
            .orders
            .get_customer_order(order_id, identity.user_id)
            .await?
    };
    Ok(Json(OrderResponse::from_details(details)))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state))]
pub async fn request_cancellation<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let order = state
        .orders
        .request_cancellation(OrderId::new(id), identity.user_id)
        .await?;
    Ok(Json(OrderStatusResponse::from(&order)))
}
