//! Admin order endpoints: the cancellation queue and direct status changes.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{CatalogItemId, OrderId, OrderStatus};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::auth::Admin;
use crate::error::ApiError;

use super::orders::{AppState, OrderResponse, OrderStatusResponse};

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Serialize)]
pub struct RestoredStockResponse {
    pub item_id: CatalogItemId,
    pub quantity: u32,
    pub stock: i32,
}

#[derive(Serialize)]
pub struct ApprovedCancellationResponse {
    #[serde(flatten)]
    pub order: OrderStatusResponse,
    pub restored: Vec<RestoredStockResponse>,
    /// Items that came back from zero stock.
    pub restocked: Vec<CatalogItemId>,
}

/// GET /admin/orders
#[tracing::instrument(skip(state, _admin))]
pub async fn list_orders<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: Admin,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.list_orders().await?;
    Ok(Json(
        orders.into_iter().map(OrderResponse::from_details).collect(),
    ))
}

/// POST /admin/orders/{id}/cancellation/approve
#[tracing::instrument(skip(state, _admin))]
pub async fn approve_cancellation<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: Admin,
    Path(id): Path<i64>,
) -> Result<Json<ApprovedCancellationResponse>, ApiError> {
    let approved = state.orders.approve_cancellation(OrderId::new(id)).await?;

    Ok(Json(ApprovedCancellationResponse {
        order: OrderStatusResponse::from(&approved.order),
        restored: approved
            .restored
            .iter()
            .map(|r| RestoredStockResponse {
                item_id: r.item_id,
                quantity: r.quantity,
                stock: r.stock,
            })
            .collect(),
        restocked: approved.restocks.iter().map(|r| r.item_id).collect(),
    }))
}

/// POST /admin/orders/{id}/cancellation/reject
#[tracing::instrument(skip(state, _admin))]
pub async fn reject_cancellation<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: Admin,
    Path(id): Path<i64>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let order = state.orders.reject_cancellation(OrderId::new(id)).await?;
    Ok(Json(OrderStatusResponse::from(&order)))
}

/// PUT /admin/orders/{id}/status
#[tracing::instrument(skip(state, _admin, req))]
pub async fn update_status<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: Admin,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let status: OrderStatus = req
        .status
        .parse()
        .map_err(|e: common::ParseEnumError| ApiError::BadRequest(e.to_string()))?;

    let order = state
        .orders
        .update_status(OrderId::new(id), status)
        .await?;
    Ok(Json(OrderStatusResponse::from(&order)))
}
