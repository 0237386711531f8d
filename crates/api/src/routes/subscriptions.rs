//! Customer restock subscriptions.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CatalogItemId, SubscriptionId};
use serde::Deserialize;
use store::{RestockSubscription, Store};

use crate::auth::Identity;
use crate::error::ApiError;

use super::orders::AppState;

#[derive(Deserialize)]
pub struct SubscribeRequest {
    pub item_id: i64,
    pub email: String,
}

/// POST /restock-subscriptions
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(req): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<RestockSubscription>), ApiError> {
    let subscription = state
        .orders
        .subscribe_restock(
            identity.user_id,
            CatalogItemId::new(req.item_id),
            &req.email,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// GET /restock-subscriptions
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<Vec<RestockSubscription>>, ApiError> {
    let subscriptions = state
        .orders
        .list_restock_subscriptions(identity.user_id)
        .await?;
    Ok(Json(subscriptions))
}

/// DELETE /restock-subscriptions/{id}
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .orders
        .unsubscribe_restock(identity.user_id, SubscriptionId::new(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
