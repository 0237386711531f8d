//! Admin notification inbox.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::NotificationId;
use serde::{Deserialize, Serialize};
use store::{Notification, Store};

use crate::auth::Admin;
use crate::error::ApiError;

use super::orders::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub unread: bool,
}

#[derive(Serialize)]
pub struct UnreadCountResponse {
    pub unread: u64,
}

#[derive(Serialize)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

/// GET /admin/notifications[?unread=true]
#[tracing::instrument(skip(state, _admin))]
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: Admin,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let notifications = state
        .orders
        .dispatcher()
        .list_notifications(query.unread)
        .await?;
    Ok(Json(notifications))
}

/// GET /admin/notifications/unread-count
pub async fn unread_count<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: Admin,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let unread = state.orders.dispatcher().count_unread().await?;
    Ok(Json(UnreadCountResponse { unread }))
}

/// POST /admin/notifications/{id}/read
#[tracing::instrument(skip(state, _admin))]
pub async fn mark_read<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: Admin,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let notification_id = NotificationId::new(id);
    if state.orders.dispatcher().mark_read(notification_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "notification {notification_id} not found"
        )))
    }
}

/// POST /admin/notifications/read-all
#[tracing::instrument(skip(state, _admin))]
pub async fn mark_all_read<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: Admin,
) -> Result<Json<MarkAllReadResponse>, ApiError> {
    let updated = state.orders.dispatcher().mark_all_read().await?;
    Ok(Json(MarkAllReadResponse { updated }))
}

/// DELETE /admin/notifications/{id}
#[tracing::instrument(skip(state, _admin))]
pub async fn delete<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: Admin,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let notification_id = NotificationId::new(id);
    if state.orders.dispatcher().delete(notification_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "notification {notification_id} not found"
        )))
    }
}
