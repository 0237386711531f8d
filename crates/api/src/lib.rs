//! HTTP API server with observability for the storefront order engine.
//!
//! Provides REST endpoints for placing orders, the cancellation workflow,
//! the admin notification inbox and restock subscriptions, with structured
//! logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use domain::OrderService;
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::{
    DeliveryError, LogTransport, NotificationDispatcher, NotificationTransport, WebhookTransport,
};
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route(
            "/orders/{id}/cancel",
            post(routes::orders::request_cancellation::<S>),
        )
        .route("/admin/orders", get(routes::admin::list_orders::<S>))
        .route(
            "/admin/orders/{id}/cancellation/approve",
            post(routes::admin::approve_cancellation::<S>),
        )
        .route(
            "/admin/orders/{id}/cancellation/reject",
            post(routes::admin::reject_cancellation::<S>),
        )
        .route(
            "/admin/orders/{id}/status",
            put(routes::admin::update_status::<S>),
        )
        .route(
            "/admin/notifications",
            get(routes::notifications::list::<S>),
        )
        .route(
            "/admin/notifications/unread-count",
            get(routes::notifications::unread_count::<S>),
        )
        .route(
            "/admin/notifications/read-all",
            post(routes::notifications::mark_all_read::<S>),
        )
        .route(
            "/admin/notifications/{id}/read",
            post(routes::notifications::mark_read::<S>),
        )
        .route(
            "/admin/notifications/{id}",
            delete(routes::notifications::delete::<S>),
        )
        .route(
            "/restock-subscriptions",
            post(routes::subscriptions::create::<S>).get(routes::subscriptions::list::<S>),
        )
        .route(
            "/restock-subscriptions/{id}",
            delete(routes::subscriptions::delete::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the order service and notification dispatcher over `store`.
pub fn create_state<S: Store + 'static>(
    store: Arc<S>,
    transport: Arc<dyn NotificationTransport>,
    config: &Config,
) -> Arc<AppState<S>> {
    let dispatcher =
        NotificationDispatcher::new(Arc::clone(&store), transport, config.dispatcher_config());
    let orders = OrderService::new(store, dispatcher, config.order_config());
    Arc::new(AppState { orders })
}

/// Mail relay webhook when one is configured, log-only delivery otherwise.
pub fn create_transport(config: &Config) -> Result<Arc<dyn NotificationTransport>, DeliveryError> {
    match config.webhook_config() {
        Some(webhook) => {
            tracing::info!(endpoint = %webhook.endpoint, "delivering notifications via webhook");
            Ok(Arc::new(WebhookTransport::new(webhook)?))
        }
        None => {
            tracing::info!("no mail webhook configured, notifications are only logged");
            Ok(Arc::new(LogTransport))
        }
    }
}
