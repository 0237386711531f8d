//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{ErrorKind, OrderError};
use notifications::NotificationError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// No usable identity on the request.
    Unauthorized(String),
    /// Identity present but not allowed to do this.
    Forbidden(String),
    /// Order engine error.
    Order(OrderError),
    /// Notification store error.
    Notification(NotificationError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Order(err) => order_error_to_response(err),
            ApiError::Notification(err) => {
                tracing::error!(error = %err, "notification store error");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };

        metrics::counter!("http_errors_total", "status" => status.as_u16().to_string())
            .increment(1);
        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn order_error_to_response(err: OrderError) -> (StatusCode, String) {
    let status = match err.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidTransition | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Persistence => {
            tracing::error!(error = %err, "order persistence error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Order(err)
    }
}

impl From<NotificationError> for ApiError {
    fn from(err: NotificationError) -> Self {
        ApiError::Notification(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CatalogItemId, OrderId, OrderStatus};

    fn status_of(err: OrderError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn order_errors_map_by_kind() {
        assert_eq!(status_of(OrderError::EmptyOrder), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(OrderError::OrderNotFound(OrderId::new(1))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(OrderError::InvalidTransition {
                current: OrderStatus::Shipped,
                action: "request cancellation of",
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(OrderError::InsufficientStock {
                item_id: CatalogItemId::new(1),
                requested: 2,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(OrderError::NotOrderOwner(OrderId::new(1))),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn unauthorized_is_401() {
        let response = ApiError::Unauthorized("missing x-user-id header".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
