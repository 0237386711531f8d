//! Notification error types.

use store::StoreError;
use thiserror::Error;

/// Errors surfaced by dispatcher operations.
///
/// Delivery failures are not part of this type; they stay inside the
/// dispatcher and are only reported through logs and metrics.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Recording or reading notification state failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// A single failed attempt to hand a message to a transport.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Transient transport failure; worth another attempt.
    #[error("Transport unavailable: {0}")]
    Transport(String),

    /// The receiving side refused the message.
    #[error("Delivery rejected: {0}")]
    Rejected(String),

    /// The transport is misconfigured.
    #[error("Transport configuration error: {0}")]
    Config(String),

    /// HTTP client error from the webhook transport.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl DeliveryError {
    /// Returns true when retrying the same message may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Transport(_) => true,
            DeliveryError::Http(err) => err.is_timeout() || err.is_connect(),
            DeliveryError::Rejected(_) | DeliveryError::Config(_) => false,
        }
    }
}

/// Convenience type alias for dispatcher results.
pub type Result<T> = std::result::Result<T, NotificationError>;
