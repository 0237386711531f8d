//! Delivery transports.
//!
//! A transport makes one delivery attempt per [`NotificationTransport::send`]
//! call. Retrying is the dispatcher's job.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::error::DeliveryError;
use crate::message::OutboundMessage;

/// Trait for outbound message delivery.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Makes a single delivery attempt.
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Transport that only writes messages to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        info!(to = %message.to, subject = %message.subject, "Outbound message");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

#[derive(Debug, Default)]
struct InMemoryTransportState {
    sent: Vec<OutboundMessage>,
    attempts: usize,
    fail_on_send: bool,
    fail_next: usize,
    rejected_recipients: HashSet<String>,
}

/// In-memory transport for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<Mutex<InMemoryTransportState>>,
}

impl InMemoryTransport {
    /// Creates a new in-memory transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryTransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures every send to fail with a retryable error.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state().fail_on_send = fail;
    }

    /// Fails the next `count` sends with a retryable error.
    pub fn fail_next(&self, count: usize) {
        self.state().fail_next = count;
    }

    /// Permanently rejects messages addressed to `email`.
    pub fn reject_recipient(&self, email: impl Into<String>) {
        self.state().rejected_recipients.insert(email.into());
    }

    /// Returns the successfully delivered messages in send order.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.state().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.state().sent.len()
    }

    /// Returns the number of send attempts, failed ones included.
    pub fn attempt_count(&self) -> usize {
        self.state().attempts
    }
}

#[async_trait]
impl NotificationTransport for InMemoryTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let mut state = self.state();
        state.attempts += 1;

        if state.rejected_recipients.contains(&message.to) {
            return Err(DeliveryError::Rejected(format!(
                "recipient {} refused",
                message.to
            )));
        }
        if state.fail_on_send {
            return Err(DeliveryError::Transport("transport offline".to_string()));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(DeliveryError::Transport("transient failure".to_string()));
        }

        state.sent.push(message.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

/// Webhook transport configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Mail relay endpoint receiving JSON messages.
    pub endpoint: String,

    /// Request timeout.
    pub timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Transport that POSTs each message as JSON to a mail relay.
pub struct WebhookTransport {
    client: Client,
    config: WebhookConfig,
}

impl WebhookTransport {
    pub fn new(config: WebhookConfig) -> Result<Self, DeliveryError> {
        if config.endpoint.is_empty() {
            return Err(DeliveryError::Config(
                "webhook endpoint not configured".to_string(),
            ));
        }

        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Determine if an HTTP status code is retryable.
    fn is_retryable_status(status: reqwest::StatusCode) -> bool {
        status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(endpoint = %self.config.endpoint, to = %message.to, "Message posted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let detail = format!(
            "HTTP {} - {}",
            status,
            body.chars().take(200).collect::<String>()
        );

        if Self::is_retryable_status(status) {
            warn!(endpoint = %self.config.endpoint, status = %status, "Relay returned retryable status");
            Err(DeliveryError::Transport(detail))
        } else {
            Err(DeliveryError::Rejected(detail))
        }
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str) -> OutboundMessage {
        OutboundMessage::new(to, "subject", "body")
    }

    #[tokio::test]
    async fn in_memory_records_delivered_messages() {
        let transport = InMemoryTransport::new();
        transport.send(&message("a@example.com")).await.unwrap();

        assert_eq!(transport.sent_count(), 1);
        assert_eq!(transport.sent()[0].to, "a@example.com");
    }

    #[tokio::test]
    async fn fail_next_recovers_after_count() {
        let transport = InMemoryTransport::new();
        transport.fail_next(2);

        assert!(transport.send(&message("a@example.com")).await.is_err());
        assert!(transport.send(&message("a@example.com")).await.is_err());
        assert!(transport.send(&message("a@example.com")).await.is_ok());
        assert_eq!(transport.attempt_count(), 3);
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn rejected_recipient_is_not_retryable() {
        let transport = InMemoryTransport::new();
        transport.reject_recipient("gone@example.com");

        let err = transport
            .send(&message("gone@example.com"))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(transport.send(&message("ok@example.com")).await.is_ok());
    }

    #[test]
    fn empty_webhook_endpoint_fails() {
        let result = WebhookTransport::new(WebhookConfig::default());
        assert!(matches!(result, Err(DeliveryError::Config(_))));
    }

    #[test]
    fn retryable_status_codes() {
        use reqwest::StatusCode;

        assert!(WebhookTransport::is_retryable_status(
            StatusCode::TOO_MANY_REQUESTS
        ));
        assert!(WebhookTransport::is_retryable_status(
            StatusCode::SERVICE_UNAVAILABLE
        ));
        assert!(!WebhookTransport::is_retryable_status(
            StatusCode::BAD_REQUEST
        ));
        assert!(!WebhookTransport::is_retryable_status(
            StatusCode::UNPROCESSABLE_ENTITY
        ));
    }
}
