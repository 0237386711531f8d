//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::OrderConfig;
use notifications::{DeliveryPolicy, DispatcherConfig, WebhookConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` / `PORT`: bind address (default: `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: Postgres connection string; in-memory store when unset
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `LOW_STOCK_THRESHOLD`: low-stock alert threshold (default: `5`)
/// - `ADMIN_EMAIL`: recipient of stock alerts (default: `"admin@localhost"`)
/// - `MAIL_WEBHOOK_URL`: mail relay endpoint; messages are only logged when unset
/// - `MAIL_WEBHOOK_TIMEOUT_SECS`: relay request timeout (default: `10`)
/// - `DELIVERY_MAX_ATTEMPTS`: attempts per outbound message (default: `3`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub low_stock_threshold: i32,
    pub admin_email: String,
    pub mail_webhook_url: Option<String>,
    pub mail_webhook_timeout: Duration,
    pub delivery_max_attempts: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| var(&lookup, key);

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: non_empty("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            low_stock_threshold: parse_var(&lookup, "LOW_STOCK_THRESHOLD")
                .unwrap_or(defaults.low_stock_threshold),
            admin_email: non_empty("ADMIN_EMAIL").unwrap_or(defaults.admin_email),
            mail_webhook_url: non_empty("MAIL_WEBHOOK_URL"),
            mail_webhook_timeout: parse_var(&lookup, "MAIL_WEBHOOK_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.mail_webhook_timeout),
            delivery_max_attempts: parse_var(&lookup, "DELIVERY_MAX_ATTEMPTS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.delivery_max_attempts),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn order_config(&self) -> OrderConfig {
        OrderConfig {
            low_stock_threshold: self.low_stock_threshold,
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            admin_email: self.admin_email.clone(),
            delivery: DeliveryPolicy {
                max_attempts: self.delivery_max_attempts,
                ..DeliveryPolicy::default()
            },
        }
    }

    /// Webhook settings, when a mail relay is configured.
    pub fn webhook_config(&self) -> Option<WebhookConfig> {
        self.mail_webhook_url.as_ref().map(|endpoint| WebhookConfig {
            endpoint: endpoint.clone(),
            timeout: self.mail_webhook_timeout,
        })
    }
}

fn var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    var(lookup, key).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            low_stock_threshold: 5,
            admin_email: "admin@localhost".to_string(),
            mail_webhook_url: None,
            mail_webhook_timeout: Duration::from_secs(10),
            delivery_max_attempts: 3,
        }
    }
}
