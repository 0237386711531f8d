pub mod admin;
pub mod health;
pub mod metrics;
pub mod notifications;
pub mod orders;
pub mod subscriptions;
