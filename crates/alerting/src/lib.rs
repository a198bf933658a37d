//! Alerting System
//!
//! Alert payloads, notifier channels, and deduplication/throttling of
//! repeated alerts for the same endpoint.

mod alert;
mod manager;
mod notifier;

pub use alert::{Alert, AlertContext, ServiceReport, ServiceStatus, Severity};
pub use manager::{AlertConfig, AlertManager, AlertState};
pub use notifier::{
    LogNotifier, MemoryNotifier, Notifier, NotifyError, ThrottledNotifier, WebhookNotifier,
};
