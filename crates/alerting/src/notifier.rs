//! Notifier channels
//!
//! A [`Notifier`] delivers an [`Alert`] somewhere outside the process. Callers
//! treat delivery as best effort: a failing notifier must never turn a
//! served request into a failed one, so every error is reported back as a
//! [`NotifyError`] for the caller to log.

use crate::{Alert, AlertConfig, AlertManager, Severity};
use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Notification rejected with status {status}")]
    Rejected { status: u16 },

    #[error("Notifier unavailable: {0}")]
    Unavailable(String),
}

/// Delivery channel for alerts
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one alert
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError>;
}

#[async_trait]
impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        (**self).notify(alert).await
    }
}

/// Writes alerts to the tracing log
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        match alert.severity {
            Severity::Warning => warn!(
                endpoint = %alert.context.endpoint,
                method = %alert.context.method,
                "{}",
                alert.body()
            ),
            Severity::Critical => error!(
                endpoint = %alert.context.endpoint,
                method = %alert.context.method,
                "{}",
                alert.body()
            ),
        }
        Ok(())
    }
}

/// Posts alerts as JSON to an HTTP endpoint (chat hooks, mail relays, ...)
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a webhook notifier with a per-request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;
        let url = url.into();
        info!("Webhook notifier targeting {}", url);
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        let payload = json!({
            "subject": alert.subject(),
            "text": alert.body(),
            "alert": alert,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!("Alert delivered to webhook ({})", status);
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

/// Keeps alerts in memory; used in tests and local development
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    alerts: Mutex<Vec<Alert>>,
    failure: Option<String>,
    delivered: Notify,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that records the alert and then reports a transport error
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Alerts received so far
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.alerts.lock().map(|a| a.len()).unwrap_or(0)
    }

    /// Wait until at least `count` alerts have arrived or `timeout` elapses
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.delivered.notified();
            if self.count() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.count() >= count;
            }
        }
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert.clone());
        }
        self.delivered.notify_waiters();

        match &self.failure {
            Some(reason) => Err(NotifyError::Transport(reason.clone())),
            None => Ok(()),
        }
    }
}

/// Suppresses repeated alerts for the same endpoint using an [`AlertManager`]
pub struct ThrottledNotifier<N> {
    inner: N,
    manager: Mutex<AlertManager>,
}

impl<N: Notifier> ThrottledNotifier<N> {
    pub fn new(inner: N, config: AlertConfig) -> Self {
        Self {
            inner,
            manager: Mutex::new(AlertManager::new(config)),
        }
    }

    pub fn inner(&self) -> &N {
        &self.inner
    }

    fn admit(&self, alert: &Alert) -> bool {
        let key = alert.context.endpoint.as_str();
        match self.manager.lock() {
            Ok(mut manager) => {
                if manager.should_fire(key, alert.severity) {
                    manager.record_fire(key);
                    true
                } else {
                    false
                }
            }
            // A poisoned throttle must not swallow alerts
            Err(_) => true,
        }
    }
}

#[async_trait]
impl<N: Notifier> Notifier for ThrottledNotifier<N> {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        if !self.admit(alert) {
            debug!("Alert for {} suppressed by throttle", alert.context.endpoint);
            return Ok(());
        }
        self.inner.notify(alert).await
    }
}
