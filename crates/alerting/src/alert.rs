//! Alert Payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Some providers failed but the request was still served
    Warning,
    /// Every provider failed and the request could not be served
    Critical,
}

impl Severity {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request context attached to an alert
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertContext {
    /// Route that was being served (e.g. "/api/v1/relay/ocr")
    pub endpoint: String,
    /// HTTP method of the inbound request
    pub method: String,
    /// Caller user agent, when known
    pub user_agent: Option<String>,
    /// Extra request parameters worth reporting
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl AlertContext {
    pub fn new(endpoint: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.into(),
            user_agent: None,
            params: BTreeMap::new(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// What happened to a single provider during one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ServiceStatus {
    Succeeded,
    Failed { reason: String },
    /// Not attempted because an earlier provider succeeded
    Skipped,
}

/// Per-provider line of an alert summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceReport {
    pub name: String,
    #[serde(flatten)]
    pub status: ServiceStatus,
}

impl fmt::Display for ServiceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            ServiceStatus::Succeeded => write!(f, "{}: succeeded", self.name),
            ServiceStatus::Failed { reason } => write!(f, "{}: failed ({})", self.name, reason),
            ServiceStatus::Skipped => write!(f, "{}: skipped", self.name),
        }
    }
}

/// Alert sent to a notifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub message: String,
    pub context: AlertContext,
    pub services: Vec<ServiceReport>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        severity: Severity,
        message: impl Into<String>,
        context: AlertContext,
        services: Vec<ServiceReport>,
    ) -> Self {
        Self {
            severity,
            message: message.into(),
            context,
            services,
            timestamp: Utc::now(),
        }
    }

    /// One-line human readable summary, used as the subject of outbound alerts
    pub fn subject(&self) -> String {
        format!(
            "[{}] {} {}: {}",
            self.severity, self.context.method, self.context.endpoint, self.message
        )
    }

    /// Multi-line body listing every provider status in attempt order
    pub fn body(&self) -> String {
        let mut lines = vec![self.subject()];
        if let Some(agent) = &self.context.user_agent {
            lines.push(format!("user agent: {}", agent));
        }
        for (key, value) in &self.context.params {
            lines.push(format!("param {} = {}", key, value));
        }
        lines.extend(self.services.iter().map(|report| format!("  - {}", report)));
        lines.join("\n")
    }
}
