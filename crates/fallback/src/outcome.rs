//! Fallback outcome types

use alerting::{ServiceReport, ServiceStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One failed provider attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub service: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(service: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Overall classification of one fallback run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    /// The first provider succeeded
    FullSuccess,
    /// At least one provider failed before another succeeded
    PartialFailure,
    /// Every provider failed
    TotalFailure,
}

impl OutcomeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeClass::FullSuccess => "full_success",
            OutcomeClass::PartialFailure => "partial_failure",
            OutcomeClass::TotalFailure => "total_failure",
        }
    }
}

/// Result of folding provider attempts in order.
///
/// `value` and `used_service` are set together, only by a successful [`FallbackOutcome::record`].
#[derive(Debug, Clone, Serialize)]
pub struct FallbackOutcome<T> {
    value: Option<T>,
    used_service: Option<String>,
    failures: Vec<FailureRecord>,
}

impl<T> FallbackOutcome<T> {
    pub fn new() -> Self {
        Self {
            value: None,
            used_service: None,
            failures: Vec::new(),
        }
    }

    /// Fold one provider result into the outcome
    pub fn record(&mut self, service: &str, result: anyhow::Result<T>) {
        match result {
            Ok(value) => {
                self.value = Some(value);
                self.used_service = Some(service.to_string());
            }
            // Alternate form keeps the whole context chain
            Err(err) => self.failures.push(FailureRecord::new(service, format!("{:#}", err))),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.used_service.is_some()
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    pub fn used_service(&self) -> Option<&str> {
        self.used_service.as_deref()
    }

    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    pub fn classify(&self) -> OutcomeClass {
        match (self.succeeded(), self.failures.is_empty()) {
            (true, true) => OutcomeClass::FullSuccess,
            (true, false) => OutcomeClass::PartialFailure,
            (false, _) => OutcomeClass::TotalFailure,
        }
    }

    /// Status of every service in `names` (attempt order), for alert summaries
    pub fn service_reports(&self, names: &[String]) -> Vec<ServiceReport> {
        let mut finished = false;
        names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let status = if finished {
                    ServiceStatus::Skipped
                } else if let Some(failure) = self.failures.get(index) {
                    ServiceStatus::Failed {
                        reason: failure.error.clone(),
                    }
                } else if self.succeeded() {
                    finished = true;
                    ServiceStatus::Succeeded
                } else {
                    ServiceStatus::Skipped
                };
                ServiceReport {
                    name: name.clone(),
                    status,
                }
            })
            .collect()
    }
}

impl<T> Default for FallbackOutcome<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors returned by the fallback executor
#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("no services configured")]
    NoServices,

    #[error("all services failed: {}", summarize(.failures))]
    AllProvidersFailed { failures: Vec<FailureRecord> },
}

fn summarize(failures: &[FailureRecord]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.service, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}
