//! Sequential fallback executor

use crate::outcome::{FallbackError, FallbackOutcome, OutcomeClass};
use alerting::{Alert, AlertContext, Notifier, Severity};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

type Operation<'a, T> = Box<dyn FnOnce() -> BoxFuture<'a, anyhow::Result<T>> + Send + 'a>;

/// A named provider call. The operation is not started until the executor
/// reaches it.
pub struct Service<'a, T> {
    name: String,
    operation: Operation<'a, T>,
}

impl<'a, T> Service<'a, T> {
    pub fn new<F, Fut>(name: impl Into<String>, operation: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'a,
    {
        Self {
            name: name.into(),
            operation: Box::new(move || Box::pin(operation())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> std::fmt::Debug for Service<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service").field("name", &self.name).finish()
    }
}

/// Tries services strictly in order and stops at the first success
pub struct FallbackExecutor {
    notifier: Arc<dyn Notifier>,
}

impl FallbackExecutor {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Run `services` in list order.
    ///
    /// Returns the outcome when some service succeeded. A partial failure
    /// dispatches a warning alert in the background; a total failure awaits
    /// a critical alert and then returns [`FallbackError::AllProvidersFailed`].
    pub async fn execute<'a, T>(
        &self,
        services: Vec<Service<'a, T>>,
        context: &AlertContext,
    ) -> Result<FallbackOutcome<T>, FallbackError> {
        if services.is_empty() {
            return Err(FallbackError::NoServices);
        }

        let names: Vec<String> = services.iter().map(|s| s.name.clone()).collect();
        let total = services.len();
        let mut outcome = FallbackOutcome::new();

        for (index, service) in services.into_iter().enumerate() {
            debug!(
                "Trying service {} ({}/{}) for {}",
                service.name,
                index + 1,
                total,
                context.endpoint
            );
            let result = (service.operation)().await;
            match &result {
                Ok(_) => info!("Service {} succeeded for {}", service.name, context.endpoint),
                Err(e) => warn!("Service {} failed for {}: {}", service.name, context.endpoint, e),
            }
            outcome.record(&service.name, result);
            if outcome.succeeded() {
                break;
            }
        }

        match outcome.classify() {
            OutcomeClass::FullSuccess => Ok(outcome),
            OutcomeClass::PartialFailure => {
                let alert = Alert::new(
                    Severity::Warning,
                    format!(
                        "{} of {} services failed before {} succeeded",
                        outcome.failures().len(),
                        total,
                        outcome.used_service().unwrap_or_default()
                    ),
                    context.clone(),
                    outcome.service_reports(&names),
                );
                let notifier = self.notifier.clone();
                tokio::spawn(async move {
                    if let Err(e) = notifier.notify(&alert).await {
                        error!("Failed to send partial failure alert: {}", e);
                    }
                });
                Ok(outcome)
            }
            OutcomeClass::TotalFailure => {
                let failures = outcome.failures().to_vec();
                let err = FallbackError::AllProvidersFailed { failures };
                let alert = Alert::new(
                    Severity::Critical,
                    err.to_string(),
                    context.clone(),
                    outcome.service_reports(&names),
                );
                if let Err(e) = self.notifier.notify(&alert).await {
                    error!("Failed to send total failure alert: {}", e);
                }
                Err(err)
            }
        }
    }
}
