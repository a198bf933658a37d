//! Logging and Prometheus metrics

use crate::config::LoggingConfig;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global tracing subscriber
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level: Level = config
        .level
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid log level {:?}", config.level))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Install the Prometheus recorder once per process
pub fn init_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

pub fn record_mock_render(result: &str, delay: Duration) {
    counter!("mock_renders_total", "result" => result.to_string()).increment(1);
    histogram!("mock_render_delay_ms").record(delay.as_millis() as f64);
}

pub fn record_relay(group: &str, outcome: &str) {
    counter!(
        "relay_requests_total",
        "group" => group.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}
