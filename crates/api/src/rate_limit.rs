//! Rate Limiting
//!
//! Two layers of limiting meet here:
//! - per client IP on the public relay and mock routes, using tower_governor's GCRA
//!   implementation (in-process state, so limits are per instance);
//! - per mock endpoint, decided by the engine and reported to clients
//!   through `x-ratelimit-*` headers built below.

use axum::http::{header::RETRY_AFTER, HeaderMap, HeaderName, HeaderValue};
use governor::middleware::StateInformationMiddleware;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use storage::RateDecision;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;

/// Per-IP limiter for the public routes, keyed by peer address and
/// reporting its state in response headers
pub type DefaultGovernorConfig =
    tower_governor::governor::GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

/// Per-IP rate limiting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Disable to run behind a proxy that already limits
    pub enabled: bool,
    /// Period in seconds after which one more request is allowed
    #[serde(alias = "per_second")]
    pub replenish_secs: u64,
    /// Burst size (max requests that can be made immediately)
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            replenish_secs: 2,
            burst_size: 5,
        }
    }
}

impl RateLimitConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Create a rate limiting governor config
///
/// Uses PeerIpKeyExtractor, so the service must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`. Returns `None`
/// when the config has a zero period or burst.
pub fn create_governor_config(config: &RateLimitConfig) -> Option<Arc<DefaultGovernorConfig>> {
    GovernorConfigBuilder::default()
        // governor reads this as "one element every n seconds"
        .per_second(config.replenish_secs)
        .burst_size(config.burst_size)
        .use_headers()
        .finish()
        .map(Arc::new)
}

/// Headers describing an accepted request against a limited mock endpoint
pub fn decision_headers(decision: &RateDecision) -> HeaderMap {
    build_headers(decision.limit, decision.remaining(), decision.reset_after, None)
}

/// Headers for a rejected request
pub fn limited_headers(limit: u32, retry_after: Duration) -> HeaderMap {
    build_headers(limit, 0, retry_after, Some(retry_after))
}

fn build_headers(
    limit: u32,
    remaining: u32,
    reset_after: Duration,
    retry_after: Option<Duration>,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if limit == 0 {
        return headers;
    }

    headers.insert(
        HeaderName::from_static("x-ratelimit-limit"),
        HeaderValue::from(limit),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-remaining"),
        HeaderValue::from(remaining),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-reset"),
        HeaderValue::from(duration_to_seconds(reset_after)),
    );
    if let Some(retry_after) = retry_after {
        headers.insert(RETRY_AFTER, HeaderValue::from(duration_to_seconds(retry_after)));
    }

    headers
}

/// Whole seconds, rounded up, never below one
fn duration_to_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    let rounded = if duration.subsec_nanos() == 0 { secs } else { secs + 1 };
    rounded.max(1)
}
