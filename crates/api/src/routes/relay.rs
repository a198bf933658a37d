//! Provider relay routes

use alerting::AlertContext;
use axum::{
    extract::{Path, State},
    http::{header::USER_AGENT, HeaderMap},
    Json,
};
use fallback::{FailureRecord, OutcomeClass, Service};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::error::ApiError;
use crate::telemetry::record_relay;
use crate::SharedState;

/// Response for a relayed request
#[derive(Debug, Serialize)]
pub struct RelayResponse {
    /// Provider that produced `result`
    pub provider: String,
    pub result: Value,
    /// True when earlier providers failed first
    pub degraded: bool,
    pub failures: Vec<FailureRecord>,
}

/// Forward the JSON body through the providers of `group`, in order
pub async fn relay(
    State(state): State<SharedState>,
    Path(group): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<RelayResponse>, ApiError> {
    let providers = state.providers.get(&group).ok_or(ApiError::NotFound)?;

    let mut context =
        AlertContext::new(format!("/api/v1/relay/{}", group), "POST").with_param("group", &group);
    if let Some(agent) = headers.get(USER_AGENT).and_then(|v| v.to_str().ok()) {
        context = context.with_user_agent(agent);
    }

    let payload = &payload;
    let services = providers
        .iter()
        .map(|provider| Service::new(provider.name(), move || provider.call(payload)))
        .collect();

    let outcome = match state.executor.execute(services, &context).await {
        Ok(outcome) => outcome,
        Err(err) => {
            record_relay(&group, OutcomeClass::TotalFailure.as_str());
            return Err(err.into());
        }
    };

    let class = outcome.classify();
    record_relay(&group, class.as_str());

    let provider = outcome.used_service().unwrap_or_default().to_string();
    let failures = outcome.failures().to_vec();
    info!("Relay {} answered by {} ({})", group, provider, class.as_str());

    Ok(Json(RelayResponse {
        provider,
        result: outcome.into_value().unwrap_or(Value::Null),
        degraded: class == OutcomeClass::PartialFailure,
        failures,
    }))
}
