//! Outbound HTTP providers used by relay routes

use crate::config::ProviderConfig;
use anyhow::{anyhow, Context};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Relay group name to its providers in priority order
pub type ProviderRegistry = HashMap<String, Vec<HttpProvider>>;

/// A third-party service reached by POSTing JSON and reading JSON back
#[derive(Debug, Clone)]
pub struct HttpProvider {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            name: config.name.clone(),
            url: config.url.clone(),
            client,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Forward `payload`; any transport error, non-2xx status or non-JSON
    /// body counts as a failure of this provider
    pub async fn call(&self, payload: &Value) -> anyhow::Result<Value> {
        debug!("Calling provider {} at {}", self.name, self.url);
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.name))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("{} returned HTTP {}", self.name, status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .with_context(|| format!("{} returned an unreadable body", self.name))
    }
}

/// Build every configured relay group
pub fn build_registry(
    groups: &HashMap<String, Vec<ProviderConfig>>,
) -> Result<ProviderRegistry, reqwest::Error> {
    let mut registry = ProviderRegistry::new();
    for (group, providers) in groups {
        let built = providers
            .iter()
            .map(HttpProvider::new)
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            "Relay group {}: {}",
            group,
            built.iter().map(HttpProvider::name).collect::<Vec<_>>().join(" -> ")
        );
        registry.insert(group.clone(), built);
    }
    Ok(registry)
}
