//! Mock endpoint render pipeline

use crate::error::MockError;
use crate::placeholders::PlaceholderTable;
use crate::template::Template;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use storage::{rate_key, AuthType, DefinitionStore, HttpMethod, MockEndpointDefinition, RateCounter, RateDecision};
use tracing::{debug, info, warn};

const API_KEY_HEADER: &str = "x-api-key";
const AUTHORIZATION_HEADER: &str = "authorization";

/// The parts of an inbound request the engine looks at
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: HttpMethod,
    /// Header names are stored lowercase
    headers: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new(method: HttpMethod) -> Self {
        Self {
            method,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// A synthesized response
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
    pub applied_delay: Duration,
    /// Rate limit state after this request, when the endpoint is limited
    pub rate: Option<RateDecision>,
}

impl MockResponse {
    pub fn body_string(&self) -> String {
        self.body.to_string()
    }
}

struct CachedTemplate {
    source: String,
    template: Arc<Template>,
}

/// Renders stored mock endpoint definitions
pub struct MockEngine {
    store: Arc<dyn DefinitionStore>,
    counter: Arc<dyn RateCounter>,
    placeholders: Arc<PlaceholderTable>,
    templates: RwLock<HashMap<String, CachedTemplate>>,
}

impl MockEngine {
    /// Create an engine using the standard placeholder table
    pub fn new(store: Arc<dyn DefinitionStore>, counter: Arc<dyn RateCounter>) -> Self {
        Self::with_placeholders(store, counter, PlaceholderTable::standard())
    }

    pub fn with_placeholders(
        store: Arc<dyn DefinitionStore>,
        counter: Arc<dyn RateCounter>,
        placeholders: Arc<PlaceholderTable>,
    ) -> Self {
        info!("Creating mock engine with {} placeholder tokens", placeholders.tokens().count());
        Self {
            store,
            counter,
            placeholders,
            templates: RwLock::new(HashMap::new()),
        }
    }

    pub fn placeholders(&self) -> &PlaceholderTable {
        &self.placeholders
    }

    /// Check a template at definition save time
    pub fn validate_template(&self, source: &str) -> Result<(), crate::TemplateError> {
        Template::parse(source, &self.placeholders).map(|_| ())
    }

    /// Render the definition `id` for one request.
    ///
    /// Auth, method and rate limit failures return before any delay or
    /// accounting. Once the delay starts the request always completes and
    /// is counted.
    pub async fn render(&self, id: &str, request: &RequestContext) -> Result<MockResponse, MockError> {
        let definition = self.store.get(id).await?.ok_or(MockError::DefinitionNotFound)?;

        if definition.http_method != request.method {
            debug!("Mock {} called with {} instead of {}", id, request.method, definition.http_method);
            return Err(MockError::MethodNotAllowed {
                allowed: definition.http_method,
            });
        }

        authorize(&definition, request)?;

        // A template that fails to parse never takes a rate slot
        let template = self.template_for(&definition)?;

        let rate = self.check_rate(&definition).await?;

        let delay = Duration::from_millis(definition.delay_ms);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let body = template.render(&self.placeholders);

        match self.store.increment_usage(id).await {
            Ok(count) => debug!("Mock {} served (request #{})", id, count),
            Err(e) => warn!("Failed to record usage for mock {}: {}", id, e),
        }

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        for (name, value) in &definition.headers {
            headers.insert(name.to_ascii_lowercase(), value.clone());
        }

        Ok(MockResponse {
            status: definition.status_code,
            headers,
            body,
            applied_delay: delay,
            rate,
        })
    }

    /// Forget the cached parse of a definition (after delete or expiry)
    pub fn evict(&self, id: &str) {
        if let Ok(mut templates) = self.templates.write() {
            templates.remove(id);
        }
    }

    pub fn cached_templates(&self) -> usize {
        self.templates.read().map(|t| t.len()).unwrap_or(0)
    }

    async fn check_rate(
        &self,
        definition: &MockEndpointDefinition,
    ) -> Result<Option<RateDecision>, MockError> {
        if definition.rate_limit_per_window == 0 {
            return Ok(None);
        }
        let key = rate_key(&definition.id);
        let window = Duration::from_millis(definition.rate_limit_window_ms);
        let decision = self
            .counter
            .acquire(&key, definition.rate_limit_per_window, window)
            .await?;
        if !decision.allowed {
            info!("Mock {} rate limited ({} per {:?})", definition.id, decision.limit, window);
            return Err(MockError::RateLimited {
                limit: decision.limit,
                retry_after: decision.reset_after,
            });
        }
        Ok(Some(decision))
    }

    fn template_for(&self, definition: &MockEndpointDefinition) -> Result<Arc<Template>, MockError> {
        if let Ok(templates) = self.templates.read() {
            if let Some(cached) = templates.get(&definition.id) {
                if cached.source == definition.response_template {
                    return Ok(cached.template.clone());
                }
            }
        }

        let template = Template::parse(&definition.response_template, &self.placeholders)
            .map_err(|e| {
                warn!("Mock {} has an invalid template: {}", definition.id, e);
                MockError::TemplateMalformed(e)
            })?;
        let template = Arc::new(template);

        if let Ok(mut templates) = self.templates.write() {
            templates.insert(
                definition.id.clone(),
                CachedTemplate {
                    source: definition.response_template.clone(),
                    template: template.clone(),
                },
            );
        }
        Ok(template)
    }
}

fn authorize(definition: &MockEndpointDefinition, request: &RequestContext) -> Result<(), MockError> {
    let expected = match (definition.auth_type, definition.auth_value.as_deref()) {
        (AuthType::None, _) => return Ok(()),
        (_, Some(expected)) => expected,
        // Authenticated endpoint without a secret accepts nobody
        (_, None) => return Err(MockError::Unauthorized),
    };

    let presented = match definition.auth_type {
        AuthType::ApiKey => request.header(API_KEY_HEADER),
        AuthType::Bearer => request.header(AUTHORIZATION_HEADER).and_then(bearer_token),
        AuthType::None => None,
    };

    match presented {
        Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => Ok(()),
        _ => Err(MockError::Unauthorized),
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use storage::{MemoryStore, NewDefinition};

    fn engine() -> (Arc<MemoryStore>, MockEngine) {
        let store = Arc::new(MemoryStore::new());
        let engine = MockEngine::new(store.clone(), store.clone());
        (store, engine)
    }

    fn get() -> RequestContext {
        RequestContext::new(HttpMethod::Get)
    }

    #[tokio::test]
    async fn test_render_resolves_template() {
        let (store, engine) = engine();
        let mut def = NewDefinition::new("users", r#"{"users{{x5}}": [{"id":"{{uuid}}","name":"{{name}}"}], "total": 5}"#);
        def.status_code = 201;
        def.headers.insert("X-Mock".into(), "yes".into());
        let def = store.insert(def, "alice").await.unwrap();

        let response = engine.render(&def.id, &get()).await.unwrap();

        assert_eq!(response.status, 201);
        assert_eq!(response.headers["content-type"], "application/json");
        assert_eq!(response.headers["x-mock"], "yes");
        assert_eq!(response.body["total"], 5);
        let ids: HashSet<_> = response.body["users"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids.len(), 5);

        let stored = store.get(&def.id).await.unwrap().unwrap();
        assert_eq!(stored.request_count, 1);
        assert!(stored.last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_consecutive_renders_differ() {
        let (store, engine) = engine();
        let def = store
            .insert(NewDefinition::new("ids", r#"{"id":"{{uuid}}","at":"{{timestamp}}"}"#), "alice")
            .await
            .unwrap();

        let first = engine.render(&def.id, &get()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = engine.render(&def.id, &get()).await.unwrap();

        assert_ne!(first.body["id"], second.body["id"]);
        assert_ne!(first.body["at"], second.body["at"]);
    }

    #[tokio::test]
    async fn test_unknown_definition() {
        let (_, engine) = engine();
        let err = engine.render("missing", &get()).await.unwrap_err();
        assert!(matches!(err, MockError::DefinitionNotFound));
    }

    #[tokio::test]
    async fn test_method_mismatch() {
        let (store, engine) = engine();
        let mut def = NewDefinition::new("create", "{}");
        def.http_method = HttpMethod::Post;
        let def = store.insert(def, "alice").await.unwrap();

        let err = engine.render(&def.id, &get()).await.unwrap_err();
        assert!(matches!(err, MockError::MethodNotAllowed { allowed: HttpMethod::Post }));
        let ok = engine
            .render(&def.id, &RequestContext::new(HttpMethod::Post))
            .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn test_bearer_auth() {
        let (store, engine) = engine();
        let mut def = NewDefinition::new("secure", r#"{"ok":true}"#);
        def.auth_type = AuthType::Bearer;
        def.auth_value = Some("s3cret".into());
        let def = store.insert(def, "alice").await.unwrap();

        for request in [
            get(),
            get().with_header("Authorization", "Bearer wrong"),
            get().with_header("Authorization", "s3cret"),
        ] {
            let err = engine.render(&def.id, &request).await.unwrap_err();
            assert!(matches!(err, MockError::Unauthorized));
        }
        let stored = store.get(&def.id).await.unwrap().unwrap();
        assert_eq!(stored.request_count, 0);
        assert!(stored.last_used_at.is_none());

        let ok = engine
            .render(&def.id, &get().with_header("Authorization", "bearer s3cret"))
            .await
            .unwrap();
        assert_eq!(ok.body["ok"], true);
    }

    #[tokio::test]
    async fn test_api_key_auth() {
        let (store, engine) = engine();
        let mut def = NewDefinition::new("keyed", "{}");
        def.auth_type = AuthType::ApiKey;
        def.auth_value = Some("k-123".into());
        let def = store.insert(def, "alice").await.unwrap();

        let err = engine
            .render(&def.id, &get().with_header("X-Api-Key", "k-12"))
            .await
            .unwrap_err();
        assert!(matches!(err, MockError::Unauthorized));
        assert!(engine
            .render(&def.id, &get().with_header("X-Api-Key", "k-123"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_rate_limit_stops_counting_at_limit() {
        let (store, engine) = engine();
        let mut def = NewDefinition::new("limited", "{}");
        def.rate_limit_per_window = 3;
        let def = store.insert(def, "alice").await.unwrap();

        for remaining in [2, 1, 0] {
            let response = engine.render(&def.id, &get()).await.unwrap();
            assert_eq!(response.rate.unwrap().remaining(), remaining);
        }
        let err = engine.render(&def.id, &get()).await.unwrap_err();
        assert!(matches!(err, MockError::RateLimited { limit: 3, .. }));

        let stored = store.get(&def.id).await.unwrap().unwrap();
        assert_eq!(stored.request_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_applied() {
        let (store, engine) = engine();
        let mut def = NewDefinition::new("slow", "{}");
        def.delay_ms = 1500;
        let def = store.insert(def, "alice").await.unwrap();

        let started = tokio::time::Instant::now();
        let response = engine.render(&def.id, &get()).await.unwrap();

        assert_eq!(response.applied_delay, Duration::from_millis(1500));
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_malformed_template_is_not_counted() {
        let (store, engine) = engine();
        let def = store
            .insert(NewDefinition::new("broken", "{\"a\":"), "alice")
            .await
            .unwrap();

        let err = engine.render(&def.id, &get()).await.unwrap_err();
        assert!(matches!(err, MockError::TemplateMalformed(_)));
        assert_eq!(store.get(&def.id).await.unwrap().unwrap().request_count, 0);
    }

    #[tokio::test]
    async fn test_malformed_template_does_not_use_rate_quota() {
        let (store, engine) = engine();
        let mut broken = NewDefinition::new("broken", "{\"a\":");
        broken.rate_limit_per_window = 1;
        let def = store.insert(broken, "alice").await.unwrap();

        for _ in 0..3 {
            let err = engine.render(&def.id, &get()).await.unwrap_err();
            assert!(matches!(err, MockError::TemplateMalformed(_)));
        }
        let decision = store
            .acquire(&rate_key(&def.id), 1, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_evict_forgets_parsed_template() {
        let (store, engine) = engine();
        let def = store.insert(NewDefinition::new("users", "{}"), "alice").await.unwrap();

        engine.render(&def.id, &get()).await.unwrap();
        assert_eq!(engine.cached_templates(), 1);

        engine.evict(&def.id);
        assert_eq!(engine.cached_templates(), 0);
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("BEARER  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
