use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use alerting::{MemoryNotifier, Severity};
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::{AppConfig, ProviderConfig};
use crate::rate_limit::RateLimitConfig;
use crate::{create_router, AppState};

fn test_config() -> AppConfig {
    AppConfig {
        rate_limit: RateLimitConfig::disabled(),
        ..AppConfig::default()
    }
}

fn app_with(config: AppConfig, notifier: Arc<MemoryNotifier>) -> Router {
    let state = AppState::with_notifier(config, notifier).unwrap();
    create_router(Arc::new(state))
}

fn app() -> Router {
    app_with(test_config(), Arc::new(MemoryNotifier::new()))
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, owner: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::post(uri).header("content-type", "application/json");
    if let Some(owner) = owner {
        builder = builder.header("x-owner-id", owner);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn create_mock(app: &Router, owner: &str, body: Value) -> String {
    let response = send(app, post_json("/api/v1/mocks", Some(owner), body)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    created["definition"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let response = send(&app(), Request::get("/api/v1/health").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"]["mock_definitions"], 0);
}

#[tokio::test]
async fn test_create_and_serve_mock() {
    let app = app();
    let response = send(
        &app,
        post_json(
            "/api/v1/mocks",
            Some("alice"),
            json!({
                "name": "users",
                "response_template": r#"{"id": "{{uuid}}", "tags{{x3}}": "t"}"#,
                "headers": {"X-Source": "mock"}
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    let url = created["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("/mock/"));

    let response = send(&app, Request::get(url.as_str()).body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-source"], "mock");
    let body = json_body(response).await;
    assert_eq!(body["tags"], json!(["t", "t", "t"]));
    assert_eq!(body["id"].as_str().unwrap().len(), 36);
}

#[tokio::test]
async fn test_create_requires_owner() {
    let response = send(
        &app(),
        post_json("/api/v1/mocks", None, json!({"name": "x", "response_template": "{}"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_rejects_malformed_template() {
    let response = send(
        &app(),
        post_json(
            "/api/v1/mocks",
            Some("alice"),
            json!({"name": "broken", "response_template": "{\"a\": "}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().starts_with("invalid response template"));
}

#[tokio::test]
async fn test_serve_unknown_mock_is_not_found() {
    let response = send(&app(), Request::get("/mock/missing").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await, json!({"error": "not found"}));
}

#[tokio::test]
async fn test_serve_wrong_method() {
    let app = app();
    let id = create_mock(&app, "alice", json!({"name": "m", "response_template": "{}"})).await;

    let response = send(
        &app,
        Request::post(format!("/mock/{}", id)).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_serve_checks_api_key() {
    let app = app();
    let id = create_mock(
        &app,
        "alice",
        json!({
            "name": "secret",
            "response_template": r#"{"ok": true}"#,
            "auth_type": "apiKey",
            "auth_value": "k-123"
        }),
    )
    .await;
    let uri = format!("/mock/{}", id);

    let response = send(&app, Request::get(uri.as_str()).body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        &app,
        Request::get(uri.as_str())
            .header("x-api-key", "k-123")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"ok": true}));
}

#[tokio::test]
async fn test_serve_rate_limit_headers() {
    let app = app();
    let id = create_mock(
        &app,
        "alice",
        json!({
            "name": "limited",
            "response_template": "{}",
            "rate_limit_per_window": 2
        }),
    )
    .await;
    let uri = format!("/mock/{}", id);

    let first = send(&app, Request::get(uri.as_str()).body(Body::empty()).unwrap()).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-ratelimit-limit"], "2");
    assert_eq!(first.headers()["x-ratelimit-remaining"], "1");

    let second = send(&app, Request::get(uri.as_str()).body(Body::empty()).unwrap()).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()["x-ratelimit-remaining"], "0");

    let third = send(&app, Request::get(uri.as_str()).body(Body::empty()).unwrap()).await;
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(third.headers().contains_key("retry-after"));
}

#[tokio::test]
async fn test_private_mock_hidden_from_others() {
    let app = app();
    let id = create_mock(&app, "alice", json!({"name": "mine", "response_template": "{}"})).await;
    let uri = format!("/api/v1/mocks/{}", id);

    let own = send(
        &app,
        Request::get(uri.as_str())
            .header("x-owner-id", "alice")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(own.status(), StatusCode::OK);
    assert_eq!(json_body(own).await["owner_id"], "alice");

    let other = send(
        &app,
        Request::get(uri.as_str())
            .header("x-owner-id", "bob")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(other.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_share_and_public_listing() {
    let app = app();
    let id = create_mock(
        &app,
        "alice",
        json!({
            "name": "public",
            "response_template": "{}",
            "auth_type": "bearer",
            "auth_value": "tok"
        }),
    )
    .await;

    let forbidden = send(
        &app,
        Request::patch(format!("/api/v1/mocks/{}/share", id))
            .header("content-type", "application/json")
            .header("x-owner-id", "bob")
            .body(Body::from(json!({"shared": true}).to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let shared = send(
        &app,
        Request::patch(format!("/api/v1/mocks/{}/share", id))
            .header("content-type", "application/json")
            .header("x-owner-id", "alice")
            .body(Body::from(json!({"shared": true}).to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(shared.status(), StatusCode::OK);
    assert_eq!(json_body(shared).await["is_shared"], true);

    let listing = send(
        &app,
        Request::get("/api/v1/mocks?shared=true").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(listing.status(), StatusCode::OK);
    let listing = json_body(listing).await;
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["items"][0]["id"], id.as_str());
    assert!(listing["items"][0].get("auth_value").is_none());
    assert!(listing["items"][0].get("owner_id").is_none());
}

#[tokio::test]
async fn test_own_listing_requires_owner() {
    let app = app();
    create_mock(&app, "alice", json!({"name": "a", "response_template": "{}"})).await;
    create_mock(&app, "bob", json!({"name": "b", "response_template": "{}"})).await;

    let anonymous = send(&app, Request::get("/api/v1/mocks").body(Body::empty()).unwrap()).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let own = send(
        &app,
        Request::get("/api/v1/mocks")
            .header("x-owner-id", "alice")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let own = json_body(own).await;
    assert_eq!(own["total"], 1);
    assert_eq!(own["items"][0]["name"], "a");
}

#[tokio::test]
async fn test_delete_mock() {
    let app = app();
    let id = create_mock(&app, "alice", json!({"name": "gone", "response_template": "{}"})).await;

    let response = send(
        &app,
        Request::delete(format!("/api/v1/mocks/{}", id))
            .header("x-owner-id", "alice")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(
        &app,
        Request::get(format!("/mock/{}", id)).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

fn relay_config(servers: &[(&str, &MockServer)]) -> AppConfig {
    let group = servers
        .iter()
        .map(|(name, server)| ProviderConfig {
            name: name.to_string(),
            url: server.uri(),
            timeout_ms: 2000,
        })
        .collect();
    AppConfig {
        providers: HashMap::from([("ocr".to_string(), group)]),
        ..test_config()
    }
}

async fn provider_answering(status: u16, body: Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_relay_falls_back_and_alerts() {
    let primary = provider_answering(500, json!({})).await;
    let backup = provider_answering(200, json!({"text": "hello"})).await;
    let notifier = Arc::new(MemoryNotifier::new());
    let app = app_with(
        relay_config(&[("primary", &primary), ("backup", &backup)]),
        notifier.clone(),
    );

    let response = send(
        &app,
        post_json("/api/v1/relay/ocr", None, json!({"image": "abc"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["provider"], "backup");
    assert_eq!(body["result"], json!({"text": "hello"}));
    assert_eq!(body["degraded"], true);
    assert_eq!(body["failures"][0]["service"], "primary");

    assert!(notifier.wait_for(1, Duration::from_secs(2)).await);
    let alert = &notifier.alerts()[0];
    assert_eq!(alert.severity, Severity::Warning);
    assert_eq!(alert.context.params["group"], "ocr");
}

#[tokio::test]
async fn test_relay_total_failure_is_unavailable() {
    let primary = provider_answering(500, json!({})).await;
    let backup = provider_answering(503, json!({})).await;
    let notifier = Arc::new(MemoryNotifier::new());
    let app = app_with(
        relay_config(&[("primary", &primary), ("backup", &backup)]),
        notifier.clone(),
    );

    let response = send(&app, post_json("/api/v1/relay/ocr", None, json!({}))).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(
        body["error"],
        "service unavailable: all services failed: primary: primary returned HTTP 500; backup: backup returned HTTP 503"
    );

    // Critical alert is awaited before the response
    assert_eq!(notifier.count(), 1);
    assert_eq!(notifier.alerts()[0].severity, Severity::Critical);
}

#[tokio::test]
async fn test_relay_unknown_group() {
    let response = send(&app(), post_json("/api/v1/relay/nope", None, json!({}))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_disabled_without_recorder() {
    let response = send(&app(), Request::get("/metrics").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_mock_route_is_limited_per_ip() {
    let config = AppConfig {
        rate_limit: RateLimitConfig {
            enabled: true,
            replenish_secs: 60,
            burst_size: 2,
        },
        ..AppConfig::default()
    };
    let app = app_with(config, Arc::new(MemoryNotifier::new()));

    let from = |ip: &str| {
        let mut request = Request::get("/mock/missing").body(Body::empty()).unwrap();
        let peer: SocketAddr = format!("{}:40000", ip).parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        request
    };

    assert_eq!(send(&app, from("198.51.100.1")).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(send(&app, from("198.51.100.1")).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        send(&app, from("198.51.100.1")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    // Other clients keep their own budget
    assert_eq!(send(&app, from("198.51.100.2")).await.status(), StatusCode::NOT_FOUND);
}

