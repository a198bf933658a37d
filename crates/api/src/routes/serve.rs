//! Mock endpoint serving

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::Response,
};
use mock_engine::{MockError, RequestContext};
use storage::HttpMethod;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::rate_limit::decision_headers;
use crate::telemetry::record_mock_render;
use crate::SharedState;

/// Render mock `id` for any HTTP method
pub async fn serve(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let method: HttpMethod = method
        .as_str()
        .parse()
        .map_err(|_| ApiError::MethodNotAllowed)?;

    let mut request = RequestContext::new(method);
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    let rendered = match state.engine.render(&id, &request).await {
        Ok(rendered) => rendered,
        Err(err) => {
            record_mock_render(error_label(&err), std::time::Duration::ZERO);
            return Err(err.into());
        }
    };
    record_mock_render("ok", rendered.applied_delay);

    let status = StatusCode::from_u16(rendered.status)
        .map_err(|e| ApiError::Internal(format!("stored status {}: {}", rendered.status, e)))?;

    let mut response = Response::new(Body::from(rendered.body_string()));
    *response.status_mut() = status;

    let response_headers = response.headers_mut();
    for (name, value) in &rendered.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                response_headers.insert(name, value);
            }
            _ => warn!("Skipping invalid header {:?} on mock {}", name, id),
        }
    }
    if let Some(decision) = &rendered.rate {
        response_headers.extend(decision_headers(decision));
    }

    debug!("Mock {} answered {}", id, rendered.status);
    Ok(response)
}

fn error_label(err: &MockError) -> &'static str {
    match err {
        MockError::DefinitionNotFound => "not_found",
        MockError::MethodNotAllowed { .. } => "method_not_allowed",
        MockError::Unauthorized => "unauthorized",
        MockError::RateLimited { .. } => "rate_limited",
        MockError::TemplateMalformed(_) => "invalid_template",
        MockError::Storage(_) => "storage",
    }
}
