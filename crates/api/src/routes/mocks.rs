//! Mock Definition Routes

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use storage::{
    HttpMethod, ListFilter, MockEndpointDefinition, NewDefinition, Page, PageRequest,
    SharedDefinition,
};
use tracing::info;

use crate::error::ApiError;
use crate::SharedState;

const OWNER_HEADER: &str = "x-owner-id";

/// Caller identity taken from the `x-owner-id` header
#[derive(Debug, Clone)]
pub struct Owner(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Owner(v.to_string()))
            .ok_or(ApiError::MissingOwner)
    }
}

/// Response for a created definition
#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub definition: MockEndpointDefinition,
    /// Path clients call to receive the rendered response
    pub url: String,
}

/// Query parameters for the listing endpoint
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Public listing instead of the caller's own definitions
    #[serde(default)]
    pub shared: bool,
    pub search: Option<String>,
    pub method: Option<HttpMethod>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ListResponse {
    Owned(Page<MockEndpointDefinition>),
    Shared(Page<SharedDefinition>),
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DefinitionView {
    Owned(MockEndpointDefinition),
    Shared(SharedDefinition),
}

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub shared: bool,
}

/// Create a definition
pub async fn create(
    State(state): State<SharedState>,
    Owner(owner): Owner,
    Json(input): Json<NewDefinition>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .engine
        .validate_template(&input.response_template)
        .map_err(|e| ApiError::BadRequest(format!("invalid response template: {}", e)))?;

    let definition = state.definitions.insert(input, &owner).await?;
    info!("Created mock {} ({}) for {}", definition.id, definition.name, owner);

    let url = format!("/mock/{}", definition.id);
    Ok((StatusCode::CREATED, Json(CreatedResponse { definition, url })))
}

/// List the caller's definitions, or shared ones with `?shared=true`
pub async fn list(
    State(state): State<SharedState>,
    owner: Option<Owner>,
    Query(params): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let page = PageRequest::new(params.page, params.per_page);
    let mut filter = ListFilter {
        shared_only: params.shared,
        owner_id: None,
        search: params.search,
        method: params.method,
    };

    if params.shared {
        let listing = state.definitions.list(&filter, page).await?;
        return Ok(Json(ListResponse::Shared(
            listing.map(|def| SharedDefinition::from(&def)),
        )));
    }

    let Owner(owner) = owner.ok_or(ApiError::MissingOwner)?;
    filter.owner_id = Some(owner);
    let listing = state.definitions.list(&filter, page).await?;
    Ok(Json(ListResponse::Owned(listing)))
}

/// Owners see the full definition, everyone else only shared ones
pub async fn get_one(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    owner: Option<Owner>,
) -> Result<Json<DefinitionView>, ApiError> {
    let definition = state.definitions.get(&id).await?.ok_or(ApiError::NotFound)?;

    match owner {
        Some(Owner(owner)) if definition.is_owned_by(&owner) => {
            Ok(Json(DefinitionView::Owned(definition)))
        }
        _ if definition.is_shared => Ok(Json(DefinitionView::Shared(SharedDefinition::from(
            &definition,
        )))),
        _ => Err(ApiError::NotFound),
    }
}

pub async fn share(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Owner(owner): Owner,
    Json(request): Json<ShareRequest>,
) -> Result<Json<MockEndpointDefinition>, ApiError> {
    let definition = state.definitions.set_shared(&id, &owner, request.shared).await?;
    info!("Mock {} shared={}", id, request.shared);
    Ok(Json(definition))
}

pub async fn delete(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Owner(owner): Owner,
) -> Result<StatusCode, ApiError> {
    state.definitions.delete(&id, &owner).await?;
    state.engine.evict(&id);
    Ok(StatusCode::NO_CONTENT)
}
