//! Mock endpoint definition model

use crate::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Longest simulated latency a definition may request
pub const MAX_DELAY_MS: u64 = 30_000;
/// Largest accepted response template
pub const MAX_TEMPLATE_BYTES: usize = 100 * 1024;
/// Largest page size for listings
pub const MAX_PER_PAGE: u32 = 100;

const MAX_NAME_LEN: usize = 100;
const DEFAULT_WINDOW_MS: u64 = 60_000;

/// HTTP method a mock endpoint answers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl Default for HttpMethod {
    fn default() -> Self {
        HttpMethod::Get
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(StorageError::Invalid(format!("unsupported method {}", other))),
        }
    }
}

/// How callers must authenticate against a mock endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthType {
    None,
    /// `x-api-key: <value>`
    ApiKey,
    /// `Authorization: Bearer <value>`
    Bearer,
}

impl Default for AuthType {
    fn default() -> Self {
        AuthType::None
    }
}

/// A persisted, user-authored mock endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockEndpointDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub http_method: HttpMethod,
    /// JSON text with `{{token}}` placeholders and `key{{xN}}` repeat markers
    pub response_template: String,
    pub status_code: u16,
    pub delay_ms: u64,
    pub headers: BTreeMap<String, String>,
    pub auth_type: AuthType,
    pub auth_value: Option<String>,
    /// 0 disables rate limiting
    pub rate_limit_per_window: u32,
    pub rate_limit_window_ms: u64,
    pub request_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_shared: bool,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl MockEndpointDefinition {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }

    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }
}

/// Input for creating a definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub http_method: HttpMethod,
    pub response_template: String,
    #[serde(default = "default_status")]
    pub status_code: u16,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub auth_type: AuthType,
    #[serde(default)]
    pub auth_value: Option<String>,
    #[serde(default)]
    pub rate_limit_per_window: u32,
    #[serde(default = "default_window_ms")]
    pub rate_limit_window_ms: u64,
    #[serde(default)]
    pub is_shared: bool,
}

fn default_status() -> u16 {
    200
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

impl NewDefinition {
    /// Minimal GET definition answering 200 with `template`
    pub fn new(name: impl Into<String>, response_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            http_method: HttpMethod::Get,
            response_template: response_template.into(),
            status_code: default_status(),
            delay_ms: 0,
            headers: BTreeMap::new(),
            auth_type: AuthType::None,
            auth_value: None,
            rate_limit_per_window: 0,
            rate_limit_window_ms: DEFAULT_WINDOW_MS,
            is_shared: false,
        }
    }

    /// Structural checks. Template syntax is checked by the engine.
    pub fn validate(&self) -> Result<(), StorageError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(StorageError::Invalid("name is required".into()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(StorageError::Invalid(format!(
                "name exceeds {} characters",
                MAX_NAME_LEN
            )));
        }
        if !(100..=599).contains(&self.status_code) {
            return Err(StorageError::Invalid(format!(
                "status code {} is not a valid HTTP status",
                self.status_code
            )));
        }
        if self.delay_ms > MAX_DELAY_MS {
            return Err(StorageError::Invalid(format!(
                "delay exceeds {} ms",
                MAX_DELAY_MS
            )));
        }
        if self.response_template.len() > MAX_TEMPLATE_BYTES {
            return Err(StorageError::Invalid("response template is too large".into()));
        }
        if self.auth_type != AuthType::None
            && self.auth_value.as_deref().map_or(true, |v| v.trim().is_empty())
        {
            return Err(StorageError::Invalid(
                "auth value is required for authenticated endpoints".into(),
            ));
        }
        if self.rate_limit_per_window > 0 && self.rate_limit_window_ms == 0 {
            return Err(StorageError::Invalid("rate limit window must be positive".into()));
        }
        Ok(())
    }

    pub(crate) fn into_definition(
        self,
        id: String,
        owner_id: &str,
        created_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> MockEndpointDefinition {
        let auth_value = match self.auth_type {
            AuthType::None => None,
            _ => self.auth_value,
        };
        MockEndpointDefinition {
            id,
            name: self.name.trim().to_string(),
            description: self.description,
            http_method: self.http_method,
            response_template: self.response_template,
            status_code: self.status_code,
            delay_ms: self.delay_ms,
            headers: self.headers,
            auth_type: self.auth_type,
            auth_value,
            rate_limit_per_window: self.rate_limit_per_window,
            rate_limit_window_ms: self.rate_limit_window_ms,
            request_count: 0,
            last_used_at: None,
            is_shared: self.is_shared,
            owner_id: owner_id.to_string(),
            created_at,
            expires_at,
        }
    }
}

/// Public view of a shared definition; never carries credentials or owner
#[derive(Debug, Clone, Serialize)]
pub struct SharedDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub http_method: HttpMethod,
    pub response_template: String,
    pub status_code: u16,
    pub delay_ms: u64,
    pub headers: BTreeMap<String, String>,
    pub auth_type: AuthType,
    pub rate_limit_per_window: u32,
    pub request_count: u64,
    pub created_at: DateTime<Utc>,
}

impl From<&MockEndpointDefinition> for SharedDefinition {
    fn from(def: &MockEndpointDefinition) -> Self {
        Self {
            id: def.id.clone(),
            name: def.name.clone(),
            description: def.description.clone(),
            http_method: def.http_method,
            response_template: def.response_template.clone(),
            status_code: def.status_code,
            delay_ms: def.delay_ms,
            headers: def.headers.clone(),
            auth_type: def.auth_type,
            rate_limit_per_window: def.rate_limit_per_window,
            request_count: def.request_count,
            created_at: def.created_at,
        }
    }
}

/// Listing filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListFilter {
    /// Only definitions marked shared
    #[serde(default)]
    pub shared_only: bool,
    /// Only definitions owned by this owner
    pub owner_id: Option<String>,
    /// Case-insensitive match on name or description
    pub search: Option<String>,
    pub method: Option<HttpMethod>,
}

impl ListFilter {
    pub fn matches(&self, def: &MockEndpointDefinition) -> bool {
        if self.shared_only && !def.is_shared {
            return false;
        }
        if let Some(owner) = &self.owner_id {
            if &def.owner_id != owner {
                return false;
            }
        }
        if let Some(method) = self.method {
            if def.http_method != method {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                def.name.to_lowercase().contains(&needle)
                    || def.description.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }
}

/// 1-based page request, always within bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    per_page: u32,
}

impl PageRequest {
    /// Clamp to page >= 1 and 1..=MAX_PER_PAGE items
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.per_page as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Slice `all` according to `request`
    pub fn from_items(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len();
        let per_page = request.per_page() as usize;
        let total_pages = total.div_ceil(per_page) as u32;
        let items = all
            .into_iter()
            .skip(request.offset())
            .take(per_page)
            .collect();
        Self {
            items,
            total,
            page: request.page(),
            per_page: request.per_page(),
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
        }
    }
}
