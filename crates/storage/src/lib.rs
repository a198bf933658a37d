//! Storage Layer
//!
//! Persists mock endpoint definitions and the request counters used for
//! rate limiting. Backends are interchangeable behind [`DefinitionStore`]
//! and [`RateCounter`]; [`MemoryStore`] implements both in process.

mod model;
mod repository;

pub use model::{
    AuthType, HttpMethod, ListFilter, MockEndpointDefinition, NewDefinition, Page, PageRequest,
    SharedDefinition, MAX_DELAY_MS, MAX_PER_PAGE, MAX_TEMPLATE_BYTES,
};
pub use repository::{MemoryStore, DEFAULT_TTL};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found")]
    NotFound,
    #[error("Not permitted to modify this record")]
    Forbidden,
    #[error("Invalid definition: {0}")]
    Invalid(String),
}

/// Rate limit key of one mock endpoint definition
pub fn rate_key(definition_id: &str) -> String {
    format!("mock:{}", definition_id)
}

/// Persistent store for mock endpoint definitions
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    /// Validate and persist a new definition owned by `owner_id`
    async fn insert(
        &self,
        definition: NewDefinition,
        owner_id: &str,
    ) -> Result<MockEndpointDefinition, StorageError>;

    /// Fetch a live (non-expired) definition
    async fn get(&self, id: &str) -> Result<Option<MockEndpointDefinition>, StorageError>;

    /// Toggle public visibility; owner only
    async fn set_shared(
        &self,
        id: &str,
        owner_id: &str,
        shared: bool,
    ) -> Result<MockEndpointDefinition, StorageError>;

    /// Remove a definition; owner only
    async fn delete(&self, id: &str, owner_id: &str) -> Result<(), StorageError>;

    /// Atomically bump `request_count` and stamp `last_used_at`; returns the new count
    async fn increment_usage(&self, id: &str) -> Result<u64, StorageError>;

    /// Filtered, paginated listing, newest first
    async fn list(
        &self,
        filter: &ListFilter,
        page: PageRequest,
    ) -> Result<Page<MockEndpointDefinition>, StorageError>;
}

/// Outcome of a rate limit acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Requests counted in the current window, including this one when allowed
    pub count: u32,
    pub limit: u32,
    /// Time until the oldest counted request leaves the window
    pub reset_after: Duration,
}

impl RateDecision {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }
}

/// Sliding-window request counter keyed by an arbitrary string
#[async_trait]
pub trait RateCounter: Send + Sync {
    /// Count one request against `key` if fewer than `limit` requests were
    /// counted within the last `window`. Rejected requests are not counted.
    async fn acquire(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateDecision, StorageError>;
}
