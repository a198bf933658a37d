//! In-memory store implementation

use crate::{
    rate_key, DefinitionStore, ListFilter, MockEndpointDefinition, NewDefinition, Page, PageRequest,
    RateCounter, RateDecision, StorageError,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Definitions expire 30 days after creation
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Store for definitions and rate counters (in-memory implementation)
pub struct MemoryStore {
    /// Definitions by id
    definitions: Mutex<HashMap<String, MockEndpointDefinition>>,
    /// Counted requests per rate limit key
    windows: Mutex<HashMap<String, RateWindow>>,
    /// Lifetime of a definition, `None` keeps definitions forever
    ttl: Option<Duration>,
}

/// Sliding log for one rate limit key
#[derive(Debug, Default)]
struct RateWindow {
    hits: VecDeque<Instant>,
    window: Duration,
}

impl RateWindow {
    fn evict_before(&mut self, now: Instant) {
        while self
            .hits
            .front()
            .map_or(false, |first| now.duration_since(*first) >= self.window)
        {
            self.hits.pop_front();
        }
    }
}

fn lock_error<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::DatabaseError(format!("Lock error: {}", e))
}

impl MemoryStore {
    /// Create a new in-memory store with the default TTL
    pub fn new() -> Self {
        Self::with_ttl(Some(DEFAULT_TTL))
    }

    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        info!("Creating in-memory definition store (ttl: {:?})", ttl);
        Self {
            definitions: Mutex::new(HashMap::new()),
            windows: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Drop expired definitions with their rate windows, and any window
    /// with no hit left inside it. Returns the ids of removed definitions.
    pub fn purge_expired(&self) -> Result<Vec<String>, StorageError> {
        let now = Utc::now();
        let mut definitions = self.definitions.lock().map_err(lock_error)?;
        let removed: Vec<String> = definitions
            .values()
            .filter(|def| def.is_expired(now))
            .map(|def| def.id.clone())
            .collect();
        for id in &removed {
            definitions.remove(id);
        }
        drop(definitions);

        let tick = Instant::now();
        let mut windows = self.windows.lock().map_err(lock_error)?;
        for id in &removed {
            windows.remove(&rate_key(id));
        }
        windows.retain(|_, window| {
            window.evict_before(tick);
            !window.hits.is_empty()
        });
        drop(windows);

        if !removed.is_empty() {
            info!("Purged {} expired definitions", removed.len());
        }
        Ok(removed)
    }

    /// Total live definitions
    pub fn definition_count(&self) -> usize {
        let now = Utc::now();
        self.definitions
            .lock()
            .map(|d| d.values().filter(|def| !def.is_expired(now)).count())
            .unwrap_or(0)
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        if let Ok(mut definitions) = self.definitions.lock() {
            definitions.clear();
        }
        if let Ok(mut windows) = self.windows.lock() {
            windows.clear();
        }
    }

    fn with_owned<R>(
        &self,
        id: &str,
        owner_id: &str,
        f: impl FnOnce(&mut HashMap<String, MockEndpointDefinition>) -> R,
    ) -> Result<R, StorageError> {
        let mut definitions = self.definitions.lock().map_err(lock_error)?;
        let def = definitions
            .get(id)
            .filter(|def| !def.is_expired(Utc::now()))
            .ok_or(StorageError::NotFound)?;
        if !def.is_owned_by(owner_id) {
            return Err(StorageError::Forbidden);
        }
        Ok(f(&mut definitions))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DefinitionStore for MemoryStore {
    async fn insert(
        &self,
        definition: NewDefinition,
        owner_id: &str,
    ) -> Result<MockEndpointDefinition, StorageError> {
        definition.validate()?;
        let created_at = Utc::now();
        let expires_at = match self.ttl {
            Some(ttl) => Some(
                created_at
                    + chrono::Duration::from_std(ttl)
                        .map_err(|e| StorageError::Invalid(e.to_string()))?,
            ),
            None => None,
        };
        let id = Uuid::new_v4().simple().to_string();
        let def = definition.into_definition(id, owner_id, created_at, expires_at);

        let mut definitions = self.definitions.lock().map_err(lock_error)?;
        definitions.insert(def.id.clone(), def.clone());
        debug!("Inserted definition {} for owner {}", def.id, owner_id);
        Ok(def)
    }

    async fn get(&self, id: &str) -> Result<Option<MockEndpointDefinition>, StorageError> {
        let mut definitions = self.definitions.lock().map_err(lock_error)?;
        match definitions.get(id) {
            Some(def) if def.is_expired(Utc::now()) => {
                definitions.remove(id);
                Ok(None)
            }
            found => Ok(found.cloned()),
        }
    }

    async fn set_shared(
        &self,
        id: &str,
        owner_id: &str,
        shared: bool,
    ) -> Result<MockEndpointDefinition, StorageError> {
        self.with_owned(id, owner_id, |definitions| {
            definitions.get_mut(id).map(|def| {
                def.is_shared = shared;
                def.clone()
            })
        })?
        .ok_or(StorageError::NotFound)
    }

    async fn delete(&self, id: &str, owner_id: &str) -> Result<(), StorageError> {
        self.with_owned(id, owner_id, |definitions| {
            definitions.remove(id);
        })?;
        if let Ok(mut windows) = self.windows.lock() {
            windows.remove(&rate_key(id));
        }
        info!("Deleted definition {}", id);
        Ok(())
    }

    async fn increment_usage(&self, id: &str) -> Result<u64, StorageError> {
        let mut definitions = self.definitions.lock().map_err(lock_error)?;
        let def = definitions.get_mut(id).ok_or(StorageError::NotFound)?;
        def.request_count += 1;
        def.last_used_at = Some(Utc::now());
        Ok(def.request_count)
    }

    async fn list(
        &self,
        filter: &ListFilter,
        page: PageRequest,
    ) -> Result<Page<MockEndpointDefinition>, StorageError> {
        let now = Utc::now();
        let definitions = self.definitions.lock().map_err(lock_error)?;
        let mut matching: Vec<_> = definitions
            .values()
            .filter(|def| !def.is_expired(now) && filter.matches(def))
            .cloned()
            .collect();
        drop(definitions);

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(Page::from_items(matching, page))
    }
}

#[async_trait]
impl RateCounter for MemoryStore {
    async fn acquire(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateDecision, StorageError> {
        let now = Instant::now();
        let mut windows = self.windows.lock().map_err(lock_error)?;
        let entry = windows.entry(key.to_string()).or_default();
        entry.window = window;
        entry.evict_before(now);
        let hits = &mut entry.hits;

        let allowed = (hits.len() as u32) < limit;
        if allowed {
            hits.push_back(now);
        }
        let reset_after = hits
            .front()
            .map(|first| window.saturating_sub(now.duration_since(*first)))
            .unwrap_or(window);

        Ok(RateDecision {
            allowed,
            count: hits.len() as u32,
            limit,
            reset_after,
        })
    }
}
