//! Shared caches and the gadget definition factory.
//!
//! # Architecture Overview
//!
//! - [`NamedCache`]: a concurrent insert-if-absent map (`DashMap`) with a
//!   name used in logs
//! - [`CacheRegistry`]: the set of named caches a server owns, built once at
//!   startup and handed to every component that needs one
//! - [`DefinitionFactory`]: fetches, parses and publishes gadget definitions
//!
//! # Concurrency
//!
//! Caches are read-mostly and never block readers on a fetch. Two requests
//! missing on the same key both do their own fetch and parse; the first one
//! to insert publishes its value and the second one gets the published value
//! back, so exactly one definition per URI is ever observed. Entries do not
//! expire.

use anyhow::{Context, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::constants::{GADGET_SPEC_CACHE, PRELOAD_CACHE};
use crate::core::{GadgetError, find_gadget_error};
use crate::fetch::{FetchRequest, HttpFetcher, RequestDeadline, fetch_text};
use crate::gadget::{GadgetDefinition, GadgetParser};
use crate::utils::exponential_backoff_with_delay;

/// Concurrent map with first-writer-wins insertion.
#[derive(Debug)]
pub struct NamedCache<K: Eq + Hash, V> {
    name: &'static str,
    entries: DashMap<K, V>,
}

impl<K: Eq + Hash, V: Clone> NamedCache<K, V> {
    /// Create an empty cache.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: DashMap::new(),
        }
    }

    /// Look an entry up; never triggers I/O.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Insert `value` unless `key` is already present, and return the value
    /// that is cached afterwards.
    pub fn insert_if_absent(&self, key: K, value: V) -> V {
        match self.entries.entry(key) {
            Entry::Occupied(existing) => {
                debug!("Cache '{}': keeping existing entry", self.name);
                existing.get().clone()
            }
            Entry::Vacant(slot) => slot.insert(value).value().clone(),
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Preload cache key: results are scoped per owner and viewer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreloadKey {
    pub url: String,
    pub owner: String,
    pub viewer: String,
}

impl PreloadKey {
    pub fn new(url: impl Into<String>, owner: impl Into<String>, viewer: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            owner: owner.into(),
            viewer: viewer.into(),
        }
    }
}

/// Named caches owned by one server instance.
#[derive(Debug)]
pub struct CacheRegistry {
    definitions: NamedCache<String, Arc<GadgetDefinition>>,
    preloads: NamedCache<PreloadKey, Value>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self {
            definitions: NamedCache::new(GADGET_SPEC_CACHE),
            preloads: NamedCache::new(PRELOAD_CACHE),
        }
    }

    /// Parsed gadget definitions keyed by manifest URI.
    pub const fn definitions(&self) -> &NamedCache<String, Arc<GadgetDefinition>> {
        &self.definitions
    }

    /// Preload results (`{id, rc, body}` objects).
    pub const fn preloads(&self) -> &NamedCache<PreloadKey, Value> {
        &self.preloads
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates gadget definitions and publishes them to the definition cache.
pub struct DefinitionFactory {
    caches: Arc<CacheRegistry>,
    fetcher: Arc<dyn HttpFetcher>,
    parser: GadgetParser,
    retries: u32,
}

impl DefinitionFactory {
    /// `retries` is the number of extra attempts after a transport failure
    /// of the manifest fetch.
    pub fn new(caches: Arc<CacheRegistry>, fetcher: Arc<dyn HttpFetcher>, retries: u32) -> Self {
        Self {
            caches,
            fetcher,
            parser: GadgetParser,
            retries,
        }
    }

    /// Parse `raw` and cache the result under `uri`.
    ///
    /// When `uri` is already cached, the cached definition is returned and
    /// the new parse is discarded.
    ///
    /// # Errors
    ///
    /// Propagates parse failures; nothing is cached for them.
    pub fn create(&self, uri: &str, raw: &str) -> Result<Arc<GadgetDefinition>> {
        let definition = Arc::new(self.parser.parse(raw, uri)?);
        Ok(self.caches.definitions().insert_if_absent(uri.to_string(), definition))
    }

    /// Cached definition for `uri`, without I/O.
    pub fn get(&self, uri: &str) -> Option<Arc<GadgetDefinition>> {
        self.caches.definitions().get(&uri.to_string())
    }

    /// Cached definition for `uri`, fetching and creating it on a miss.
    ///
    /// # Errors
    ///
    /// Fails when the manifest cannot be fetched within `deadline` (after
    /// retrying transport failures), is empty, or does not parse.
    pub async fn fetch(&self, uri: &str, deadline: &RequestDeadline) -> Result<Arc<GadgetDefinition>> {
        if let Some(definition) = self.get(uri) {
            debug!("Definition cache hit for {}", uri);
            return Ok(definition);
        }
        debug!("Definition cache miss for {}", uri);

        let raw = self.fetch_manifest(uri, deadline).await?;
        if raw.trim().is_empty() {
            return Err(GadgetError::NoContent {
                uri: uri.to_string(),
            }
            .into());
        }
        self.create(uri, &raw).with_context(|| format!("Failed to create gadget from {uri}"))
    }

    async fn fetch_manifest(&self, uri: &str, deadline: &RequestDeadline) -> Result<String> {
        let request = FetchRequest::get(uri);
        let mut attempt = 0;
        loop {
            match fetch_text(self.fetcher.as_ref(), deadline, &request, "gadget manifest fetch").await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.retries && is_transport_failure(&e) && !deadline.is_expired() => {
                    warn!("Manifest fetch of {} failed (attempt {}): {}", uri, attempt + 1, e);
                    attempt = exponential_backoff_with_delay(attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_transport_failure(error: &anyhow::Error) -> bool {
    matches!(find_gadget_error(error), Some(GadgetError::FetchFailed { .. }))
}
