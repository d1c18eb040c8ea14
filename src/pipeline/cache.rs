//! # Chain Cache
//!
//! Compute-once cache of built chains keyed by [`ChainKey`].
//!
//! Each key owns an `Arc<OnceCell>`; the map shard lock is only held long
//! enough to clone that `Arc`, then callers await the cell. Concurrent first
//! callers for the same key therefore share a single build, and callers for
//! different keys never wait on each other. Failures are cached as well: the
//! registry is frozen, so a rebuild would fail the same way.

use super::chain::{Chain, ChainKey};
use crate::error::ResolutionError;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

type CachedChain = Result<Arc<Chain>, ResolutionError>;

/// Chain cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainCacheStats {
    /// Keys with a cell, built or in flight
    pub entries: usize,
    /// Builds actually executed
    pub builds: u64,
    /// Lookups served by an already-built cell
    pub hits: u64,
    /// Keys currently cached, formatted
    pub cached_keys: Vec<String>,
}

/// Compute-once cache of chain build results.
#[derive(Debug, Default)]
pub struct ChainCache {
    cells: DashMap<ChainKey, Arc<OnceCell<CachedChain>>>,
    builds: AtomicU64,
    hits: AtomicU64,
}

impl ChainCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result for `key`, running `build` if no caller has yet.
    ///
    /// `build` runs at most once per key for the cache's lifetime.
    pub async fn get_or_build<F>(&self, key: ChainKey, build: F) -> CachedChain
    where
        F: FnOnce() -> CachedChain,
    {
        let cell = Arc::clone(self.cells.entry(key).or_default().value());

        if let Some(cached) = cell.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return cached.clone();
        }

        let result = cell
            .get_or_init(move || async move {
                self.builds.fetch_add(1, Ordering::Relaxed);
                debug!(chain = %key, "Building chain");
                build()
            })
            .await;
        result.clone()
    }

    /// Cached result for `key` without building.
    pub fn get(&self, key: ChainKey) -> Option<CachedChain> {
        self.cells
            .get(&key)
            .and_then(|cell| cell.value().get().cloned())
    }

    /// Number of keys with a cell.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cache statistics
    pub fn stats(&self) -> ChainCacheStats {
        let mut cached_keys: Vec<String> = self
            .cells
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().to_string())
            .collect();
        cached_keys.sort();

        ChainCacheStats {
            entries: self.cells.len(),
            builds: self.builds.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            cached_keys,
        }
    }
}
