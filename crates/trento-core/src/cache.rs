// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Single-flight memoization for one gather call.
//!
//! Several gatherers often need the output of the same expensive command
//! (`sysctl -a`, `crm_mon`, ...). The first caller for a key runs the update;
//! concurrent callers for the same key wait on the cache mutex and then read
//! the recorded result, error included. Entries are never evicted: a cache
//! lives exactly as long as the request that created it.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The update for this key failed; every caller sees the same error.
    #[error("{0}")]
    Update(Arc<anyhow::Error>),

    #[error("cache entry '{key}' does not hold a {expected}")]
    TypeMismatch { key: String, expected: &'static str },
}

type Entry = Result<Arc<dyn Any + Send + Sync>, CacheError>;

#[derive(Default)]
pub struct FactsCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl FactsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the recorded result for `key`, running `update` first if the
    /// key has never been seen.
    ///
    /// The lock is held across the update so a key is computed at most once.
    pub async fn get_or_update<T, F, Fut>(&self, key: &str, update: F) -> Result<T, CacheError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(key) {
            debug!(key, "cache hit");
            return downcast(key, entry);
        }

        debug!(key, "cache miss, updating");
        let entry: Entry = match update().await {
            Ok(value) => Ok(Arc::new(value)),
            Err(e) => Err(CacheError::Update(Arc::new(e))),
        };
        let result = downcast(key, &entry);
        entries.insert(key.to_string(), entry);
        result
    }

    /// Sorted snapshot of the keys computed so far.
    pub async fn entries(&self) -> Vec<String> {
        let entries = self.entries.lock().await;
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Like [`FactsCache::get_or_update`], but runs `update` unconditionally and
/// records nothing when no cache is available.
pub async fn get_or_update<T, F, Fut>(
    cache: Option<&FactsCache>,
    key: &str,
    update: F,
) -> Result<T, CacheError>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    match cache {
        Some(cache) => cache.get_or_update(key, update).await,
        None => update()
            .await
            .map_err(|e| CacheError::Update(Arc::new(e))),
    }
}

fn downcast<T: Clone + 'static>(key: &str, entry: &Entry) -> Result<T, CacheError> {
    match entry {
        Ok(value) => value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| CacheError::TypeMismatch {
                key: key.to_string(),
                expected: std::any::type_name::<T>(),
            }),
        Err(e) => Err(e.clone()),
    }
}
