//! Compiled-template cache keyed by (template, version).
//!
//! Concurrent requests for the same key share one compilation through a
//! per-entry `OnceCell`. Entries expire after the TTL and the least recently
//! used entry is evicted once the cache is full. A failed compilation leaves
//! no entry behind.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;

use crate::types::DbId;

use super::{CompiledTemplate, TemplateCacheConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub template_id: DbId,
    pub version_id: DbId,
}

impl CacheKey {
    pub fn new(template_id: DbId, version_id: DbId) -> Self {
        Self {
            template_id,
            version_id,
        }
    }
}

struct Entry {
    cell: Arc<OnceCell<Arc<CompiledTemplate>>>,
    inserted: Instant,
    last_used: Instant,
}

pub struct TemplateCache {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    max_entries: usize,
    ttl: Duration,
}

impl TemplateCache {
    pub fn new(config: &TemplateCacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: config.max_entries.max(1),
            ttl: config.ttl,
        }
    }

    /// Return the cached template for `key`, compiling it with `compile` on
    /// a miss. The boolean is `true` on a cache hit.
    pub async fn get_or_compile<F, Fut, E>(
        &self,
        key: CacheKey,
        compile: F,
    ) -> Result<(Arc<CompiledTemplate>, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CompiledTemplate, E>>,
    {
        let cell = self.slot(key).await;

        let mut compiled_here = false;
        let result = cell
            .get_or_try_init(|| async {
                compiled_here = true;
                compile().await.map(Arc::new)
            })
            .await
            .map(Arc::clone);

        match result {
            Ok(template) => {
                if compiled_here {
                    tracing::debug!(
                        template_id = key.template_id,
                        version_id = key.version_id,
                        "Template compiled and cached"
                    );
                }
                Ok((template, !compiled_here))
            }
            Err(e) => {
                let mut entries = self.entries.lock().await;
                if entries
                    .get(&key)
                    .is_some_and(|entry| Arc::ptr_eq(&entry.cell, &cell) && !cell.initialized())
                {
                    entries.remove(&key);
                }
                Err(e)
            }
        }
    }

    async fn slot(&self, key: CacheKey) -> Arc<OnceCell<Arc<CompiledTemplate>>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, entry| now.duration_since(entry.inserted) < self.ttl);

        if let Some(entry) = entries.get_mut(&key) {
            entry.last_used = now;
            return Arc::clone(&entry.cell);
        }

        if entries.len() >= self.max_entries {
            if let Some(lru) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| *k)
            {
                entries.remove(&lru);
                tracing::debug!(
                    template_id = lru.template_id,
                    version_id = lru.version_id,
                    "Template cache entry evicted"
                );
            }
        }

        let cell = Arc::new(OnceCell::new());
        entries.insert(
            key,
            Entry {
                cell: Arc::clone(&cell),
                inserted: now,
                last_used: now,
            },
        );
        cell
    }

    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.lock().await.remove(key).is_some()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
