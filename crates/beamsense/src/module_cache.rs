// module_cache.rs - Loaded-module cache per runtime target
//
// Enumerating the loaded modules of a runtime is expensive (a remote target
// means a probe VM plus an RPC round trip), so the result is cached per
// target for the lifetime of the owning `RuntimeServices`. There is no TTL:
// the owner calls `invalidate` when it learns the target reloaded code.
//
// Reads share a lock. A miss enumerates without holding the write lock, so
// concurrent misses for the same target may both enumerate; the last writer
// wins and readers only ever see a complete set.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::introspection::{IntrospectionProvider, RuntimeTarget};

pub type ModuleSet = Arc<HashSet<String>>;

/// Per-target cache of loaded module names.
#[derive(Default)]
pub struct LoadedModuleCache {
    entries: RwLock<HashMap<RuntimeTarget, ModuleSet>>,
}

impl LoadedModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loaded modules of `target`, enumerating through `provider` on a miss.
    ///
    /// A failed enumeration yields an empty set and is not cached, so the
    /// next call retries.
    pub async fn loaded_modules(
        &self,
        target: &RuntimeTarget,
        provider: &dyn IntrospectionProvider,
    ) -> ModuleSet {
        if let Some(cached) = self.get_cached(target).await {
            log::trace!("Loaded modules for '{}' found in cache", target);
            return cached;
        }

        log::trace!("Loaded modules for '{}' not cached, enumerating", target);
        match provider.list_loaded_modules(target).await {
            Ok(modules) => {
                let set: ModuleSet = Arc::new(modules.into_iter().collect());
                log::trace!("Cached {} loaded modules for '{}'", set.len(), target);
                self.entries
                    .write()
                    .await
                    .insert(target.clone(), set.clone());
                set
            }
            Err(e) => {
                log::trace!("Failed to enumerate loaded modules for '{}': {}", target, e);
                Arc::new(HashSet::new())
            }
        }
    }

    /// Cached set for `target`, without enumerating.
    pub async fn get_cached(&self, target: &RuntimeTarget) -> Option<ModuleSet> {
        self.entries.read().await.get(target).cloned()
    }

    /// Whether `target` currently has a cached entry.
    pub async fn is_cached(&self, target: &RuntimeTarget) -> bool {
        self.entries.read().await.contains_key(target)
    }

    /// Drop the entry for `target`. A no-op when nothing is cached.
    pub async fn invalidate(&self, target: &RuntimeTarget) {
        if self.entries.write().await.remove(target).is_some() {
            log::trace!("Invalidated loaded modules for '{}'", target);
        }
    }

    /// Drop every cached target.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
