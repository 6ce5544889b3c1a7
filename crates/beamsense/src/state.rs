//
// state.rs
//
// Services shared by every completion and signature-help request
//

use std::sync::Arc;

use crate::config::IntrospectionConfig;
use crate::docs::DocumentationSource;
use crate::erl_subprocess::ErlSubprocess;
use crate::introspection::{IntrospectionProvider, RuntimeTarget};
use crate::module_cache::{LoadedModuleCache, ModuleSet};

/// Runtime access plus the loaded-module cache.
///
/// The provider and documentation source are injected so the resolvers can
/// run against a fake runtime in tests. Share one instance (behind an `Arc`)
/// across concurrent requests.
pub struct RuntimeServices {
    provider: Arc<dyn IntrospectionProvider>,
    docs: Arc<dyn DocumentationSource>,
    modules: LoadedModuleCache,
}

impl RuntimeServices {
    pub fn new(
        provider: Arc<dyn IntrospectionProvider>,
        docs: Arc<dyn DocumentationSource>,
    ) -> Self {
        Self {
            provider,
            docs,
            modules: LoadedModuleCache::new(),
        }
    }

    /// Services backed by a probe VM for both introspection and docs.
    pub fn with_subprocess(erl: Arc<ErlSubprocess>) -> Self {
        Self::new(erl.clone(), erl)
    }

    pub fn from_config(config: &IntrospectionConfig) -> anyhow::Result<Self> {
        let erl = ErlSubprocess::from_config(config)?;
        Ok(Self::with_subprocess(Arc::new(erl)))
    }

    pub fn provider(&self) -> &dyn IntrospectionProvider {
        self.provider.as_ref()
    }

    pub fn docs(&self) -> &dyn DocumentationSource {
        self.docs.as_ref()
    }

    pub fn module_cache(&self) -> &LoadedModuleCache {
        &self.modules
    }

    /// Loaded modules of `target`, served from the cache when possible.
    pub async fn loaded_modules(&self, target: &RuntimeTarget) -> ModuleSet {
        self.modules
            .loaded_modules(target, self.provider.as_ref())
            .await
    }

    /// Forget what is known about `target` after its code was reloaded.
    ///
    /// Drops the loaded-module set and any documentation cached for the
    /// target. Safe to call when nothing is cached.
    pub async fn clear_loaded_modules(&self, target: &RuntimeTarget) {
        log::debug!("Clearing cached runtime state for '{}'", target);
        self.modules.invalidate(target).await;
        self.docs.forget_target(target);
    }
}
