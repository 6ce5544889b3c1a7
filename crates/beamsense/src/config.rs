//
// config.rs
//
// Configuration for runtime introspection
//

use std::path::PathBuf;
use std::time::Duration;

use crate::docs::DOC_CACHE_MAX_ENTRIES;

/// Default bound on a single runtime call, in milliseconds
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 5_000;

/// Settings for the probe VM and the caches it feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrospectionConfig {
    /// Path to the `erl` executable; discovered when unset
    pub erl_path: Option<PathBuf>,
    /// Distribution cookie for remote targets
    pub cookie: Option<String>,
    /// Use `-name` instead of `-sname` for the probe node
    pub long_names: bool,
    /// Bound on each runtime call
    pub call_timeout_ms: u64,
    /// Number of modules whose documentation is cached
    pub doc_cache_entries: usize,
}

impl Default for IntrospectionConfig {
    fn default() -> Self {
        Self {
            erl_path: None,
            cookie: None,
            long_names: false,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            doc_cache_entries: DOC_CACHE_MAX_ENTRIES,
        }
    }
}

impl IntrospectionConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Read the `introspection` object of editor settings.
///
/// Returns `None` when the object is absent. Unknown keys are ignored and
/// invalid values keep their defaults.
///
/// ```
/// let settings = serde_json::json!({
///     "introspection": { "erlPath": "/opt/otp/bin/erl", "callTimeoutMs": 2000 }
/// });
/// let cfg = beamsense::config::parse_config(&settings).unwrap();
/// assert_eq!(cfg.call_timeout_ms, 2000);
/// ```
pub fn parse_config(settings: &serde_json::Value) -> Option<IntrospectionConfig> {
    let section = settings.get("introspection")?;
    let mut config = IntrospectionConfig::default();

    if let Some(v) = section.get("erlPath").and_then(|v| v.as_str()) {
        if !v.is_empty() && !v.contains('\0') {
            config.erl_path = Some(PathBuf::from(v));
        }
    }
    if let Some(v) = section.get("cookie").and_then(|v| v.as_str()) {
        if !v.is_empty() {
            config.cookie = Some(v.to_string());
        }
    }
    if let Some(v) = section.get("longNames").and_then(|v| v.as_bool()) {
        config.long_names = v;
    }
    if let Some(v) = section.get("callTimeoutMs").and_then(|v| v.as_u64()) {
        if v > 0 {
            config.call_timeout_ms = v;
        }
    }
    if let Some(v) = section.get("docCacheEntries").and_then(|v| v.as_u64()) {
        if v > 0 {
            config.doc_cache_entries = v as usize;
        }
    }

    log::info!("Introspection configuration loaded from settings:");
    log::info!("  erl_path: {:?}", config.erl_path);
    log::info!("  long_names: {}", config.long_names);
    log::info!("  call_timeout_ms: {}", config.call_timeout_ms);
    log::info!("  doc_cache_entries: {}", config.doc_cache_entries);

    Some(config)
}
