//
// docs.rs
//
// Documentation records and the lookup seam used to enrich completion and
// signature results. Module documentation is fetched whole from a runtime and
// kept in a bounded LRU so repeated keystrokes in the same module are free.
//

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use lru::LruCache;

use crate::error::CallError;
use crate::introspection::{CallableKind, RuntimeTarget};

/// Default number of modules whose documentation is kept in memory.
pub const DOC_CACHE_MAX_ENTRIES: usize = 256;

/// Kind of module member a documentation entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Function,
    Macro,
    Type,
}

impl From<CallableKind> for MemberKind {
    fn from(kind: CallableKind) -> Self {
        match kind {
            CallableKind::Function => MemberKind::Function,
            CallableKind::Macro => MemberKind::Macro,
        }
    }
}

/// Documentation attached to one (name, arity) member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentationRecord {
    /// Summary text, if the member is documented
    pub docs: Option<String>,
    /// Human-readable call signatures, e.g. `map(Fun, List1)`
    pub signatures: Vec<String>,
    /// Spec or type definition source
    pub specs: Vec<String>,
    /// Extra metadata such as `deprecated` or `since`
    pub metadata: BTreeMap<String, String>,
    /// Set when the member exists but no documentation entry matched it
    pub from_default: bool,
}

impl DocumentationRecord {
    /// Record for a member that was found but has no documentation entry.
    pub fn fallback() -> Self {
        Self {
            from_default: true,
            ..Self::default()
        }
    }

    pub fn is_deprecated(&self) -> bool {
        self.metadata.contains_key("deprecated")
    }

    /// Parameter names for a member of `arity`.
    ///
    /// Taken from the first documented signature whose parameter count
    /// matches, otherwise `Arg1` to `ArgN`.
    pub fn parameter_names(&self, arity: u32) -> Vec<String> {
        self.signatures
            .iter()
            .filter_map(|sig| split_parameters(sig))
            .find(|params| params.len() == arity as usize)
            .unwrap_or_else(|| (1..=arity).map(|i| format!("Arg{i}")).collect())
    }
}

/// Top-level parameters of `name(A, {B, C}, D) -> Result`.
fn split_parameters(signature: &str) -> Option<Vec<String>> {
    let open = signature.find('(')?;
    let mut depth = 0usize;
    let mut params = Vec::new();
    let mut current = String::new();

    for c in signature[open + 1..].chars() {
        match c {
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' if depth == 0 => {
                let last = current.trim();
                if !last.is_empty() || !params.is_empty() {
                    params.push(last.to_string());
                }
                return Some(params);
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                params.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    None
}

/// A documentation record keyed by member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentedMember {
    pub kind: MemberKind,
    pub name: String,
    pub arity: u32,
    pub record: DocumentationRecord,
}

/// External documentation store.
#[async_trait]
pub trait DocumentationSource: Send + Sync {
    /// Look up records for `members` of `module` restricted to `kinds`.
    ///
    /// An empty `members` slice yields an empty result. Members without an
    /// entry are omitted rather than reported as errors.
    async fn lookup_members(
        &self,
        target: &RuntimeTarget,
        module: &str,
        members: &[(String, u32)],
        kinds: &[MemberKind],
    ) -> Result<Vec<DocumentedMember>, CallError>;

    /// Forget anything cached for `target`, e.g. after a code reload.
    fn forget_target(&self, _target: &RuntimeTarget) {}
}

/// Keep the entries of a module's documentation table that match both the
/// requested members and kinds.
pub fn select_members(
    table: &[DocumentedMember],
    members: &[(String, u32)],
    kinds: &[MemberKind],
) -> Vec<DocumentedMember> {
    if members.is_empty() {
        return Vec::new();
    }
    table
        .iter()
        .filter(|entry| kinds.contains(&entry.kind))
        .filter(|entry| {
            members
                .iter()
                .any(|(name, arity)| *name == entry.name && *arity == entry.arity)
        })
        .cloned()
        .collect()
}

type ModuleKey = (RuntimeTarget, String);

/// Bounded cache of per-module documentation tables.
///
/// Uses `peek()` for reads (no LRU promotion, works under read lock) and
/// `push()` for writes.
pub struct DocCache {
    inner: RwLock<LruCache<ModuleKey, Arc<Vec<DocumentedMember>>>>,
}

impl DocCache {
    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries)
            .or(NonZeroUsize::new(DOC_CACHE_MAX_ENTRIES))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: RwLock::new(LruCache::new(cap)),
        }
    }

    pub fn get(&self, target: &RuntimeTarget, module: &str) -> Option<Arc<Vec<DocumentedMember>>> {
        let key = (target.clone(), module.to_string());
        self.inner.read().ok()?.peek(&key).cloned()
    }

    pub fn insert(&self, target: &RuntimeTarget, module: &str, table: Arc<Vec<DocumentedMember>>) {
        if let Ok(mut guard) = self.inner.write() {
            guard.push((target.clone(), module.to_string()), table);
        }
    }

    /// Drop every module cached for `target`.
    pub fn invalidate_target(&self, target: &RuntimeTarget) {
        if let Ok(mut guard) = self.inner.write() {
            let stale: Vec<ModuleKey> = guard
                .iter()
                .filter(|((t, _), _)| t == target)
                .map(|(k, _)| k.clone())
                .collect();
            for key in stale {
                guard.pop(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DocCache {
    fn default() -> Self {
        Self::new(DOC_CACHE_MAX_ENTRIES)
    }
}
