//
// introspection.rs
//
// Runtime reflection seam. The resolvers never talk to a VM directly; they go
// through an `IntrospectionProvider`, which `ErlSubprocess` implements against
// a real runtime and tests implement with fixed tables.
//

use std::fmt;

use async_trait::async_trait;

use crate::error::CallError;

/// Which runtime to introspect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuntimeTarget {
    /// The local installation. Queries must not load modules as a side effect.
    Local,
    /// A named distributed node, e.g. `app@host`.
    Remote(String),
}

impl RuntimeTarget {
    pub fn is_remote(&self) -> bool {
        matches!(self, RuntimeTarget::Remote(_))
    }
}

impl fmt::Display for RuntimeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeTarget::Local => f.write_str("local"),
            RuntimeTarget::Remote(node) => f.write_str(node),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallableKind {
    Function,
    Macro,
}

/// One exported callable of a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExportEntry {
    pub name: String,
    pub arity: u32,
    pub kind: CallableKind,
}

impl ExportEntry {
    pub fn function(name: impl Into<String>, arity: u32) -> Self {
        Self {
            name: name.into(),
            arity,
            kind: CallableKind::Function,
        }
    }

    pub fn macro_(name: impl Into<String>, arity: u32) -> Self {
        Self {
            name: name.into(),
            arity,
            kind: CallableKind::Macro,
        }
    }

    /// Bookkeeping accessors every module carries. Never completion candidates.
    pub fn is_reflective(&self) -> bool {
        matches!(
            (self.name.as_str(), self.arity),
            ("module_info", 0) | ("module_info", 1) | ("__info__", 1)
        )
    }
}

/// One exported or opaque type of a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeEntry {
    pub name: String,
    pub arity: u32,
}

impl TypeEntry {
    pub fn new(name: impl Into<String>, arity: u32) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }
}

/// Reflection capability of a runtime.
///
/// Each method is a single call against `target`; callers decide how a
/// failure degrades the result.
#[async_trait]
pub trait IntrospectionProvider: Send + Sync {
    /// Modules currently loaded in the runtime.
    async fn list_loaded_modules(&self, target: &RuntimeTarget) -> Result<Vec<String>, CallError>;

    /// Whether `module` is loaded or loadable, without loading it.
    async fn module_available(
        &self,
        target: &RuntimeTarget,
        module: &str,
    ) -> Result<bool, CallError>;

    /// Exported functions and macros of `module`, reflective entries included.
    async fn list_exports(
        &self,
        target: &RuntimeTarget,
        module: &str,
    ) -> Result<Vec<ExportEntry>, CallError>;

    /// Exported and opaque types of `module`.
    async fn list_types(
        &self,
        target: &RuntimeTarget,
        module: &str,
    ) -> Result<Vec<TypeEntry>, CallError>;
}
