// test_utils.rs - In-memory runtime for tests
//
// `FakeRuntime` serves fixed module tables per target and counts every call,
// so tests can observe cache hits and make sure nothing is queried that
// should not be.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::docs::{select_members, DocumentationSource, DocumentedMember, MemberKind};
use crate::error::CallError;
use crate::introspection::{ExportEntry, IntrospectionProvider, RuntimeTarget, TypeEntry};

#[derive(Default, Clone)]
struct ModuleTables {
    exports: Vec<ExportEntry>,
    /// `None` means the module cannot be introspected for types
    types: Option<Vec<TypeEntry>>,
    docs: Vec<DocumentedMember>,
}

#[derive(Default)]
struct TargetTables {
    loaded: Vec<String>,
    modules: HashMap<String, ModuleTables>,
    unreachable: bool,
}

#[derive(Default)]
pub struct FakeRuntime {
    targets: Mutex<HashMap<RuntimeTarget, TargetTables>>,
    docs_fail: bool,
    loaded_calls: AtomicUsize,
    available_calls: AtomicUsize,
    export_calls: AtomicUsize,
    type_calls: AtomicUsize,
    doc_calls: AtomicUsize,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn edit(&self, target: &RuntimeTarget, f: impl FnOnce(&mut TargetTables)) {
        let mut targets = self.targets.lock().unwrap();
        f(targets.entry(target.clone()).or_default());
    }

    /// Modules reported by `list_loaded_modules` for `target`.
    pub fn with_loaded(self, target: &RuntimeTarget, modules: &[&str]) -> Self {
        self.set_loaded(target, modules);
        self
    }

    pub fn set_loaded(&self, target: &RuntimeTarget, modules: &[&str]) {
        self.edit(target, |t| {
            t.loaded = modules.iter().map(|m| m.to_string()).collect();
        });
    }

    /// A module that exists on `target` with the given exports and types.
    pub fn with_module(
        self,
        target: &RuntimeTarget,
        module: &str,
        exports: Vec<ExportEntry>,
        types: Vec<TypeEntry>,
    ) -> Self {
        self.edit(target, |t| {
            let tables = t.modules.entry(module.to_string()).or_default();
            tables.exports = exports;
            tables.types = Some(types);
        });
        self
    }

    /// Make type introspection of `module` fail on `target`.
    pub fn with_untyped(self, target: &RuntimeTarget, module: &str) -> Self {
        self.edit(target, |t| {
            t.modules.entry(module.to_string()).or_default().types = None;
        });
        self
    }

    pub fn with_docs(
        self,
        target: &RuntimeTarget,
        module: &str,
        docs: Vec<DocumentedMember>,
    ) -> Self {
        self.edit(target, |t| {
            t.modules.entry(module.to_string()).or_default().docs = docs;
        });
        self
    }

    /// Every call against `target` fails.
    pub fn unreachable(self, target: &RuntimeTarget) -> Self {
        self.edit(target, |t| t.unreachable = true);
        self
    }

    /// Every documentation lookup fails.
    pub fn failing_docs(mut self) -> Self {
        self.docs_fail = true;
        self
    }

    pub fn loaded_calls(&self) -> usize {
        self.loaded_calls.load(Ordering::SeqCst)
    }

    pub fn available_calls(&self) -> usize {
        self.available_calls.load(Ordering::SeqCst)
    }

    pub fn export_calls(&self) -> usize {
        self.export_calls.load(Ordering::SeqCst)
    }

    pub fn type_calls(&self) -> usize {
        self.type_calls.load(Ordering::SeqCst)
    }

    pub fn doc_calls(&self) -> usize {
        self.doc_calls.load(Ordering::SeqCst)
    }

    fn with_target<T>(
        &self,
        target: &RuntimeTarget,
        f: impl FnOnce(&TargetTables) -> Result<T, CallError>,
    ) -> Result<T, CallError> {
        let targets = self.targets.lock().unwrap();
        match targets.get(target) {
            Some(tables) if tables.unreachable => {
                Err(CallError::Failed(format!("{{badrpc,nodedown}} for {target}")))
            }
            Some(tables) => f(tables),
            None => Err(CallError::Failed(format!("unknown target {target}"))),
        }
    }

    fn with_module_tables<T>(
        &self,
        target: &RuntimeTarget,
        module: &str,
        f: impl FnOnce(&ModuleTables) -> Result<T, CallError>,
    ) -> Result<T, CallError> {
        self.with_target(target, |t| match t.modules.get(module) {
            Some(tables) => f(tables),
            None => Err(CallError::Failed(format!("undef module {module}"))),
        })
    }
}

#[async_trait]
impl IntrospectionProvider for FakeRuntime {
    async fn list_loaded_modules(&self, target: &RuntimeTarget) -> Result<Vec<String>, CallError> {
        self.loaded_calls.fetch_add(1, Ordering::SeqCst);
        // Yield so concurrent misses actually interleave
        tokio::task::yield_now().await;
        self.with_target(target, |t| Ok(t.loaded.clone()))
    }

    async fn module_available(
        &self,
        target: &RuntimeTarget,
        module: &str,
    ) -> Result<bool, CallError> {
        self.available_calls.fetch_add(1, Ordering::SeqCst);
        self.with_target(target, |t| Ok(t.modules.contains_key(module)))
    }

    async fn list_exports(
        &self,
        target: &RuntimeTarget,
        module: &str,
    ) -> Result<Vec<ExportEntry>, CallError> {
        self.export_calls.fetch_add(1, Ordering::SeqCst);
        self.with_module_tables(target, module, |m| Ok(m.exports.clone()))
    }

    async fn list_types(
        &self,
        target: &RuntimeTarget,
        module: &str,
    ) -> Result<Vec<TypeEntry>, CallError> {
        self.type_calls.fetch_add(1, Ordering::SeqCst);
        self.with_module_tables(target, module, |m| {
            m.types
                .clone()
                .ok_or_else(|| CallError::Failed(format!("no type info for {module}")))
        })
    }
}

#[async_trait]
impl DocumentationSource for FakeRuntime {
    async fn lookup_members(
        &self,
        target: &RuntimeTarget,
        module: &str,
        members: &[(String, u32)],
        kinds: &[MemberKind],
    ) -> Result<Vec<DocumentedMember>, CallError> {
        self.doc_calls.fetch_add(1, Ordering::SeqCst);
        if self.docs_fail {
            return Err(CallError::Failed("doc store unavailable".into()));
        }
        self.with_target(target, |t| {
            Ok(t.modules
                .get(module)
                .map(|m| select_members(&m.docs, members, kinds))
                .unwrap_or_default())
        })
    }
}

/// A documented member with a single signature and spec.
pub fn documented(kind: MemberKind, name: &str, arity: u32, docs: &str) -> DocumentedMember {
    let args: Vec<String> = (1..=arity).map(|i| format!("Arg{i}")).collect();
    let types = vec!["term()"; arity as usize].join(", ");
    DocumentedMember {
        kind,
        name: name.to_string(),
        arity,
        record: crate::docs::DocumentationRecord {
            docs: Some(docs.to_string()),
            signatures: vec![format!("{}({})", name, args.join(", "))],
            specs: vec![format!("-spec {}({}) -> term().", name, types)],
            metadata: Default::default(),
            from_default: false,
        },
    }
}
