//
// identifier.rs
//
// Resolution of `module:prefix` into exported functions, macros and types,
// each joined with its documentation record.
//

use std::collections::HashMap;

use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionItemTag, Documentation, InsertTextFormat,
    MarkupContent, MarkupKind,
};

use crate::docs::{DocumentationRecord, MemberKind};
use crate::introspection::{ExportEntry, RuntimeTarget, TypeEntry};
use crate::state::RuntimeServices;

/// A module member offered as a completion candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberMatch {
    pub module: String,
    pub name: String,
    pub arity: u32,
    pub kind: MemberKind,
    /// `name/arity`
    pub display_name: String,
    pub record: DocumentationRecord,
}

impl MemberMatch {
    fn new(
        module: &str,
        name: String,
        arity: u32,
        kind: MemberKind,
        record: DocumentationRecord,
    ) -> Self {
        Self {
            module: module.to_string(),
            display_name: format!("{}/{}", name, arity),
            name,
            arity,
            kind,
            record,
        }
    }

    /// Snippet with one tab stop per parameter.
    fn snippet(&self) -> String {
        let params: Vec<String> = self
            .record
            .parameter_names(self.arity)
            .iter()
            .enumerate()
            .map(|(i, p)| format!("${{{}:{}}}", i + 1, escape_snippet(p)))
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }

    /// One-line summary for the completion detail.
    fn detail(&self) -> String {
        self.record
            .specs
            .first()
            .or(self.record.signatures.first())
            .map(|s| s.lines().next().unwrap_or_default().to_string())
            .unwrap_or_else(|| format!("{}:{}", self.module, self.display_name))
    }
}

/// Completion candidate kinds. The resolver only produces `Function` and
/// `Type`; the rest describe candidates other completion sources emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierMatch {
    Module { name: String },
    /// Exported function or macro
    Function(MemberMatch),
    Type(MemberMatch),
    Variable { name: String },
    MapField { name: String },
    ModuleAttribute { name: String },
    BitstringModifier { name: String, arity: u32 },
}

impl IdentifierMatch {
    pub fn label(&self) -> String {
        match self {
            IdentifierMatch::Function(m) | IdentifierMatch::Type(m) => m.display_name.clone(),
            IdentifierMatch::Module { name }
            | IdentifierMatch::Variable { name }
            | IdentifierMatch::MapField { name }
            | IdentifierMatch::ModuleAttribute { name } => name.clone(),
            IdentifierMatch::BitstringModifier { name, arity } => {
                if *arity == 0 {
                    name.clone()
                } else {
                    format!("{}:{}", name, arity)
                }
            }
        }
    }

    /// Text to insert; a snippet for functions and types.
    pub fn insert_text(&self) -> String {
        match self {
            IdentifierMatch::Function(m) | IdentifierMatch::Type(m) => m.snippet(),
            IdentifierMatch::BitstringModifier { name, arity } if *arity > 0 => {
                format!("{}:${{1:Size}}", name)
            }
            IdentifierMatch::ModuleAttribute { name } => format!("-{}", name),
            other => other.label(),
        }
    }

    fn is_snippet(&self) -> bool {
        matches!(
            self,
            IdentifierMatch::Function(_)
                | IdentifierMatch::Type(_)
                | IdentifierMatch::BitstringModifier { .. }
        )
    }

    pub fn to_completion_item(&self) -> CompletionItem {
        let kind = match self {
            IdentifierMatch::Module { .. } => CompletionItemKind::MODULE,
            IdentifierMatch::Function(_) => CompletionItemKind::FUNCTION,
            IdentifierMatch::Type(_) => CompletionItemKind::TYPE_PARAMETER,
            IdentifierMatch::Variable { .. } => CompletionItemKind::VARIABLE,
            IdentifierMatch::MapField { .. } => CompletionItemKind::FIELD,
            IdentifierMatch::ModuleAttribute { .. } => CompletionItemKind::KEYWORD,
            IdentifierMatch::BitstringModifier { .. } => CompletionItemKind::TYPE_PARAMETER,
        };

        let mut item = CompletionItem {
            label: self.label(),
            kind: Some(kind),
            insert_text: Some(self.insert_text()),
            insert_text_format: Some(if self.is_snippet() {
                InsertTextFormat::SNIPPET
            } else {
                InsertTextFormat::PLAIN_TEXT
            }),
            ..Default::default()
        };

        if let IdentifierMatch::Function(m) | IdentifierMatch::Type(m) = self {
            item.filter_text = Some(m.name.clone());
            item.detail = Some(m.detail());
            item.documentation = m.record.docs.as_ref().map(|docs| {
                Documentation::MarkupContent(MarkupContent {
                    kind: MarkupKind::Markdown,
                    value: docs.clone(),
                })
            });
            if m.record.is_deprecated() {
                item.tags = Some(vec![CompletionItemTag::DEPRECATED]);
            }
        }

        item
    }
}

fn escape_snippet(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('$', "\\$")
        .replace('}', "\\}")
}

// ----------------------------------------------------------------------------
// Resolution
// ----------------------------------------------------------------------------

/// Members of `module` on `target` whose names start with `prefix`.
///
/// Functions and macros come first, then types. Never fails: a missing
/// module yields nothing, and failed export, type or doc queries degrade
/// to fewer or undocumented results.
pub async fn resolve_qualified(
    services: &RuntimeServices,
    module: &str,
    prefix: &str,
    target: &RuntimeTarget,
) -> Vec<IdentifierMatch> {
    let _guard = crate::perf::TimingGuard::with_threshold("resolve_qualified", 500);

    if !module_is_known(services, module, target).await {
        log::trace!("Module '{}' not available on '{}'", module, target);
        return Vec::new();
    }

    let callables: Vec<ExportEntry> = list_callables(services, module, target)
        .await
        .into_iter()
        .filter(|e| e.name.starts_with(prefix))
        .collect();

    let types: Vec<TypeEntry> = match services.provider().list_types(target, module).await {
        Ok(types) => types,
        Err(e) => {
            log::trace!("No types for '{}' on '{}': {}", module, target, e);
            Vec::new()
        }
    }
    .into_iter()
    .filter(|t| t.name.starts_with(prefix))
    .collect();

    let mut matches = Vec::with_capacity(callables.len() + types.len());

    let keys: Vec<(String, u32)> = callables.iter().map(|e| (e.name.clone(), e.arity)).collect();
    let docs = lookup_records(
        services,
        target,
        module,
        &keys,
        &[MemberKind::Function, MemberKind::Macro],
    )
    .await;
    for entry in callables {
        let kind = MemberKind::from(entry.kind);
        let record = record_for(&docs, kind, &entry.name, entry.arity);
        matches.push(IdentifierMatch::Function(MemberMatch::new(
            module, entry.name, entry.arity, kind, record,
        )));
    }

    let keys: Vec<(String, u32)> = types.iter().map(|t| (t.name.clone(), t.arity)).collect();
    let docs = lookup_records(services, target, module, &keys, &[MemberKind::Type]).await;
    for entry in types {
        let record = record_for(&docs, MemberKind::Type, &entry.name, entry.arity);
        matches.push(IdentifierMatch::Type(MemberMatch::new(
            module,
            entry.name,
            entry.arity,
            MemberKind::Type,
            record,
        )));
    }

    log::debug!(
        "Resolved {}:{} on '{}' to {} candidate(s)",
        module,
        prefix,
        target,
        matches.len()
    );
    matches
}

/// Remote modules must be loaded; local modules must exist on the code
/// path. Neither check loads anything.
async fn module_is_known(services: &RuntimeServices, module: &str, target: &RuntimeTarget) -> bool {
    match target {
        RuntimeTarget::Remote(_) => services.loaded_modules(target).await.contains(module),
        RuntimeTarget::Local => match services.provider().module_available(target, module).await {
            Ok(available) => available,
            Err(e) => {
                log::trace!("Availability check for '{}' failed: {}", module, e);
                false
            }
        },
    }
}

/// Exported callables of `module` without the reflective accessors.
pub(crate) async fn list_callables(
    services: &RuntimeServices,
    module: &str,
    target: &RuntimeTarget,
) -> Vec<ExportEntry> {
    match services.provider().list_exports(target, module).await {
        Ok(exports) => exports.into_iter().filter(|e| !e.is_reflective()).collect(),
        Err(e) => {
            log::trace!("No exports for '{}' on '{}': {}", module, target, e);
            Vec::new()
        }
    }
}

pub(crate) type RecordTable = HashMap<(MemberKind, String, u32), DocumentationRecord>;

/// Bulk documentation lookup. Failure leaves the table empty so every
/// member falls back to an undocumented record.
pub(crate) async fn lookup_records(
    services: &RuntimeServices,
    target: &RuntimeTarget,
    module: &str,
    members: &[(String, u32)],
    kinds: &[MemberKind],
) -> RecordTable {
    if members.is_empty() {
        return RecordTable::new();
    }
    match services
        .docs()
        .lookup_members(target, module, members, kinds)
        .await
    {
        Ok(found) => found
            .into_iter()
            .map(|m| ((m.kind, m.name, m.arity), m.record))
            .collect(),
        Err(e) => {
            log::trace!("Doc lookup for '{}' on '{}' failed: {}", module, target, e);
            RecordTable::new()
        }
    }
}

pub(crate) fn record_for(
    table: &RecordTable,
    kind: MemberKind,
    name: &str,
    arity: u32,
) -> DocumentationRecord {
    table
        .get(&(kind, name.to_string(), arity))
        .cloned()
        .unwrap_or_else(DocumentationRecord::fallback)
}
