//! End-to-end completion and signature-help flows against an in-memory
//! runtime that implements the public introspection traits.
//!
//! Run with: `cargo test -p beamsense --test completion_flow`

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use beamsense::docs::{
    select_members, DocumentationRecord, DocumentationSource, DocumentedMember, MemberKind,
};
use beamsense::error::CallError;
use beamsense::handlers::{complete, completion_items, signature_help};
use beamsense::identifier::IdentifierMatch;
use beamsense::introspection::{ExportEntry, IntrospectionProvider, RuntimeTarget, TypeEntry};
use beamsense::state::RuntimeServices;
use tower_lsp::lsp_types::InsertTextFormat;

// ============================================================================
// Test runtime
// ============================================================================

/// A node with a hot-reloadable set of loaded modules.
#[derive(Default)]
struct Node {
    loaded: Mutex<Vec<String>>,
    exports: HashMap<String, Vec<ExportEntry>>,
    types: HashMap<String, Vec<TypeEntry>>,
    docs: HashMap<String, Vec<DocumentedMember>>,
    enumerations: AtomicUsize,
    forgotten: AtomicUsize,
}

impl Node {
    fn app() -> Self {
        let mut node = Node::default();
        *node.loaded.lock().unwrap() = vec!["lists".into(), "calc".into()];
        node.exports.insert(
            "lists".into(),
            vec![
                ExportEntry::function("map", 2),
                ExportEntry::function("max", 1),
                ExportEntry::function("foldl", 3),
                ExportEntry::function("module_info", 0),
                ExportEntry::function("module_info", 1),
            ],
        );
        node.exports.insert(
            "calc".into(),
            vec![
                ExportEntry::function("add", 2),
                ExportEntry::function("add", 3),
                ExportEntry::function("module_info", 0),
            ],
        );
        node.exports
            .insert("hot".into(), vec![ExportEntry::function("reload", 0)]);
        node.types
            .insert("lists".into(), vec![TypeEntry::new("max_size", 0)]);
        node.docs.insert(
            "lists".into(),
            vec![DocumentedMember {
                kind: MemberKind::Function,
                name: "map".into(),
                arity: 2,
                record: DocumentationRecord {
                    docs: Some("Applies `Fun` to every element.".into()),
                    signatures: vec!["map(Fun, List1) -> List2".into()],
                    specs: vec!["-spec map(Fun, List1) -> List2 when Fun :: fun((A) -> B).".into()],
                    ..Default::default()
                },
            }],
        );
        node.docs.insert(
            "calc".into(),
            vec![DocumentedMember {
                kind: MemberKind::Function,
                name: "add".into(),
                arity: 2,
                record: DocumentationRecord {
                    docs: Some("Adds two numbers.".into()),
                    signatures: vec!["add(A, B)".into()],
                    ..Default::default()
                },
            }],
        );
        node
    }

    fn reload(&self, module: &str) {
        self.loaded.lock().unwrap().push(module.to_string());
    }
}

fn unknown(module: &str) -> CallError {
    CallError::Failed(format!("undef {module}"))
}

#[async_trait]
impl IntrospectionProvider for Node {
    async fn list_loaded_modules(&self, _target: &RuntimeTarget) -> Result<Vec<String>, CallError> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        Ok(self.loaded.lock().unwrap().clone())
    }

    async fn module_available(
        &self,
        _target: &RuntimeTarget,
        module: &str,
    ) -> Result<bool, CallError> {
        Ok(self.exports.contains_key(module))
    }

    async fn list_exports(
        &self,
        _target: &RuntimeTarget,
        module: &str,
    ) -> Result<Vec<ExportEntry>, CallError> {
        self.exports.get(module).cloned().ok_or_else(|| unknown(module))
    }

    async fn list_types(
        &self,
        _target: &RuntimeTarget,
        module: &str,
    ) -> Result<Vec<TypeEntry>, CallError> {
        self.types.get(module).cloned().ok_or_else(|| unknown(module))
    }
}

#[async_trait]
impl DocumentationSource for Node {
    async fn lookup_members(
        &self,
        _target: &RuntimeTarget,
        module: &str,
        members: &[(String, u32)],
        kinds: &[MemberKind],
    ) -> Result<Vec<DocumentedMember>, CallError> {
        Ok(self
            .docs
            .get(module)
            .map(|table| select_members(table, members, kinds))
            .unwrap_or_default())
    }

    fn forget_target(&self, _target: &RuntimeTarget) {
        self.forgotten.fetch_add(1, Ordering::SeqCst);
    }
}

fn setup() -> (Arc<Node>, RuntimeServices, RuntimeTarget) {
    let node = Arc::new(Node::app());
    let services = RuntimeServices::new(node.clone(), node.clone());
    (node, services, RuntimeTarget::Remote("app@localhost".into()))
}

fn labels(matches: &[IdentifierMatch]) -> Vec<String> {
    matches.iter().map(IdentifierMatch::label).collect()
}

// ============================================================================
// Completion
// ============================================================================

#[tokio::test]
async fn test_typing_progressively_narrows_candidates() {
    let (node, services, target) = setup();

    let all = complete(&services, "Result = lists:", &target).await;
    assert_eq!(labels(&all), vec!["map/2", "max/1", "foldl/3", "max_size/0"]);

    let ma = complete(&services, "Result = lists:ma", &target).await;
    assert_eq!(labels(&ma), vec!["map/2", "max/1", "max_size/0"]);

    let map = complete(&services, "Result = lists:map", &target).await;
    assert_eq!(labels(&map), vec!["map/2"]);

    // The loaded-module set was enumerated once for all three requests
    assert_eq!(node.enumerations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_candidates_are_unique() {
    let (_, services, target) = setup();
    let all = complete(&services, "calc:", &target).await;
    let unique: HashSet<String> = labels(&all).into_iter().collect();
    assert_eq!(unique.len(), all.len());
    assert_eq!(labels(&all), vec!["add/2", "add/3"]);
}

#[tokio::test]
async fn test_reloaded_module_appears_after_clearing() {
    let (node, services, target) = setup();
    assert!(complete(&services, "hot:", &target).await.is_empty());

    node.reload("hot");
    assert!(complete(&services, "hot:", &target).await.is_empty());

    services.clear_loaded_modules(&target).await;
    assert_eq!(node.forgotten.load(Ordering::SeqCst), 1);
    assert_eq!(labels(&complete(&services, "hot:", &target).await), vec!["reload/0"]);
}

#[tokio::test]
async fn test_local_target_checks_availability() {
    let (node, services, _) = setup();
    let local = RuntimeTarget::Local;
    assert_eq!(labels(&complete(&services, "hot:re", &local).await), vec!["reload/0"]);
    assert!(complete(&services, "nowhere:", &local).await.is_empty());
    assert_eq!(node.enumerations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_completion_items_carry_docs_and_snippets() {
    let (_, services, target) = setup();
    let items = completion_items(&services, "lists:map", &target).await;
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.label, "map/2");
    assert_eq!(item.insert_text.as_deref(), Some("map(${1:Fun}, ${2:List1})"));
    assert_eq!(item.insert_text_format, Some(InsertTextFormat::SNIPPET));
    assert!(item.documentation.is_some());
    assert!(item.detail.as_deref().unwrap_or_default().starts_with("-spec map"));
}

#[tokio::test]
async fn test_concurrent_requests_share_one_cache() {
    let (_, services, target) = setup();
    let services = Arc::new(services);

    let mut handles = Vec::new();
    for fragment in ["lists:", "lists:m", "calc:a", "calc:"] {
        let services = services.clone();
        let target = target.clone();
        handles.push(tokio::spawn(async move {
            complete(&services, fragment, &target).await.len()
        }));
    }
    let mut counts = Vec::new();
    for handle in handles {
        counts.push(handle.await.unwrap());
    }
    assert_eq!(counts, vec![4, 3, 2, 2]);
    assert!(services.module_cache().is_cached(&target).await);
}

// ============================================================================
// Signature help
// ============================================================================

#[tokio::test]
async fn test_signature_help_tracks_active_argument() {
    let (_, services, target) = setup();

    let first = signature_help(&services, "X = calc:add(", &target).await.unwrap();
    assert_eq!(first.active_argument, 0);
    assert_eq!(first.signatures.len(), 2);
    assert_eq!(first.signatures[0].signature, "add(A, B)");
    assert_eq!(first.signatures[1].signature, "add(Arg1, Arg2, Arg3)");

    let third = signature_help(&services, "X = calc:add(1, 2, ", &target).await.unwrap();
    assert_eq!(third.active_argument, 2);
    let lsp = third.to_lsp();
    assert_eq!(lsp.active_signature, Some(1));
    assert_eq!(lsp.active_parameter, Some(2));
}

#[tokio::test]
async fn test_signature_help_for_outer_call_after_nested_call() {
    let (_, services, target) = setup();
    let help = signature_help(&services, "lists:map(lists:max([1, 2]), ", &target)
        .await
        .unwrap();
    assert_eq!(help.signatures[0].name, "map");
    assert_eq!(help.active_argument, 1);

    let inner = signature_help(&services, "lists:map(lists:max([1, ", &target)
        .await
        .unwrap();
    assert_eq!(inner.signatures[0].name, "max");
    assert_eq!(inner.active_argument, 0);
}

#[tokio::test]
async fn test_no_signature_help_outside_calls() {
    let (_, services, target) = setup();
    assert!(signature_help(&services, "calc:add(1, 2). ", &target).await.is_none());
    assert!(signature_help(&services, "calc:", &target).await.is_none());
    assert!(signature_help(&services, "F(1, ", &target).await.is_none());
}
