//
// signature.rs
//
// Signature lookup for a located call: every arity of the called function
// with its documented signature, docs and spec.
//

use tower_lsp::lsp_types::{
    Documentation, MarkupContent, MarkupKind, ParameterInformation, ParameterLabel, SignatureHelp,
    SignatureInformation,
};

use crate::call_site::CallTarget;
use crate::docs::MemberKind;
use crate::identifier::{list_callables, lookup_records, record_for};
use crate::introspection::{ExportEntry, RuntimeTarget};
use crate::state::RuntimeServices;

/// Module that unqualified calls resolve to: auto-imported BIFs.
pub const BUILTIN_MODULE: &str = "erlang";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMatch {
    pub name: String,
    pub arity: u32,
    /// Documented signature, or `name(Arg1, ..., ArgN)`
    pub signature: String,
    pub documentation: Option<String>,
    pub spec: Option<String>,
    pub parameters: Vec<String>,
}

/// Signatures of every arity of the function `call` names, sorted by arity.
///
/// No arity filtering happens here; see [`SignatureHelpResult::to_lsp`].
pub async fn resolve_signatures(
    services: &RuntimeServices,
    call: &CallTarget,
    target: &RuntimeTarget,
) -> Vec<SignatureMatch> {
    let (module, name) = match call {
        CallTarget::Remote { module, name } => (module.as_str(), name.as_str()),
        CallTarget::Local { name } => (BUILTIN_MODULE, name.as_str()),
    };

    let mut exports: Vec<ExportEntry> = list_callables(services, module, target)
        .await
        .into_iter()
        .filter(|e| e.name == name)
        .collect();
    // One entry per arity; a function wins over a macro of the same arity
    exports.sort_by_key(|e| (e.arity, e.kind));
    exports.dedup_by_key(|e| e.arity);

    let keys: Vec<(String, u32)> = exports.iter().map(|e| (e.name.clone(), e.arity)).collect();
    let docs = lookup_records(
        services,
        target,
        module,
        &keys,
        &[MemberKind::Function, MemberKind::Macro],
    )
    .await;

    exports
        .into_iter()
        .map(|entry| {
            let record = record_for(&docs, entry.kind.into(), &entry.name, entry.arity);
            let parameters = record.parameter_names(entry.arity);
            let signature = record
                .signatures
                .first()
                .cloned()
                .unwrap_or_else(|| format!("{}({})", entry.name, parameters.join(", ")));
            SignatureMatch {
                name: entry.name,
                arity: entry.arity,
                signature,
                documentation: record.docs,
                spec: record.specs.into_iter().next(),
                parameters,
            }
        })
        .collect()
}

/// Signatures of the call under the cursor plus the argument being typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHelpResult {
    pub signatures: Vec<SignatureMatch>,
    pub active_argument: usize,
}

impl SignatureHelpResult {
    /// Index of the signature to highlight: the smallest arity that still
    /// has room for the active argument, else the largest.
    pub fn active_signature(&self) -> Option<usize> {
        if self.signatures.is_empty() {
            return None;
        }
        self.signatures
            .iter()
            .position(|s| s.arity as usize > self.active_argument)
            .or(Some(self.signatures.len() - 1))
    }

    pub fn to_lsp(&self) -> SignatureHelp {
        let signatures = self
            .signatures
            .iter()
            .map(|sig| {
                let mut value = String::new();
                if let Some(spec) = &sig.spec {
                    value.push_str(&format!("```erlang\n{}\n```\n", spec));
                }
                if let Some(docs) = &sig.documentation {
                    if !value.is_empty() {
                        value.push('\n');
                    }
                    value.push_str(docs);
                }
                SignatureInformation {
                    label: sig.signature.clone(),
                    documentation: (!value.is_empty()).then(|| {
                        Documentation::MarkupContent(MarkupContent {
                            kind: MarkupKind::Markdown,
                            value,
                        })
                    }),
                    parameters: Some(
                        sig.parameters
                            .iter()
                            .map(|p| ParameterInformation {
                                label: ParameterLabel::Simple(p.clone()),
                                documentation: None,
                            })
                            .collect(),
                    ),
                    active_parameter: None,
                }
            })
            .collect();

        SignatureHelp {
            signatures,
            active_signature: self.active_signature().map(|i| i as u32),
            active_parameter: Some(self.active_argument as u32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::docs::DocumentationRecord;
    use crate::test_utils::{documented, FakeRuntime};

    fn services(runtime: FakeRuntime) -> (Arc<FakeRuntime>, RuntimeServices) {
        let runtime = Arc::new(runtime);
        let services = RuntimeServices::new(runtime.clone(), runtime.clone());
        (runtime, services)
    }

    fn remote_call(module: &str, name: &str) -> CallTarget {
        CallTarget::Remote {
            module: module.into(),
            name: name.into(),
        }
    }

    async fn local_signatures(
        services: &RuntimeServices,
        module: &str,
        name: &str,
    ) -> Vec<SignatureMatch> {
        resolve_signatures(services, &remote_call(module, name), &RuntimeTarget::Local).await
    }

    fn sig(name: &str, arity: u32) -> SignatureMatch {
        SignatureMatch {
            name: name.into(),
            arity,
            signature: format!("{name}/{arity}"),
            documentation: None,
            spec: None,
            parameters: vec![],
        }
    }

    #[tokio::test]
    async fn test_all_arities_sorted() {
        let (_, services) = services(
            FakeRuntime::new()
                .with_module(
                    &RuntimeTarget::Local,
                    "lists",
                    vec![
                        ExportEntry::function("seq", 3),
                        ExportEntry::function("map", 2),
                        ExportEntry::function("seq", 2),
                    ],
                    vec![],
                )
                .with_docs(
                    &RuntimeTarget::Local,
                    "lists",
                    vec![documented(MemberKind::Function, "seq", 2, "Sequence.")],
                ),
        );

        let sigs = local_signatures(&services, "lists", "seq").await;
        assert_eq!(sigs.len(), 2);
        assert_eq!((sigs[0].arity, sigs[1].arity), (2, 3));

        assert_eq!(sigs[0].signature, "seq(Arg1, Arg2)");
        assert_eq!(sigs[0].documentation.as_deref(), Some("Sequence."));
        assert_eq!(
            sigs[0].spec.as_deref(),
            Some("-spec seq(term(), term()) -> term().")
        );

        // Undocumented arity gets a synthesised signature
        assert_eq!(sigs[1].signature, "seq(Arg1, Arg2, Arg3)");
        assert!(sigs[1].documentation.is_none());
        assert!(sigs[1].spec.is_none());
    }

    #[tokio::test]
    async fn test_local_call_resolves_to_builtins() {
        let (runtime, services) = services(FakeRuntime::new().with_module(
            &RuntimeTarget::Local,
            BUILTIN_MODULE,
            vec![ExportEntry::function("element", 2)],
            vec![],
        ));
        let call = CallTarget::Local { name: "element".into() };
        let sigs = resolve_signatures(&services, &call, &RuntimeTarget::Local).await;
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].name, "element");
        assert_eq!(runtime.loaded_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_function_or_module() {
        let (runtime, services) = services(FakeRuntime::new().with_module(
            &RuntimeTarget::Local,
            "lists",
            vec![ExportEntry::function("map", 2)],
            vec![],
        ));
        assert!(local_signatures(&services, "lists", "nope").await.is_empty());
        assert!(local_signatures(&services, "nope", "map").await.is_empty());
        // Nothing to document, so no lookups
        assert_eq!(runtime.doc_calls(), 0);
    }

    #[tokio::test]
    async fn test_reflective_exports_have_no_signature() {
        let (_, services) = services(FakeRuntime::new().with_module(
            &RuntimeTarget::Local,
            "m",
            vec![
                ExportEntry::function("module_info", 0),
                ExportEntry::function("module_info", 1),
            ],
            vec![],
        ));
        assert!(local_signatures(&services, "m", "module_info").await.is_empty());
    }

    #[tokio::test]
    async fn test_documented_signature_and_parameters() {
        let mut member = documented(MemberKind::Function, "foldl", 3, "Folds.");
        member.record = DocumentationRecord {
            signatures: vec!["foldl(Fun, Acc0, List)".into()],
            ..member.record
        };
        let (_, services) = services(
            FakeRuntime::new()
                .with_module(
                    &RuntimeTarget::Local,
                    "lists",
                    vec![ExportEntry::function("foldl", 3)],
                    vec![],
                )
                .with_docs(&RuntimeTarget::Local, "lists", vec![member]),
        );
        let sigs = local_signatures(&services, "lists", "foldl").await;
        assert_eq!(sigs[0].signature, "foldl(Fun, Acc0, List)");
        assert_eq!(sigs[0].parameters, vec!["Fun", "Acc0", "List"]);
    }

    #[test]
    fn test_active_signature_selection() {
        let result = SignatureHelpResult {
            signatures: vec![sig("seq", 2), sig("seq", 3)],
            active_argument: 2,
        };
        assert_eq!(result.active_signature(), Some(1));

        let first = SignatureHelpResult { active_argument: 0, ..result.clone() };
        assert_eq!(first.active_signature(), Some(0));

        let beyond = SignatureHelpResult { active_argument: 5, ..result };
        assert_eq!(beyond.active_signature(), Some(1));

        let empty = SignatureHelpResult { signatures: vec![], active_argument: 0 };
        assert_eq!(empty.active_signature(), None);
    }

    #[test]
    fn test_to_lsp() {
        let result = SignatureHelpResult {
            signatures: vec![SignatureMatch {
                name: "map".into(),
                arity: 2,
                signature: "map(Fun, List1)".into(),
                documentation: Some("Maps.".into()),
                spec: Some("-spec map(Fun, List1) -> List2.".into()),
                parameters: vec!["Fun".into(), "List1".into()],
            }],
            active_argument: 1,
        };
        let help = result.to_lsp();
        assert_eq!(help.active_signature, Some(0));
        assert_eq!(help.active_parameter, Some(1));
        assert_eq!(help.signatures[0].label, "map(Fun, List1)");
        assert_eq!(help.signatures[0].parameters.as_ref().map(Vec::len), Some(2));
        match &help.signatures[0].documentation {
            Some(Documentation::MarkupContent(content)) => {
                assert!(content.value.starts_with("```erlang\n-spec map"));
                assert!(content.value.ends_with("Maps."));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
