//
// handlers.rs
//
// Request entry points: qualified-name completion and signature help for a
// fragment of Erlang source ending at the cursor
//

use tower_lsp::lsp_types::CompletionItem;

use crate::call_site::locate_call;
use crate::cursor_context::{classify, CursorContext};
use crate::identifier::{resolve_qualified, IdentifierMatch};
use crate::introspection::RuntimeTarget;
use crate::lexer::tokenize;
use crate::perf::TimingGuard;
use crate::signature::{resolve_signatures, SignatureHelpResult};
use crate::state::RuntimeServices;

/// Candidates for the module-qualified name at the end of `fragment`.
///
/// Returns an empty list when the fragment does not lex or does not end in
/// `module:` or `module:prefix`.
pub async fn complete(
    services: &RuntimeServices,
    fragment: &str,
    target: &RuntimeTarget,
) -> Vec<IdentifierMatch> {
    let _guard = TimingGuard::new("complete");

    let tokens = match tokenize(fragment) {
        Ok(tokens) => tokens,
        Err(e) => {
            log::trace!("Completion fragment does not lex: {}", e);
            return Vec::new();
        }
    };

    match classify(&tokens) {
        CursorContext::QualifiedEmpty { module } => {
            resolve_qualified(services, &module, "", target).await
        }
        CursorContext::QualifiedPartial { module, prefix } => {
            resolve_qualified(services, &module, &prefix, target).await
        }
        CursorContext::None => Vec::new(),
    }
}

/// [`complete`] rendered as LSP completion items.
pub async fn completion_items(
    services: &RuntimeServices,
    fragment: &str,
    target: &RuntimeTarget,
) -> Vec<CompletionItem> {
    complete(services, fragment, target)
        .await
        .iter()
        .map(IdentifierMatch::to_completion_item)
        .collect()
}

/// Signatures for the innermost open call in `fragment`.
///
/// `None` when there is no open call or the called function has no
/// signatures on `target`.
pub async fn signature_help(
    services: &RuntimeServices,
    fragment: &str,
    target: &RuntimeTarget,
) -> Option<SignatureHelpResult> {
    let _guard = TimingGuard::new("signature_help");

    let call = locate_call(fragment)?;
    log::debug!(
        "Call site {:?}, active argument {}",
        call.target,
        call.active_argument
    );

    let signatures = resolve_signatures(services, &call.target, target).await;
    if signatures.is_empty() {
        return None;
    }
    Some(SignatureHelpResult {
        signatures,
        active_argument: call.active_argument,
    })
}
