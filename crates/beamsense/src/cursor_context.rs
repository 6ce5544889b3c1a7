//
// cursor_context.rs
//
// Classifies what the user is trying to complete from the tail of the token
// stream. Only module-qualified references (`mod:` and `mod:prefix`) are
// recognised; everything else is left to other completion sources.
//

use crate::lexer::{Punct, Token, TokenKind};

/// Completion intent at the end of a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorContext {
    /// No actionable pattern.
    None,
    /// `module:` with nothing typed after the colon.
    QualifiedEmpty { module: String },
    /// `module:prefix`, completing names that start with `prefix`.
    QualifiedPartial { module: String, prefix: String },
}

impl CursorContext {
    /// The module being qualified, if any.
    pub fn module(&self) -> Option<&str> {
        match self {
            CursorContext::None => None,
            CursorContext::QualifiedEmpty { module }
            | CursorContext::QualifiedPartial { module, .. } => Some(module),
        }
    }

    /// The name prefix typed after the colon (empty for `module:`).
    pub fn prefix(&self) -> &str {
        match self {
            CursorContext::QualifiedPartial { prefix, .. } => prefix,
            _ => "",
        }
    }
}

/// Classify the completion intent from the last tokens of a fragment.
///
/// Patterns are matched against the reversed token list, most recent first:
/// `<colon> <atom>` is checked before `<name> <colon> <atom>`. Anything that
/// precedes the matched tokens is ignored.
pub fn classify(tokens: &[Token]) -> CursorContext {
    let mut rev = tokens.iter().rev();

    match (rev.next(), rev.next(), rev.next()) {
        (Some(colon), Some(module), _) if colon.is_punct(Punct::Colon) => match module.atom() {
            Some(module) => CursorContext::QualifiedEmpty {
                module: module.to_string(),
            },
            None => CursorContext::None,
        },
        (Some(name), Some(colon), Some(module)) if colon.is_punct(Punct::Colon) => {
            match (partial_name(name), module.atom()) {
                (Some(prefix), Some(module)) => CursorContext::QualifiedPartial {
                    module: module.to_string(),
                    prefix: prefix.to_string(),
                },
                _ => CursorContext::None,
            }
        }
        _ => CursorContext::None,
    }
}

/// A name being typed after `module:`. Reserved words count, since a
/// partially typed `lists:fun` may be heading for a longer function name.
fn partial_name(token: &Token) -> Option<&str> {
    match &token.kind {
        TokenKind::Atom(name) => Some(name),
        TokenKind::Keyword(word) => Some(word),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn classify_str(fragment: &str) -> CursorContext {
        classify(&tokenize(fragment).unwrap())
    }

    #[test]
    fn test_module_colon() {
        assert_eq!(
            classify_str("lists:"),
            CursorContext::QualifiedEmpty {
                module: "lists".into()
            }
        );
    }

    #[test]
    fn test_module_colon_prefix() {
        assert_eq!(
            classify_str("X = lists:fol"),
            CursorContext::QualifiedPartial {
                module: "lists".into(),
                prefix: "fol".into()
            }
        );
    }

    #[test]
    fn test_quoted_module() {
        assert_eq!(
            classify_str("'Elixir.Enum':ma"),
            CursorContext::QualifiedPartial {
                module: "Elixir.Enum".into(),
                prefix: "ma".into()
            }
        );
    }

    #[test]
    fn test_keyword_prefix_is_a_partial_name() {
        assert_eq!(
            classify_str("erlang:fun"),
            CursorContext::QualifiedPartial {
                module: "erlang".into(),
                prefix: "fun".into()
            }
        );
    }

    #[test]
    fn test_variable_module_is_not_recognised() {
        assert_eq!(classify_str("Mod:"), CursorContext::None);
        assert_eq!(classify_str("Mod:foo"), CursorContext::None);
    }

    #[test]
    fn test_keyword_module_is_not_recognised() {
        assert_eq!(classify_str("case:"), CursorContext::None);
    }

    #[test]
    fn test_unqualified_shapes() {
        assert_eq!(classify_str(""), CursorContext::None);
        assert_eq!(classify_str("foo"), CursorContext::None);
        assert_eq!(classify_str("lists:map("), CursorContext::None);
        assert_eq!(classify_str("lists:map(F"), CursorContext::None);
        assert_eq!(classify_str(":"), CursorContext::None);
        assert_eq!(classify_str("lists:map."), CursorContext::None);
    }

    #[test]
    fn test_only_the_tail_is_inspected() {
        assert_eq!(
            classify_str("foo(bar:baz(1), io:"),
            CursorContext::QualifiedEmpty { module: "io".into() }
        );
    }

    #[test]
    fn test_accessors() {
        let ctx = classify_str("io:fwr");
        assert_eq!(ctx.module(), Some("io"));
        assert_eq!(ctx.prefix(), "fwr");
        assert_eq!(CursorContext::None.module(), None);
        assert_eq!(CursorContext::None.prefix(), "");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn atom_name() -> impl Strategy<Value = String> {
            "[a-z][a-z0-9_]{0,8}".prop_filter("reserved word", |s| {
                !crate::lexer::KEYWORDS.contains(&s.as_str())
            })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn prop_classify_is_idempotent(fragment in "[a-z:( ,]{0,16}") {
                if let Ok(tokens) = tokenize(&fragment) {
                    prop_assert_eq!(classify(&tokens), classify(&tokens));
                }
            }

            #[test]
            fn prop_qualified_partial_roundtrips(module in atom_name(), name in atom_name()) {
                let ctx = classify_str(&format!("{module}:{name}"));
                prop_assert_eq!(ctx, CursorContext::QualifiedPartial { module, prefix: name });
            }

            #[test]
            fn prop_trailing_open_paren_is_never_qualified(
                module in atom_name(),
                name in atom_name(),
            ) {
                let ctx = classify_str(&format!("{module}:{name}("));
                prop_assert_eq!(ctx, CursorContext::None);
            }
        }
    }
}
