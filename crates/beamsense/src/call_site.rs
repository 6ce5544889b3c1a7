//
// call_site.rs
//
// Locates the innermost open call around the cursor and which argument the
// cursor is in. The fragment is scanned backwards with a small state machine
// to find the head of the call, the tail is closed off with synthetic tokens,
// and the result is handed to the expression parser. A fragment that does not
// survive parsing yields no call.
//

use crate::error::CallSiteError;
use crate::expr_parser::{parse_expression, Expr, MAX_NESTING_DEPTH};
use crate::lexer::{tokenize, Punct, Token, TokenKind};

/// Function a call site refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallTarget {
    /// `module:name(`
    Remote { module: String, name: String },
    /// `name(` with no module qualifier
    Local { name: String },
}

impl CallTarget {
    pub fn name(&self) -> &str {
        match self {
            CallTarget::Remote { name, .. } | CallTarget::Local { name } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSiteParse {
    pub target: CallTarget,
    /// Zero-based index of the argument under the cursor
    pub active_argument: usize,
}

/// States of the backward scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Dropping end-of-clause tokens at the very end of the fragment
    StripTrailingNoise,
    /// Walking over arguments of the call being looked for
    ScanArguments,
    /// Inside a balanced bracket group; the payload is the nesting depth
    ScanNestedBracket(usize),
    /// Just passed a `(`; deciding whether it opens a call
    ScanFunctionName,
}

/// What precedes an unmatched `(`.
enum ParenHead {
    /// A named call starting at this token index
    Call(usize),
    /// A grouping paren or a fun head; keep scanning outward
    Grouping,
    /// A call whose target cannot be named (variable or macro callee)
    Unresolvable,
}

struct CallHead {
    /// Index of the first token of the call
    start: usize,
    /// One past the last token that belongs to the call
    end: usize,
    /// Openers left unclosed inside the call, innermost first
    enclosing: Vec<Punct>,
}

/// Find the innermost open call in `fragment`, if any.
pub fn locate_call(fragment: &str) -> Option<CallSiteParse> {
    match try_locate_call(fragment) {
        Ok(parse) => Some(parse),
        Err(e) => {
            log::trace!("No call site in fragment: {}", e);
            None
        }
    }
}

/// Like [`locate_call`], reporting why no call was found.
pub fn try_locate_call(fragment: &str) -> Result<CallSiteParse, CallSiteError> {
    let tokens = tokenize(fragment)?;
    let head = scan_call_head(&tokens)?;

    let mut rebuilt = tokens[head.start..head.end].to_vec();
    close_fragment(&mut rebuilt, &head.enclosing);

    match parse_expression(&rebuilt)? {
        Expr::Call { callee, args } => {
            let target = call_target(*callee).ok_or(CallSiteError::NoCall)?;
            Ok(CallSiteParse {
                target,
                active_argument: args.len().saturating_sub(1),
            })
        }
        _ => Err(CallSiteError::NoCall),
    }
}

fn scan_call_head(tokens: &[Token]) -> Result<CallHead, CallSiteError> {
    let mut state = ScanState::StripTrailingNoise;
    let mut end = tokens.len();
    let mut enclosing = Vec::new();
    // Closers of the nested group being skipped, innermost last
    let mut pending: Vec<Punct> = Vec::new();
    let mut i = tokens.len();

    while i > 0 {
        let idx = i - 1;
        let token = &tokens[idx];

        match state {
            ScanState::StripTrailingNoise => {
                if token.kind == TokenKind::EndOfClause {
                    end = idx;
                    i -= 1;
                } else {
                    // Reprocess this token as part of the arguments
                    state = ScanState::ScanArguments;
                }
            }
            ScanState::ScanArguments => {
                match &token.kind {
                    // A previous form ended here; the cursor is not in a call
                    TokenKind::EndOfClause => return Err(CallSiteError::NoCall),
                    TokenKind::Punct(Punct::LParen) => state = ScanState::ScanFunctionName,
                    TokenKind::Punct(p) if p.is_open_bracket() => {
                        enclosing.push(*p);
                        if enclosing.len() > MAX_NESTING_DEPTH {
                            return Err(CallSiteError::NoCall);
                        }
                    }
                    TokenKind::Punct(p) if p.is_close_bracket() => {
                        pending.push(*p);
                        state = ScanState::ScanNestedBracket(1)
                    }
                    _ => {}
                }
                i -= 1;
            }
            ScanState::ScanNestedBracket(depth) => {
                match token.punct() {
                    Some(p) if p.is_close_bracket() => {
                        pending.push(p);
                        state = ScanState::ScanNestedBracket(depth + 1)
                    }
                    Some(p) if p.is_open_bracket() => {
                        // An opener must match the innermost pending closer
                        if pending.pop() != p.closer() {
                            return Err(CallSiteError::Malformed(idx));
                        }
                        state = if depth == 1 {
                            ScanState::ScanArguments
                        } else {
                            ScanState::ScanNestedBracket(depth - 1)
                        };
                    }
                    _ => {}
                }
                i -= 1;
            }
            ScanState::ScanFunctionName => match paren_head(tokens, idx) {
                ParenHead::Call(start) => {
                    return Ok(CallHead {
                        start,
                        end,
                        enclosing,
                    })
                }
                ParenHead::Unresolvable => return Err(CallSiteError::NoCall),
                ParenHead::Grouping => {
                    enclosing.push(Punct::LParen);
                    // Reprocess this token as part of the outer arguments
                    state = ScanState::ScanArguments;
                }
            },
        }
    }

    Err(CallSiteError::NoCall)
}

/// Classify the token at `idx`, which sits just before an unmatched `(`.
fn paren_head(tokens: &[Token], idx: usize) -> ParenHead {
    let before = |n: usize| idx.checked_sub(n).map(|i| &tokens[i]);

    match &tokens[idx].kind {
        TokenKind::Atom(_) => {
            let qualified = before(1).is_some_and(|t| t.is_punct(Punct::Colon));
            if !qualified {
                if before(1).is_some_and(|t| {
                    t.is_punct(Punct::Question) || t.is_punct(Punct::Hash)
                }) {
                    return ParenHead::Unresolvable;
                }
                return ParenHead::Call(idx);
            }
            match before(2) {
                Some(module) if module.atom().is_some() => {
                    // `?M:f(` and `#r.m:f(` name no static module
                    let prefixed = before(3).is_some_and(|t| {
                        t.is_punct(Punct::Question) || t.is_punct(Punct::Period)
                    });
                    if prefixed {
                        ParenHead::Unresolvable
                    } else {
                        ParenHead::Call(idx - 2)
                    }
                }
                _ => ParenHead::Unresolvable,
            }
        }
        // `fun Name(` starts a named fun clause, `F(` calls a variable
        TokenKind::Var(_) => {
            if before(1).is_some_and(|t| t.is_keyword("fun")) {
                ParenHead::Grouping
            } else {
                ParenHead::Unresolvable
            }
        }
        TokenKind::Punct(p) if p.is_close_bracket() => ParenHead::Unresolvable,
        _ => ParenHead::Grouping,
    }
}

/// Whether the expression cannot end with `token`.
fn expects_operand(token: &Token) -> bool {
    match &token.kind {
        TokenKind::Punct(p) => !p.is_close_bracket(),
        TokenKind::Keyword(word) => *word != "end",
        _ => false,
    }
}

/// Close the call: fill a dangling operand, close the open containers
/// innermost first, then the call itself.
fn close_fragment(tokens: &mut Vec<Token>, enclosing: &[Punct]) {
    if tokens.last().map_or(true, expects_operand) {
        tokens.push(Token::synthetic(TokenKind::Var("_".to_string())));
    }
    for opener in enclosing {
        if let Some(closer) = opener.closer() {
            tokens.push(Token::synthetic(TokenKind::Punct(closer)));
        }
    }
    tokens.push(Token::synthetic(TokenKind::Punct(Punct::RParen)));
    tokens.push(Token::synthetic(TokenKind::EndOfClause));
}

fn call_target(callee: Expr) -> Option<CallTarget> {
    match callee {
        Expr::Atom(name) => Some(CallTarget::Local { name }),
        Expr::Remote { module, function } => match (*module, *function) {
            (Expr::Atom(module), Expr::Atom(name)) => Some(CallTarget::Remote { module, name }),
            _ => None,
        },
        _ => None,
    }
}
