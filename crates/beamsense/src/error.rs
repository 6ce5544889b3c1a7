//
// error.rs
//
// Error taxonomy for fragment analysis and runtime introspection. None of
// these reach the completion or signature-help entry points: each one is
// caught where it happens and degrades the result instead.
//

use std::time::Duration;

use thiserror::Error;

/// The fragment is not lexically valid (e.g. an unterminated string).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("lexical error at byte {offset} (line {line}): unexpected {found:?}")]
pub struct LexError {
    pub offset: usize,
    pub line: u32,
    pub found: String,
}

/// An introspection or documentation query against a runtime failed.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("invalid atom name {0:?}")]
    InvalidName(String),
    #[error("failed to spawn probe VM: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("probe VM timed out after {0:?}")]
    Timeout(Duration),
    #[error("runtime call failed: {0}")]
    Failed(String),
    #[error("could not decode probe output: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The reconstructed call-site fragment did not parse as an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at token {index}: {message}")]
pub struct ParseError {
    pub index: usize,
    pub message: String,
}

/// Why the call-site scan gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallSiteError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("unbalanced brackets at token {0}")]
    Malformed(usize),
    #[error("no open call before the cursor")]
    NoCall,
}
