//
// lexer.rs
//
// Logos-based tokenizer for Erlang fragments. Input is whatever the user has
// typed so far, so incomplete syntax (a trailing `(` or `:`) must lex fine;
// only character-level problems such as an unterminated string fail.
//

use logos::Logos;

use crate::error::LexError;

/// Erlang reserved words. These lex as identifiers but are not atoms.
pub const KEYWORDS: &[&str] = &[
    "after", "and", "andalso", "band", "begin", "bnot", "bor", "bsl", "bsr", "bxor", "case",
    "catch", "cond", "div", "else", "end", "fun", "if", "let", "maybe", "not", "of", "or",
    "orelse", "receive", "rem", "try", "when", "xor",
];

/// Punctuation and operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Punct {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    BinOpen,
    BinClose,
    Comma,
    Semicolon,
    Colon,
    ColonColon,
    Pipe,
    DoublePipe,
    Arrow,
    LeftArrow,
    BinLeftArrow,
    FatArrow,
    ExactAssoc,
    Hash,
    Period,
    DotDot,
    Ellipsis,
    Match,
    MaybeMatch,
    Send,
    Question,
    DoubleQuestion,
    Plus,
    Minus,
    Star,
    Slash,
    PlusPlus,
    MinusMinus,
    EqEq,
    NotEq,
    ExactEq,
    ExactNotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
}

impl Punct {
    pub fn as_str(self) -> &'static str {
        match self {
            Punct::LParen => "(",
            Punct::RParen => ")",
            Punct::LBracket => "[",
            Punct::RBracket => "]",
            Punct::LBrace => "{",
            Punct::RBrace => "}",
            Punct::BinOpen => "<<",
            Punct::BinClose => ">>",
            Punct::Comma => ",",
            Punct::Semicolon => ";",
            Punct::Colon => ":",
            Punct::ColonColon => "::",
            Punct::Pipe => "|",
            Punct::DoublePipe => "||",
            Punct::Arrow => "->",
            Punct::LeftArrow => "<-",
            Punct::BinLeftArrow => "<=",
            Punct::FatArrow => "=>",
            Punct::ExactAssoc => ":=",
            Punct::Hash => "#",
            Punct::Period => ".",
            Punct::DotDot => "..",
            Punct::Ellipsis => "...",
            Punct::Match => "=",
            Punct::MaybeMatch => "?=",
            Punct::Send => "!",
            Punct::Question => "?",
            Punct::DoubleQuestion => "??",
            Punct::Plus => "+",
            Punct::Minus => "-",
            Punct::Star => "*",
            Punct::Slash => "/",
            Punct::PlusPlus => "++",
            Punct::MinusMinus => "--",
            Punct::EqEq => "==",
            Punct::NotEq => "/=",
            Punct::ExactEq => "=:=",
            Punct::ExactNotEq => "=/=",
            Punct::Lt => "<",
            Punct::Gt => ">",
            Punct::LtEq => "=<",
            Punct::GtEq => ">=",
        }
    }

    /// Opening half of a bracket pair.
    pub fn is_open_bracket(self) -> bool {
        matches!(
            self,
            Punct::LParen | Punct::LBracket | Punct::LBrace | Punct::BinOpen
        )
    }

    /// Closing half of a bracket pair.
    pub fn is_close_bracket(self) -> bool {
        matches!(
            self,
            Punct::RParen | Punct::RBracket | Punct::RBrace | Punct::BinClose
        )
    }

    /// The closer matching an opening bracket.
    pub fn closer(self) -> Option<Punct> {
        match self {
            Punct::LParen => Some(Punct::RParen),
            Punct::LBracket => Some(Punct::RBracket),
            Punct::LBrace => Some(Punct::RBrace),
            Punct::BinOpen => Some(Punct::BinClose),
            _ => None,
        }
    }
}

/// Token kind with its decoded payload, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Atom literal; the payload is the decoded name (quotes removed).
    Atom(String),
    Var(String),
    Integer,
    Float,
    Char,
    /// String literal; the payload is the decoded contents.
    String(String),
    Keyword(&'static str),
    Punct(Punct),
    /// The `.` that terminates a form or shell expression.
    EndOfClause,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text of the token
    pub text: String,
    /// Byte offset into the fragment
    pub offset: usize,
    /// 1-based line number
    pub line: u32,
}

impl Token {
    /// A token that does not come from the user's text.
    pub fn synthetic(kind: TokenKind) -> Self {
        let text = match &kind {
            TokenKind::Atom(name) | TokenKind::Var(name) => name.clone(),
            TokenKind::Keyword(word) => (*word).to_string(),
            TokenKind::Punct(p) => p.as_str().to_string(),
            TokenKind::EndOfClause => ".".to_string(),
            TokenKind::String(s) => format!("{s:?}"),
            TokenKind::Integer | TokenKind::Float | TokenKind::Char => String::new(),
        };
        Self {
            kind,
            text,
            offset: 0,
            line: 0,
        }
    }

    pub fn atom(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Atom(name) => Some(name),
            _ => None,
        }
    }

    pub fn punct(&self) -> Option<Punct> {
        match self.kind {
            TokenKind::Punct(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_punct(&self, punct: Punct) -> bool {
        self.punct() == Some(punct)
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        matches!(self.kind, TokenKind::Keyword(k) if k == word)
    }
}

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"%[^\n]*")]
enum RawToken {
    #[regex(r"[a-z][A-Za-z0-9_@]*")]
    Name,

    #[regex(r"'([^'\\]|\\(.|\n))*'")]
    QuotedAtom,

    #[regex(r"[A-Z_][A-Za-z0-9_@]*")]
    Var,

    #[regex(r"[0-9][0-9_]*(#[0-9A-Za-z_]+)?")]
    Integer,

    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*([eE][+-]?[0-9]+)?")]
    Float,

    #[regex(r#""([^"\\]|\\(.|\n))*""#)]
    String,

    #[regex(r"\$(\\x\{[0-9a-fA-F]+\}|\\x[0-9a-fA-F][0-9a-fA-F]|\\[0-7][0-7]?[0-7]?|\\\^.|\\.|[^\\])")]
    Char,

    #[token(".")]
    Dot,

    #[token("(", |_| Punct::LParen)]
    #[token(")", |_| Punct::RParen)]
    #[token("[", |_| Punct::LBracket)]
    #[token("]", |_| Punct::RBracket)]
    #[token("{", |_| Punct::LBrace)]
    #[token("}", |_| Punct::RBrace)]
    #[token("<<", |_| Punct::BinOpen)]
    #[token(">>", |_| Punct::BinClose)]
    #[token(",", |_| Punct::Comma)]
    #[token(";", |_| Punct::Semicolon)]
    #[token(":", |_| Punct::Colon)]
    #[token("::", |_| Punct::ColonColon)]
    #[token("|", |_| Punct::Pipe)]
    #[token("||", |_| Punct::DoublePipe)]
    #[token("->", |_| Punct::Arrow)]
    #[token("<-", |_| Punct::LeftArrow)]
    #[token("<=", |_| Punct::BinLeftArrow)]
    #[token("=>", |_| Punct::FatArrow)]
    #[token(":=", |_| Punct::ExactAssoc)]
    #[token("#", |_| Punct::Hash)]
    #[token("..", |_| Punct::DotDot)]
    #[token("...", |_| Punct::Ellipsis)]
    #[token("=", |_| Punct::Match)]
    #[token("?=", |_| Punct::MaybeMatch)]
    #[token("!", |_| Punct::Send)]
    #[token("?", |_| Punct::Question)]
    #[token("??", |_| Punct::DoubleQuestion)]
    #[token("+", |_| Punct::Plus)]
    #[token("-", |_| Punct::Minus)]
    #[token("*", |_| Punct::Star)]
    #[token("/", |_| Punct::Slash)]
    #[token("++", |_| Punct::PlusPlus)]
    #[token("--", |_| Punct::MinusMinus)]
    #[token("==", |_| Punct::EqEq)]
    #[token("/=", |_| Punct::NotEq)]
    #[token("=:=", |_| Punct::ExactEq)]
    #[token("=/=", |_| Punct::ExactNotEq)]
    #[token("<", |_| Punct::Lt)]
    #[token(">", |_| Punct::Gt)]
    #[token("=<", |_| Punct::LtEq)]
    #[token(">=", |_| Punct::GtEq)]
    Punct(Punct),
}

/// Tokenize a fragment into an ordered token list.
///
/// Whitespace and `%` comments are dropped. Fails on the first character
/// sequence that is not a valid Erlang token, which includes unterminated
/// quoted atoms and strings.
pub fn tokenize(fragment: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = RawToken::lexer(fragment);
    let mut tokens = Vec::new();
    let mut line: u32 = 1;
    let mut line_cursor = 0usize;

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let text = lexer.slice();

        line += count_newlines(&fragment[line_cursor..span.start]);
        line_cursor = span.start;

        let raw = result.map_err(|()| LexError {
            offset: span.start,
            line,
            found: fragment[span.start..].chars().take(16).collect(),
        })?;

        let kind = match raw {
            RawToken::Name => match KEYWORDS.iter().find(|k| **k == text) {
                Some(word) => TokenKind::Keyword(*word),
                None => TokenKind::Atom(text.to_string()),
            },
            RawToken::QuotedAtom => TokenKind::Atom(unescape(&text[1..text.len() - 1])),
            RawToken::Var => TokenKind::Var(text.to_string()),
            RawToken::Integer => TokenKind::Integer,
            RawToken::Float => TokenKind::Float,
            RawToken::String => TokenKind::String(unescape(&text[1..text.len() - 1])),
            RawToken::Char => TokenKind::Char,
            RawToken::Dot => {
                let terminates = fragment[span.end..]
                    .chars()
                    .next()
                    .map_or(true, |c| c.is_whitespace() || c == '%');
                if terminates {
                    TokenKind::EndOfClause
                } else {
                    TokenKind::Punct(Punct::Period)
                }
            }
            RawToken::Punct(p) => TokenKind::Punct(p),
        };

        tokens.push(Token {
            kind,
            text: text.to_string(),
            offset: span.start,
            line,
        });
    }

    Ok(tokens)
}

fn count_newlines(s: &str) -> u32 {
    s.bytes().filter(|b| *b == b'\n').count() as u32
}

/// Decode the escape sequences of a quoted atom or string body.
fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('s') => out.push(' '),
            Some('e') => out.push('\u{1b}'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('v') => out.push('\u{b}'),
            Some('d') => out.push('\u{7f}'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
