//
// expr_parser.rs
//
// Recursive-descent parser for a single Erlang expression terminated by `.`.
// It exists to validate call-site fragments rebuilt by `call_site`, so it
// keeps the structure of calls and atoms and collapses everything else into
// `Expr::Compound`.
//

use crate::error::ParseError;
use crate::lexer::{Punct, Token, TokenKind};

/// Parsed expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Atom(String),
    Var(String),
    Literal,
    /// `?NAME` or `?NAME(...)`
    Macro(String),
    /// `module:function`, only valid as a callee
    Remote {
        module: Box<Expr>,
        function: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// Operator application; only the outermost operator is kept.
    Operator(String),
    /// Tuples, lists, maps, blocks and the like. The tag names the construct.
    Compound(&'static str),
}

/// Bound on parser recursion. Deeper input is rejected with a `ParseError`.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Parse `tokens` as exactly one expression followed by an end-of-clause.
pub fn parse_expression(tokens: &[Token]) -> Result<Expr, ParseError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expr()?;
    match parser.peek_kind() {
        Some(TokenKind::EndOfClause) => parser.pos += 1,
        _ => return Err(parser.error("expected end of expression")),
    }
    if parser.pos != tokens.len() {
        return Err(parser.error("trailing tokens after expression"));
    }
    Ok(expr)
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
}

/// Binary operator binding powers, loosest first. Right-associative
/// operators bind their right side at the same level.
fn binary_op(token: &Token) -> Option<(u8, bool)> {
    let power = match &token.kind {
        TokenKind::Punct(Punct::Match) | TokenKind::Punct(Punct::Send) => (1, true),
        TokenKind::Punct(Punct::MaybeMatch) => (1, false),
        TokenKind::Keyword("orelse") => (2, true),
        TokenKind::Keyword("andalso") => (3, true),
        TokenKind::Punct(
            Punct::EqEq
            | Punct::NotEq
            | Punct::LtEq
            | Punct::Lt
            | Punct::GtEq
            | Punct::Gt
            | Punct::ExactEq
            | Punct::ExactNotEq,
        ) => (4, false),
        TokenKind::Punct(Punct::PlusPlus | Punct::MinusMinus) => (5, true),
        TokenKind::Punct(Punct::Plus | Punct::Minus)
        | TokenKind::Keyword("bor" | "bxor" | "bsl" | "bsr" | "or" | "xor") => (6, false),
        TokenKind::Punct(Punct::Star | Punct::Slash)
        | TokenKind::Keyword("div" | "rem" | "band" | "and") => (7, false),
        _ => return None,
    };
    Some(power)
}

const UNARY_POWER: u8 = 8;

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&'t TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&'t Token> {
        self.tokens.get(self.pos + offset)
    }

    fn at_punct(&self, punct: Punct) -> bool {
        self.peek().is_some_and(|t| t.is_punct(punct))
    }

    fn at_keyword(&self, word: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(word))
    }

    fn bump(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    fn eat_punct(&mut self, punct: Punct) -> bool {
        if self.at_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.at_keyword(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: Punct) -> Result<(), ParseError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", punct.as_str())))
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), ParseError> {
        if self.eat_keyword(word) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{word}'")))
        }
    }

    fn error(&self, message: &str) -> ParseError {
        let found = self
            .peek()
            .map(|t| t.text.as_str())
            .unwrap_or("end of input");
        ParseError {
            index: self.pos,
            message: format!("{message}, found '{found}'"),
        }
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    /// Run `parse` one nesting level deeper, failing past [`MAX_NESTING_DEPTH`].
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.nested(|p| {
            if p.eat_keyword("catch") {
                p.expr()?;
                return Ok(Expr::Compound("catch"));
            }
            p.expr_bp(0, true)
        })
    }

    /// Precedence climbing. `allow_remote` is false where `a:b` means
    /// something other than a remote call (catch patterns).
    fn expr_bp(&mut self, min_power: u8, allow_remote: bool) -> Result<Expr, ParseError> {
        self.nested(|p| p.climb(min_power, allow_remote))
    }

    fn climb(&mut self, min_power: u8, allow_remote: bool) -> Result<Expr, ParseError> {
        let mut lhs = self.unary(allow_remote)?;

        while let Some(token) = self.peek() {
            let Some((power, right_assoc)) = binary_op(token) else {
                break;
            };
            if power <= min_power {
                break;
            }
            self.pos += 1;
            let next_min = if right_assoc { power - 1 } else { power };
            self.expr_bp(next_min, allow_remote)?;
            lhs = Expr::Operator(token.text.clone());
        }

        Ok(lhs)
    }

    fn unary(&mut self, allow_remote: bool) -> Result<Expr, ParseError> {
        let is_unary = matches!(
            self.peek_kind(),
            Some(TokenKind::Punct(Punct::Minus | Punct::Plus))
                | Some(TokenKind::Keyword("not" | "bnot"))
        );
        if is_unary {
            let op = self.bump().map(|t| t.text.clone()).unwrap_or_default();
            self.expr_bp(UNARY_POWER, allow_remote)?;
            return Ok(Expr::Operator(op));
        }
        self.postfix(allow_remote)
    }

    /// A primary followed by any number of calls, remote qualifiers and
    /// record/map accesses.
    fn postfix(&mut self, allow_remote: bool) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        let mut links = 0usize;

        loop {
            links += 1;
            if links > MAX_NESTING_DEPTH {
                return Err(self.error("expression nested too deeply"));
            }
            if allow_remote && self.at_punct(Punct::Colon) {
                self.pos += 1;
                let function = self.primary()?;
                if !self.at_punct(Punct::LParen) {
                    return Err(self.error("expected '(' after remote function"));
                }
                expr = Expr::Remote {
                    module: Box::new(expr),
                    function: Box::new(function),
                };
            } else if self.at_punct(Punct::LParen) {
                let args = self.call_args()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else if self.at_punct(Punct::Hash) {
                self.pos += 1;
                self.hash_suffix()?;
                expr = Expr::Compound("record");
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect_punct(Punct::LParen)?;
        let args = self.exprs_until(Punct::RParen)?;
        self.expect_punct(Punct::RParen)?;
        Ok(args)
    }

    /// Comma-separated expressions up to (not including) `close`.
    fn exprs_until(&mut self, close: Punct) -> Result<Vec<Expr>, ParseError> {
        let mut exprs = Vec::new();
        if self.at_punct(close) {
            return Ok(exprs);
        }
        loop {
            exprs.push(self.expr()?);
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        Ok(exprs)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        self.nested(Self::term)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let token = self.bump().ok_or_else(|| self.error("expected expression"))?;

        match &token.kind {
            TokenKind::Atom(name) => Ok(Expr::Atom(name.clone())),
            TokenKind::Var(name) => Ok(Expr::Var(name.clone())),
            TokenKind::Integer | TokenKind::Float | TokenKind::Char => Ok(Expr::Literal),
            TokenKind::String(_) => {
                while matches!(self.peek_kind(), Some(TokenKind::String(_))) {
                    self.pos += 1;
                }
                Ok(Expr::Literal)
            }
            TokenKind::Punct(Punct::LParen) => {
                let inner = self.expr()?;
                self.expect_punct(Punct::RParen)?;
                Ok(inner)
            }
            TokenKind::Punct(Punct::LBrace) => {
                self.exprs_until(Punct::RBrace)?;
                self.expect_punct(Punct::RBrace)?;
                Ok(Expr::Compound("tuple"))
            }
            TokenKind::Punct(Punct::LBracket) => self.list(),
            TokenKind::Punct(Punct::BinOpen) => self.binary(),
            TokenKind::Punct(Punct::Hash) => {
                self.hash_suffix()?;
                Ok(Expr::Compound("record"))
            }
            TokenKind::Punct(Punct::Question) => self.macro_use(),
            TokenKind::Punct(Punct::DoubleQuestion) => {
                self.macro_name()?;
                Ok(Expr::Literal)
            }
            TokenKind::Keyword("fun") => self.fun_expr(),
            TokenKind::Keyword("begin") => {
                self.body()?;
                self.expect_keyword("end")?;
                Ok(Expr::Compound("block"))
            }
            TokenKind::Keyword("case") => {
                self.expr()?;
                self.expect_keyword("of")?;
                self.clauses(true)?;
                self.expect_keyword("end")?;
                Ok(Expr::Compound("case"))
            }
            TokenKind::Keyword("if") => {
                self.if_clauses()?;
                self.expect_keyword("end")?;
                Ok(Expr::Compound("if"))
            }
            TokenKind::Keyword("receive") => self.receive_expr(),
            TokenKind::Keyword("try") => self.try_expr(),
            TokenKind::Keyword("maybe") => {
                self.body()?;
                if self.eat_keyword("else") {
                    self.clauses(true)?;
                }
                self.expect_keyword("end")?;
                Ok(Expr::Compound("maybe"))
            }
            _ => {
                self.pos -= 1;
                Err(self.error("expected expression"))
            }
        }
    }

    fn list(&mut self) -> Result<Expr, ParseError> {
        if self.eat_punct(Punct::RBracket) {
            return Ok(Expr::Compound("list"));
        }
        self.expr()?;
        if self.eat_punct(Punct::DoublePipe) {
            self.qualifiers()?;
            self.expect_punct(Punct::RBracket)?;
            return Ok(Expr::Compound("comprehension"));
        }
        while self.eat_punct(Punct::Comma) {
            self.expr()?;
        }
        if self.eat_punct(Punct::Pipe) {
            self.expr()?;
        }
        self.expect_punct(Punct::RBracket)?;
        Ok(Expr::Compound("list"))
    }

    /// Generators and filters of a comprehension.
    fn qualifiers(&mut self) -> Result<(), ParseError> {
        loop {
            self.expr()?;
            if self.eat_punct(Punct::LeftArrow) || self.eat_punct(Punct::BinLeftArrow) {
                self.expr()?;
            }
            if !self.eat_punct(Punct::Comma) {
                return Ok(());
            }
        }
    }

    fn binary(&mut self) -> Result<Expr, ParseError> {
        if self.eat_punct(Punct::BinClose) {
            return Ok(Expr::Compound("binary"));
        }
        self.bin_element()?;
        if self.eat_punct(Punct::DoublePipe) {
            self.qualifiers()?;
            self.expect_punct(Punct::BinClose)?;
            return Ok(Expr::Compound("comprehension"));
        }
        while self.eat_punct(Punct::Comma) {
            self.bin_element()?;
        }
        self.expect_punct(Punct::BinClose)?;
        Ok(Expr::Compound("binary"))
    }

    /// `Value[:Size][/TypeSpecifierList]`
    fn bin_element(&mut self) -> Result<(), ParseError> {
        self.bit_value()?;
        if self.eat_punct(Punct::Colon) {
            self.bit_value()?;
        }
        if self.eat_punct(Punct::Slash) {
            loop {
                match self.bump().map(|t| &t.kind) {
                    Some(TokenKind::Atom(_)) => {}
                    _ => {
                        self.pos -= 1;
                        return Err(self.error("expected type specifier"));
                    }
                }
                if self.eat_punct(Punct::Colon) {
                    match self.bump().map(|t| &t.kind) {
                        Some(TokenKind::Integer) => {}
                        _ => {
                            self.pos -= 1;
                            return Err(self.error("expected unit size"));
                        }
                    }
                }
                if !self.eat_punct(Punct::Minus) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn bit_value(&mut self) -> Result<Expr, ParseError> {
        if matches!(
            self.peek_kind(),
            Some(TokenKind::Punct(Punct::Minus | Punct::Plus)) | Some(TokenKind::Keyword("bnot"))
        ) {
            self.pos += 1;
        }
        let expr = self.primary()?;
        if self.at_punct(Punct::LParen) {
            self.call_args()?;
        }
        Ok(expr)
    }

    /// After `#`: a map (`#{...}`), record construction/update
    /// (`#name{...}`) or record field index/access (`#name.field`).
    fn hash_suffix(&mut self) -> Result<(), ParseError> {
        if self.eat_punct(Punct::LBrace) {
            return self.associations();
        }
        match self.bump().map(|t| &t.kind) {
            Some(TokenKind::Atom(_)) => {}
            _ => {
                self.pos -= 1;
                return Err(self.error("expected record name"));
            }
        }
        if self.eat_punct(Punct::Period) {
            return match self.bump().map(|t| &t.kind) {
                Some(TokenKind::Atom(_)) => Ok(()),
                _ => {
                    self.pos -= 1;
                    Err(self.error("expected record field"))
                }
            };
        }
        self.expect_punct(Punct::LBrace)?;
        if self.eat_punct(Punct::RBrace) {
            return Ok(());
        }
        loop {
            match self.bump().map(|t| &t.kind) {
                Some(TokenKind::Atom(_)) | Some(TokenKind::Var(_)) => {}
                _ => {
                    self.pos -= 1;
                    return Err(self.error("expected record field"));
                }
            }
            self.expect_punct(Punct::Match)?;
            self.expr()?;
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RBrace)
    }

    /// Map associations after `#{`, through the closing brace.
    fn associations(&mut self) -> Result<(), ParseError> {
        if self.eat_punct(Punct::RBrace) {
            return Ok(());
        }
        loop {
            self.expr()?;
            if !(self.eat_punct(Punct::FatArrow) || self.eat_punct(Punct::ExactAssoc)) {
                return Err(self.error("expected '=>' or ':='"));
            }
            self.expr()?;
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RBrace)
    }

    fn macro_name(&mut self) -> Result<String, ParseError> {
        match self.bump().map(|t| &t.kind) {
            Some(TokenKind::Atom(name)) | Some(TokenKind::Var(name)) => Ok(name.clone()),
            _ => {
                self.pos -= 1;
                Err(self.error("expected macro name"))
            }
        }
    }

    fn macro_use(&mut self) -> Result<Expr, ParseError> {
        let name = self.macro_name()?;
        if self.at_punct(Punct::LParen) {
            self.call_args()?;
        }
        Ok(Expr::Macro(name))
    }

    /// `fun Name/Arity`, `fun M:F/Arity`, or `fun (Args) -> Body end`.
    fn fun_expr(&mut self) -> Result<Expr, ParseError> {
        let is_reference = matches!(
            (self.peek_kind(), self.peek_at(1).map(|t| &t.kind)),
            (
                Some(TokenKind::Atom(_) | TokenKind::Var(_)),
                Some(TokenKind::Punct(Punct::Slash | Punct::Colon))
            )
        );
        if is_reference {
            self.pos += 1;
            if self.eat_punct(Punct::Colon) {
                self.macro_name()?;
            }
            self.expect_punct(Punct::Slash)?;
            return match self.bump().map(|t| &t.kind) {
                Some(TokenKind::Integer) | Some(TokenKind::Var(_)) => Ok(Expr::Compound("fun_ref")),
                _ => {
                    self.pos -= 1;
                    Err(self.error("expected arity"))
                }
            };
        }

        loop {
            // Named funs repeat the variable name in every clause
            if matches!(self.peek_kind(), Some(TokenKind::Var(_))) {
                self.pos += 1;
            }
            self.call_args()?;
            self.guard_and_body()?;
            if !self.eat_punct(Punct::Semicolon) {
                break;
            }
        }
        self.expect_keyword("end")?;
        Ok(Expr::Compound("fun"))
    }

    fn receive_expr(&mut self) -> Result<Expr, ParseError> {
        if !self.at_keyword("after") {
            self.clauses(true)?;
        }
        if self.eat_keyword("after") {
            self.expr()?;
            self.expect_punct(Punct::Arrow)?;
            self.body()?;
        }
        self.expect_keyword("end")?;
        Ok(Expr::Compound("receive"))
    }

    fn try_expr(&mut self) -> Result<Expr, ParseError> {
        self.body()?;
        if self.eat_keyword("of") {
            self.clauses(true)?;
        }
        let mut handled = false;
        if self.eat_keyword("catch") {
            handled = true;
            loop {
                self.catch_pattern()?;
                self.guard_and_body()?;
                if !self.eat_punct(Punct::Semicolon) {
                    break;
                }
            }
        }
        if self.eat_keyword("after") {
            handled = true;
            self.body()?;
        }
        if !handled {
            return Err(self.error("expected 'catch' or 'after'"));
        }
        self.expect_keyword("end")?;
        Ok(Expr::Compound("try"))
    }

    /// `[Class:]Pattern[:Stacktrace]`
    fn catch_pattern(&mut self) -> Result<(), ParseError> {
        self.expr_bp(0, false)?;
        if self.eat_punct(Punct::Colon) {
            self.expr_bp(0, false)?;
            if self.eat_punct(Punct::Colon) {
                self.expr_bp(0, false)?;
            }
        }
        Ok(())
    }

    /// `Pattern [when Guard] -> Body` clauses separated by `;`.
    fn clauses(&mut self, with_pattern: bool) -> Result<(), ParseError> {
        loop {
            if with_pattern {
                self.expr()?;
            }
            self.guard_and_body()?;
            if !self.eat_punct(Punct::Semicolon) {
                return Ok(());
            }
        }
    }

    fn if_clauses(&mut self) -> Result<(), ParseError> {
        loop {
            self.guard()?;
            self.expect_punct(Punct::Arrow)?;
            self.body()?;
            if !self.eat_punct(Punct::Semicolon) {
                return Ok(());
            }
        }
    }

    fn guard_and_body(&mut self) -> Result<(), ParseError> {
        if self.eat_keyword("when") {
            self.guard()?;
        }
        self.expect_punct(Punct::Arrow)?;
        self.body()
    }

    /// Guard sequence: tests joined by `,` and `;`.
    fn guard(&mut self) -> Result<(), ParseError> {
        loop {
            self.expr()?;
            if !(self.eat_punct(Punct::Comma) || self.eat_punct(Punct::Semicolon)) {
                return Ok(());
            }
        }
    }

    fn body(&mut self) -> Result<(), ParseError> {
        loop {
            self.expr()?;
            if !self.eat_punct(Punct::Comma) {
                return Ok(());
            }
        }
    }
}
