//! Fragment kind recognisers
//!
//! Each fragment kind has a recogniser that greedily consumes the longest
//! token prefix forming a valid instance of that kind. Recognisers only find
//! boundaries; they never build syntax trees. A recogniser stops at the first
//! token its grammar cannot continue with and never consumes a closing
//! delimiter it did not open.

mod expr;
mod item;
mod pat;
mod ty;

use mx_intern::Interner;
use mx_tt::{Delimiter, LiteralKind, Spacing, Token, TokenBuffer, TokenKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Syntactic category a metavariable captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FragmentKind {
    /// `item`
    Item,
    /// `block`
    Block,
    /// `stmt`
    Stmt,
    /// `pat`
    Pat,
    /// `expr`
    Expr,
    /// `ty`
    Ty,
    /// `ident`
    Ident,
    /// `path`
    Path,
    /// `lifetime`
    Lifetime,
    /// `literal`
    Literal,
    /// `meta`
    Meta,
    /// `vis`
    Vis,
    /// `tt`
    Tt,
}

impl FragmentKind {
    /// Every kind, in declaration order
    pub const ALL: [Self; 13] = [
        Self::Item,
        Self::Block,
        Self::Stmt,
        Self::Pat,
        Self::Expr,
        Self::Ty,
        Self::Ident,
        Self::Path,
        Self::Lifetime,
        Self::Literal,
        Self::Meta,
        Self::Vis,
        Self::Tt,
    ];

    /// Specifier as written after the colon in a matcher
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Block => "block",
            Self::Stmt => "stmt",
            Self::Pat => "pat",
            Self::Expr => "expr",
            Self::Ty => "ty",
            Self::Ident => "ident",
            Self::Path => "path",
            Self::Lifetime => "lifetime",
            Self::Literal => "literal",
            Self::Meta => "meta",
            Self::Vis => "vis",
            Self::Tt => "tt",
        }
    }

    /// Whether a successful match may consume no tokens
    pub const fn can_be_empty(self) -> bool {
        matches!(self, Self::Vis)
    }

    /// Tokens that may follow this fragment in a matcher without ambiguity
    ///
    /// `None` means anything may follow. The recogniser for the kind stops
    /// at each of these tokens at top level, which is what makes them safe.
    pub const fn stop_tokens(self) -> Option<&'static [&'static str]> {
        match self {
            Self::Expr | Self::Stmt => Some(&["=>", ",", ";"]),
            Self::Pat => Some(&["=>", ",", "=", "|", "if", "in"]),
            Self::Ty | Self::Path => Some(&[
                "{", "[", "=>", ",", ">", "=", ":", ";", "|", "as", "where",
            ]),
            Self::Vis => Some(&[","]),
            Self::Item
            | Self::Block
            | Self::Ident
            | Self::Lifetime
            | Self::Literal
            | Self::Meta
            | Self::Tt => None,
        }
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Error for an unknown fragment specifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown fragment specifier `{0}`")]
pub struct UnknownFragment(pub String);

impl FromStr for FragmentKind {
    type Err = UnknownFragment;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == text)
            .ok_or_else(|| UnknownFragment(text.to_string()))
    }
}

/// Recognises one fragment of `kind` starting at `pos`
///
/// Returns the exclusive end index of the fragment, or `None` if no valid
/// prefix exists. A `Vis` fragment may return `Some(pos)`.
pub fn parse_fragment(
    kind: FragmentKind,
    buffer: &TokenBuffer,
    pos: usize,
    interner: &Interner,
) -> Option<usize> {
    let mut cursor = Cursor::new(buffer, interner, pos);
    let parsed = match kind {
        FragmentKind::Item => item::item(&mut cursor),
        FragmentKind::Block => cursor.eat_tree(Delimiter::Brace),
        FragmentKind::Stmt => item::stmt(&mut cursor),
        FragmentKind::Pat => pat::pat(&mut cursor),
        FragmentKind::Expr => expr::expr(&mut cursor),
        FragmentKind::Ty => ty::ty(&mut cursor),
        FragmentKind::Ident => ident(&mut cursor),
        FragmentKind::Path => ty::path(&mut cursor, ty::PathStyle::Type),
        FragmentKind::Lifetime => cursor.eat_kind(TokenKind::Lifetime),
        FragmentKind::Literal => literal(&mut cursor),
        FragmentKind::Meta => meta(&mut cursor),
        FragmentKind::Vis => {
            vis(&mut cursor);
            true
        }
        FragmentKind::Tt => cursor.eat_token_tree(),
    };
    if !parsed {
        return None;
    }
    if cursor.pos == pos && !kind.can_be_empty() {
        return None;
    }
    Some(cursor.pos)
}

/// Whether the tokens form an expression that keeps its meaning when
/// substituted next to operators
///
/// Literals, paths, delimited groups and macro calls qualify.
pub fn is_atomic_expr(buffer: &TokenBuffer, start: usize, end: usize, interner: &Interner) -> bool {
    if end <= start {
        return true;
    }
    if end - start == 1 {
        return buffer.get(start).is_some_and(|token| {
            token.is_literal() || token.is_ident() || token.kind == TokenKind::CrateRoot
        });
    }
    if buffer.tree_end(start) == end {
        return true;
    }
    let mut cursor = Cursor::new(buffer, interner, start);
    if !ty::path(&mut cursor, ty::PathStyle::Expr) {
        return false;
    }
    if cursor.pos == end {
        return true;
    }
    cursor.eat_punct('!') && cursor.at_any_open() && cursor.eat_token_tree() && cursor.pos == end
}

/// End of the path written before the `!` of a macro call, such as
/// `a::b` or `$crate::m`
pub(crate) fn macro_path_end(buffer: &TokenBuffer, pos: usize, interner: &Interner) -> Option<usize> {
    let mut cursor = Cursor::new(buffer, interner, pos);
    ty::path(&mut cursor, ty::PathStyle::Mod).then_some(cursor.pos)
}

/// Multi-character operators, longest first
const COMPOSITE_OPS: &[&str] = &[
    "<<=", ">>=", "...", "..=", "::", "->", "=>", "==", "!=", "<=", ">=", "&&", "||", "+=", "-=",
    "*=", "/=", "%=", "^=", "&=", "|=", "<<", ">>", "..",
];

/// Read-only cursor over a token buffer
///
/// The cursor treats a closing delimiter as the end of input, so
/// recognisers cannot leave the tree they started in.
pub(crate) struct Cursor<'toks> {
    buffer: &'toks TokenBuffer,
    interner: &'toks Interner,
    pub(crate) pos: usize,
}

impl<'toks> Cursor<'toks> {
    pub(crate) fn new(buffer: &'toks TokenBuffer, interner: &'toks Interner, pos: usize) -> Self {
        Self {
            buffer,
            interner,
            pos,
        }
    }

    /// Token at `pos + offset`, or `None` past the end of the current tree
    pub(crate) fn nth(&self, offset: usize) -> Option<&'toks Token> {
        let mut index = self.pos;
        for _ in 0..offset {
            self.buffer
                .get(index)
                .filter(|token| !matches!(token.kind, TokenKind::Close(_)))?;
            index = self.buffer.tree_end(index);
        }
        self.buffer
            .get(index)
            .filter(|token| !matches!(token.kind, TokenKind::Close(_)))
    }

    /// Token at `pos + offset` without skipping trees, for looking inside
    /// the group at the cursor
    pub(crate) fn raw(&self, offset: usize) -> Option<&'toks Token> {
        self.buffer.get(self.pos + offset)
    }

    pub(crate) fn raw_is_punct(&self, offset: usize, ch: char) -> bool {
        self.raw(offset).is_some_and(|token| token.is_punct(ch))
    }

    pub(crate) fn peek(&self) -> Option<&'toks Token> {
        self.nth(0)
    }

    pub(crate) fn at_end(&self) -> bool {
        self.peek().is_none()
    }

    pub(crate) fn text(&self, token: &Token) -> &'toks str {
        self.interner.resolve(&token.text)
    }

    pub(crate) fn at_punct(&self, ch: char) -> bool {
        self.peek().is_some_and(|token| token.is_punct(ch))
    }

    pub(crate) fn eat_punct(&mut self, ch: char) -> bool {
        let found = self.at_punct(ch);
        if found {
            self.pos += 1;
        }
        found
    }

    /// Length in tokens of the composite operator at the cursor
    ///
    /// Glued punctuation is combined by maximal munch; a lone punct has
    /// length one.
    pub(crate) fn op_len(&self) -> usize {
        let Some(first) = self.peek() else {
            return 0;
        };
        if !matches!(first.kind, TokenKind::Punct(_)) {
            return 0;
        }
        let mut run = String::new();
        let mut index = self.pos;
        while let Some(token) = self.buffer.get(index) {
            let TokenKind::Punct(ch) = token.kind else {
                break;
            };
            run.push(ch);
            index += 1;
            if token.spacing != Spacing::Joint || run.len() == 3 {
                break;
            }
        }
        COMPOSITE_OPS
            .iter()
            .find(|op| run.starts_with(*op))
            .map_or(1, |op| op.len())
    }

    /// The composite operator at the cursor, as text
    pub(crate) fn op(&self) -> Option<String> {
        let len = self.op_len();
        if len == 0 {
            return None;
        }
        Some(
            (0..len)
                .filter_map(|offset| match self.buffer.get(self.pos + offset)?.kind {
                    TokenKind::Punct(ch) => Some(ch),
                    _ => None,
                })
                .collect(),
        )
    }

    pub(crate) fn at_op(&self, op: &str) -> bool {
        self.op().is_some_and(|found| found == op)
    }

    pub(crate) fn eat_op(&mut self, op: &str) -> bool {
        let found = self.at_op(op);
        if found {
            self.pos += op.len();
        }
        found
    }

    pub(crate) fn at_kw(&self, keyword: &str) -> bool {
        self.peek()
            .is_some_and(|token| token.is_ident() && self.text(token) == keyword)
    }

    pub(crate) fn nth_is_kw(&self, offset: usize, keyword: &str) -> bool {
        self.nth(offset)
            .is_some_and(|token| token.is_ident() && self.text(token) == keyword)
    }

    pub(crate) fn eat_kw(&mut self, keyword: &str) -> bool {
        let found = self.at_kw(keyword);
        if found {
            self.pos += 1;
        }
        found
    }

    pub(crate) fn at_kind(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|token| token.kind == kind)
    }

    pub(crate) fn eat_kind(&mut self, kind: TokenKind) -> bool {
        let found = self.at_kind(kind);
        if found {
            self.pos += 1;
        }
        found
    }

    /// Identifier that is not a reserved word
    pub(crate) fn at_plain_ident(&self) -> bool {
        self.peek().is_some_and(|token| {
            token.is_ident() && !mx_tt::is_keyword(self.text(token)) && self.text(token) != "_"
        })
    }

    pub(crate) fn eat_plain_ident(&mut self) -> bool {
        let found = self.at_plain_ident();
        if found {
            self.pos += 1;
        }
        found
    }

    pub(crate) fn at_open(&self, delimiter: Delimiter) -> bool {
        self.at_kind(TokenKind::Open(delimiter))
    }

    pub(crate) fn at_any_open(&self) -> bool {
        self.peek()
            .is_some_and(|token| matches!(token.kind, TokenKind::Open(_)))
    }

    /// Consumes a whole delimited tree with the given delimiter
    pub(crate) fn eat_tree(&mut self, delimiter: Delimiter) -> bool {
        let found = self.at_open(delimiter);
        if found {
            self.pos = self.buffer.tree_end(self.pos);
        }
        found
    }

    /// Consumes one token tree: a delimited group, a composite operator or
    /// a single token
    pub(crate) fn eat_token_tree(&mut self) -> bool {
        let Some(token) = self.peek() else {
            return false;
        };
        self.pos = match token.kind {
            TokenKind::Open(_) => self.buffer.tree_end(self.pos),
            TokenKind::Punct(_) => self.pos + self.op_len(),
            _ => self.pos + 1,
        };
        true
    }

    /// Consumes token trees until `stop` holds at top level or input ends
    pub(crate) fn skip_until(&mut self, stop: impl Fn(&Self) -> bool) {
        while !self.at_end() && !stop(self) {
            self.eat_token_tree();
        }
    }

    pub(crate) fn at_literal(&self) -> bool {
        self.peek().is_some_and(|token| {
            token.is_literal() || (token.is_ident() && matches!(self.text(token), "true" | "false"))
        })
    }
}

fn ident(cursor: &mut Cursor<'_>) -> bool {
    let accepted = cursor.peek().is_some_and(|token| match token.kind {
        TokenKind::Ident => cursor.text(token) != "_",
        TokenKind::CrateRoot => true,
        _ => false,
    });
    if accepted {
        cursor.pos += 1;
    }
    accepted
}

fn literal(cursor: &mut Cursor<'_>) -> bool {
    let start = cursor.pos;
    if cursor.eat_punct('-') {
        let numeric = cursor.peek().is_some_and(|token| {
            matches!(
                token.kind,
                TokenKind::Literal(LiteralKind::Integer | LiteralKind::Float)
            )
        });
        if !numeric {
            cursor.pos = start;
            return false;
        }
    }
    if cursor.at_literal() {
        cursor.pos += 1;
        return true;
    }
    cursor.pos = start;
    false
}

/// Attribute content: `path`, `path(...)`, `path = expr`
fn meta(cursor: &mut Cursor<'_>) -> bool {
    cursor.eat_kw("unsafe");
    if !ty::path(cursor, ty::PathStyle::Mod) {
        return false;
    }
    if cursor.at_any_open() {
        return cursor.eat_token_tree();
    }
    if cursor.at_op("=") {
        let before = cursor.pos;
        cursor.pos += 1;
        if !expr::expr(cursor) {
            cursor.pos = before;
        }
    }
    true
}

/// Visibility; consumes nothing when absent
pub(crate) fn vis(cursor: &mut Cursor<'_>) {
    if cursor.eat_kw("crate") {
        return;
    }
    if !cursor.eat_kw("pub") {
        return;
    }
    if !cursor.at_open(Delimiter::Paren) {
        return;
    }
    // `pub (crate)`, `pub(self)`, `pub(super)`, `pub(in path)`; any other
    // parenthesised group belongs to what follows
    let restricted = cursor.raw(1).is_some_and(|token| {
        token.is_ident() && matches!(cursor.text(token), "crate" | "self" | "super" | "in")
    });
    if restricted {
        cursor.eat_token_tree();
    }
}

/// Attributes `#[...]` and `#![...]`
pub(crate) fn attributes(cursor: &mut Cursor<'_>) {
    loop {
        let start = cursor.pos;
        if !cursor.eat_punct('#') {
            return;
        }
        cursor.eat_punct('!');
        if !cursor.eat_tree(Delimiter::Bracket) {
            cursor.pos = start;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mx_tt::{lex, SyntaxContext};

    /// Renders the prefix each kind consumes, or `-` if it fails
    fn consumed(kind: FragmentKind, text: &str) -> String {
        let interner = Interner::new();
        let buffer = lex(text, &interner, SyntaxContext::ROOT).unwrap();
        match parse_fragment(kind, &buffer, 0, &interner) {
            Some(end) => {
                let Some(span) = buffer.span_of(0..end) else {
                    return String::new();
                };
                text[span.range()].to_string()
            }
            None => "-".to_string(),
        }
    }

    #[test]
    fn test_fragment_kind_round_trips_specifier() {
        for kind in FragmentKind::ALL {
            assert_eq!(kind.as_str().parse::<FragmentKind>(), Ok(kind));
        }
        assert!("expression".parse::<FragmentKind>().is_err());
    }

    #[test]
    fn test_ident_accepts_keywords() {
        assert_eq!(consumed(FragmentKind::Ident, "fn x"), "fn");
        assert_eq!(consumed(FragmentKind::Ident, "r#type"), "r#type");
        assert_eq!(consumed(FragmentKind::Ident, "_"), "-");
        assert_eq!(consumed(FragmentKind::Ident, "1"), "-");
    }

    #[test]
    fn test_vis_may_be_empty() {
        assert_eq!(consumed(FragmentKind::Vis, "fn"), "");
        assert_eq!(consumed(FragmentKind::Vis, "pub(crate) fn"), "pub(crate)");
        assert_eq!(consumed(FragmentKind::Vis, "pub (a, b)"), "pub");
    }

    #[test]
    fn test_literal_and_lifetime() {
        assert_eq!(consumed(FragmentKind::Literal, "-1.5 x"), "-1.5");
        assert_eq!(consumed(FragmentKind::Literal, "false"), "false");
        assert_eq!(consumed(FragmentKind::Literal, "-x"), "-");
        assert_eq!(consumed(FragmentKind::Lifetime, "'a b"), "'a");
    }

    #[test]
    fn test_tt_takes_one_tree() {
        assert_eq!(consumed(FragmentKind::Tt, "(a b) c"), "(a b)");
        assert_eq!(consumed(FragmentKind::Tt, "=> x"), "=>");
        assert_eq!(consumed(FragmentKind::Tt, "= > x"), "=");
    }

    #[test]
    fn test_meta_and_block() {
        assert_eq!(consumed(FragmentKind::Meta, "derive(Debug) x"), "derive(Debug)");
        assert_eq!(consumed(FragmentKind::Meta, "doc = \"hi\""), "doc = \"hi\"");
        assert_eq!(consumed(FragmentKind::Block, "{ a; b } c"), "{ a; b }");
        assert_eq!(consumed(FragmentKind::Block, "a"), "-");
    }

    #[test]
    fn test_atomic_expressions() {
        let interner = Interner::new();
        let atomic = |text: &str| {
            let buffer = lex(text, &interner, SyntaxContext::ROOT).unwrap();
            is_atomic_expr(&buffer, 0, buffer.len(), &interner)
        };
        assert!(atomic("1"));
        assert!(atomic("a::b"));
        assert!(atomic("(1 + 1)"));
        assert!(atomic("[1, 2]"));
        assert!(atomic("vec![1]"));
        assert!(!atomic("1 + 1"));
        assert!(!atomic("-a"));
        assert!(!atomic("a.b()"));
    }
}
