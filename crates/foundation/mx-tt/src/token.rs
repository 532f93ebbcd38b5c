//! Token types

use mx_intern::{Interner, Symbol};
use mx_span::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hygiene context attached to every token
///
/// Identifier equality for name resolution is `(text, context)`. The root
/// context belongs to text the user wrote directly.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SyntaxContext(pub u32);

impl SyntaxContext {
    /// Context of user-written source text
    pub const ROOT: Self = Self(0);

    /// Whether this is the root context
    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Display for SyntaxContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "#{}", self.0)
    }
}

/// Delimiter of a token tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Delimiter {
    /// Parentheses (...)
    Paren,
    /// Brackets [...]
    Bracket,
    /// Braces {...}
    Brace,
}

impl Delimiter {
    /// Opening character
    pub const fn open_char(self) -> char {
        match self {
            Self::Paren => '(',
            Self::Bracket => '[',
            Self::Brace => '{',
        }
    }

    /// Closing character
    pub const fn close_char(self) -> char {
        match self {
            Self::Paren => ')',
            Self::Bracket => ']',
            Self::Brace => '}',
        }
    }
}

/// Whether a punctuation token is immediately followed by another one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Spacing {
    /// Followed by whitespace, a non-punct token, or nothing
    Alone,
    /// Glued to the next punctuation character (`=` in `=>`)
    Joint,
}

/// Literal kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiteralKind {
    /// Integer literal, any base, optional suffix
    Integer,
    /// Float literal
    Float,
    /// Character literal
    Char,
    /// Byte literal
    Byte,
    /// String literal
    Str,
    /// Raw string literal
    RawStr,
    /// Byte string literal
    ByteStr,
    /// Raw byte string literal
    RawByteStr,
    /// C string literal
    CStr,
}

/// Token kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    /// Identifier or keyword (including `_` and raw `r#ident`)
    Ident,
    /// Lifetime or label (`'a`)
    Lifetime,
    /// Literal
    Literal(LiteralKind),
    /// Single punctuation character
    Punct(char),
    /// Opening delimiter
    Open(Delimiter),
    /// Closing delimiter
    Close(Delimiter),
    /// Resolved `$crate`; the text is the defining crate's name
    CrateRoot,
}

/// A single token
///
/// Tokens are small and `Copy`: text lives in the interner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    /// Kind
    pub kind: TokenKind,
    /// Interned text, exactly as written
    pub text: Symbol,
    /// Byte offsets inside the unit the token was lexed from
    pub span: Span,
    /// Spacing relative to the following token
    pub spacing: Spacing,
    /// Hygiene context
    pub ctx: SyntaxContext,
}

impl Token {
    /// Creates a token with root context and `Alone` spacing
    pub fn new(kind: TokenKind, text: Symbol, span: Span) -> Self {
        Self {
            kind,
            text,
            span,
            spacing: Spacing::Alone,
            ctx: SyntaxContext::ROOT,
        }
    }

    /// Same token with a different hygiene context
    #[must_use]
    pub fn with_ctx(mut self, ctx: SyntaxContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Compares kind and text, ignoring span, spacing and hygiene
    ///
    /// This is the equality used when a matcher literal is compared with
    /// invocation input.
    pub fn same_text(&self, other: &Self) -> bool {
        self.kind == other.kind && self.text == other.text
    }

    /// Identifier equality for binding purposes: `(text, context)`
    pub fn same_binding(&self, other: &Self) -> bool {
        self.kind == TokenKind::Ident
            && other.kind == TokenKind::Ident
            && self.text == other.text
            && self.ctx == other.ctx
    }

    /// Whether this is the punctuation character `ch`
    pub fn is_punct(&self, ch: char) -> bool {
        self.kind == TokenKind::Punct(ch)
    }

    /// Whether this is an identifier token
    pub fn is_ident(&self) -> bool {
        self.kind == TokenKind::Ident
    }

    /// Whether this is an identifier spelled `text`
    pub fn is_keyword(&self, text: &str, interner: &Interner) -> bool {
        self.kind == TokenKind::Ident && interner.resolve(&self.text) == text
    }

    /// Whether this is a literal token
    pub fn is_literal(&self) -> bool {
        matches!(self.kind, TokenKind::Literal(_))
    }

    /// Text as it should appear in rendered output
    pub fn display_text<'int>(&self, interner: &'int Interner) -> DisplayText<'int> {
        let text = interner.resolve(&self.text);
        if self.kind == TokenKind::CrateRoot {
            DisplayText::CrateRoot(text)
        } else {
            DisplayText::Plain(text)
        }
    }
}

/// Rendered text of one token
#[derive(Debug, Clone, Copy)]
pub enum DisplayText<'int> {
    /// Text is printed verbatim
    Plain(&'int str),
    /// Printed as `::name`
    CrateRoot(&'int str),
}

impl fmt::Display for DisplayText<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(text) => formatter.write_str(text),
            Self::CrateRoot(name) => write!(formatter, "::{name}"),
        }
    }
}

/// Reserved words of the host language
pub const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true",
    "type", "unsafe", "use", "where", "while", "yield", "box", "macro", "try", "gen",
];

/// Whether `text` is a reserved word
pub fn is_keyword(text: &str) -> bool {
    KEYWORDS.contains(&text)
}
