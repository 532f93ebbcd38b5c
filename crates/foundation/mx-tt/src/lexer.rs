//! Lexer for macro definitions and invocation bodies
//!
//! Raw tokens are produced by a `logos` state machine. Comments are dropped,
//! except doc comments, which are lowered to `#[doc = "..."]` attributes so
//! macro matchers see them like any other attribute.

use crate::buffer::TokenBuffer;
use crate::error::LexError;
use crate::token::{Delimiter, LiteralKind, Spacing, SyntaxContext, Token, TokenKind};
use logos::{Lexer, Logos};
use mx_intern::Interner;
use mx_span::Span;
use std::iter;

/// Raw token as recognised by the state machine
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum RawToken {
    #[regex(r"//[^\n]*")]
    LineComment,

    #[token("/*", block_comment)]
    BlockComment,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    #[regex(r"r#[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    #[regex(r"'[A-Za-z_][A-Za-z0-9_]*")]
    Lifetime,

    #[regex(r"[0-9][0-9_]*([ui](8|16|32|64|128|size))?")]
    #[regex(r"0x[0-9a-fA-F_]+([ui](8|16|32|64|128|size))?")]
    #[regex(r"0o[0-7_]+([ui](8|16|32|64|128|size))?")]
    #[regex(r"0b[01_]+([ui](8|16|32|64|128|size))?")]
    Integer,

    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*(f32|f64)?")]
    #[regex(r"[0-9][0-9_]*(\.[0-9][0-9_]*)?[eE][+-]?[0-9_]+(f32|f64)?")]
    #[regex(r"[0-9][0-9_]*(f32|f64)")]
    Float,

    #[regex(r"'([^'\\\n]|\\[nrt0\\'\x22]|\\x[0-9a-fA-F]{2}|\\u\{[0-9a-fA-F_]{1,6}\})'")]
    Char,

    #[regex(r"b'([^'\\\n]|\\[nrt0\\'\x22]|\\x[0-9a-fA-F]{2})'")]
    Byte,

    #[regex(r#""([^"\\]|\\(.|\n))*""#)]
    Str,

    #[regex(r#"b"([^"\\]|\\(.|\n))*""#)]
    ByteStr,

    #[regex(r#"c"([^"\\]|\\(.|\n))*""#)]
    CStr,

    #[regex(r##"r#*""##, raw_string)]
    RawStr,

    #[regex(r##"br#*""##, raw_string)]
    RawByteStr,

    #[token("(")]
    OpenParen,
    #[token(")")]
    CloseParen,
    #[token("[")]
    OpenBracket,
    #[token("]")]
    CloseBracket,
    #[token("{")]
    OpenBrace,
    #[token("}")]
    CloseBrace,

    #[regex(r"[!#$%&*+,\-./:;<=>?@^|~]")]
    Punct,
}

/// Skips a possibly nested block comment after its opening `/*`
fn block_comment(lex: &mut Lexer<'_, RawToken>) -> bool {
    let bytes = lex.remainder().as_bytes();
    let mut depth = 1usize;
    let mut index = 0;
    while index + 1 < bytes.len() {
        match (bytes[index], bytes[index + 1]) {
            (b'/', b'*') => {
                depth += 1;
                index += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                index += 2;
                if depth == 0 {
                    lex.bump(index);
                    return true;
                }
            }
            _ => index += 1,
        }
    }
    false
}

/// Consumes the body of a raw string up to the quote and hash run that
/// closes it
fn raw_string(lex: &mut Lexer<'_, RawToken>) -> bool {
    let hashes = lex.slice().bytes().filter(|&byte| byte == b'#').count();
    let mut terminator = String::with_capacity(hashes + 1);
    terminator.push('"');
    terminator.extend(iter::repeat_n('#', hashes));
    match lex.remainder().find(&terminator) {
        Some(position) => {
            lex.bump(position + terminator.len());
            true
        }
        None => false,
    }
}

/// Doc comment style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocStyle {
    Outer,
    Inner,
}

/// Classifies a comment, returning its doc style and text if it is a doc comment
fn doc_comment(text: &str) -> Option<(DocStyle, &str)> {
    if let Some(rest) = text.strip_prefix("//") {
        if rest.starts_with('/') && !rest.starts_with("//") {
            return Some((DocStyle::Outer, &rest[1..]));
        }
        if let Some(body) = rest.strip_prefix('!') {
            return Some((DocStyle::Inner, body));
        }
        return None;
    }
    let body = text.strip_prefix("/*")?.strip_suffix("*/")?;
    if let Some(doc) = body.strip_prefix('*') {
        // `/**/` and `/*** ... */` are ordinary comments
        if !body.is_empty() && !doc.starts_with('*') && !doc.is_empty() {
            return Some((DocStyle::Outer, doc));
        }
        return None;
    }
    body.strip_prefix('!').map(|doc| (DocStyle::Inner, doc))
}

/// Escapes comment text for use inside a string literal
fn escape_doc(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('"');
    for ch in text.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            other => escaped.push(other),
        }
    }
    escaped.push('"');
    escaped
}

/// Lexes `text` into a balanced token buffer
///
/// Every produced token carries `ctx`. Spans are byte offsets into `text`.
///
/// # Errors
///
/// Returns an error on input that is not a token or on unbalanced delimiters.
pub fn lex(text: &str, interner: &Interner, ctx: SyntaxContext) -> Result<TokenBuffer, LexError> {
    let mut tokens = Vec::new();
    let mut lexer = RawToken::lexer(text);

    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let span = Span::new(range.start as u32, range.end as u32);
        let slice = lexer.slice();
        let Ok(raw) = result else {
            return Err(LexError::InvalidToken {
                text: slice.to_string(),
                span,
            });
        };

        let kind = match raw {
            RawToken::LineComment | RawToken::BlockComment => {
                if let Some((style, doc)) = doc_comment(slice) {
                    lower_doc(&mut tokens, style, doc, span, interner);
                }
                continue;
            }
            RawToken::Ident => TokenKind::Ident,
            RawToken::Lifetime => TokenKind::Lifetime,
            RawToken::Integer => TokenKind::Literal(LiteralKind::Integer),
            RawToken::Float => TokenKind::Literal(LiteralKind::Float),
            RawToken::Char => TokenKind::Literal(LiteralKind::Char),
            RawToken::Byte => TokenKind::Literal(LiteralKind::Byte),
            RawToken::Str => TokenKind::Literal(LiteralKind::Str),
            RawToken::ByteStr => TokenKind::Literal(LiteralKind::ByteStr),
            RawToken::CStr => TokenKind::Literal(LiteralKind::CStr),
            RawToken::RawStr => TokenKind::Literal(LiteralKind::RawStr),
            RawToken::RawByteStr => TokenKind::Literal(LiteralKind::RawByteStr),
            RawToken::OpenParen => TokenKind::Open(Delimiter::Paren),
            RawToken::CloseParen => TokenKind::Close(Delimiter::Paren),
            RawToken::OpenBracket => TokenKind::Open(Delimiter::Bracket),
            RawToken::CloseBracket => TokenKind::Close(Delimiter::Bracket),
            RawToken::OpenBrace => TokenKind::Open(Delimiter::Brace),
            RawToken::CloseBrace => TokenKind::Close(Delimiter::Brace),
            RawToken::Punct => match slice.chars().next() {
                Some(ch) => TokenKind::Punct(ch),
                None => continue,
            },
        };
        tokens.push(Token::new(kind, interner.intern(slice), span));
    }

    for index in 1..tokens.len() {
        let (previous, current) = (tokens[index - 1], tokens[index]);
        let adjacent = previous.span.end == current.span.start;
        if adjacent
            && matches!(previous.kind, TokenKind::Punct(_))
            && matches!(current.kind, TokenKind::Punct(_))
        {
            tokens[index - 1].spacing = Spacing::Joint;
        }
    }

    for token in &mut tokens {
        token.ctx = ctx;
    }
    TokenBuffer::new(tokens)
}

/// Appends `#[doc = "..."]` (or `#![doc = "..."]`) for one doc comment
fn lower_doc(tokens: &mut Vec<Token>, style: DocStyle, doc: &str, span: Span, interner: &Interner) {
    let mut push = |kind: TokenKind, text: &str| {
        tokens.push(Token::new(kind, interner.intern(text), span));
    };
    push(TokenKind::Punct('#'), "#");
    if style == DocStyle::Inner {
        push(TokenKind::Punct('!'), "!");
    }
    push(TokenKind::Open(Delimiter::Bracket), "[");
    push(TokenKind::Ident, "doc");
    push(TokenKind::Punct('='), "=");
    push(TokenKind::Literal(LiteralKind::Str), &escape_doc(doc));
    push(TokenKind::Close(Delimiter::Bracket), "]");
}
