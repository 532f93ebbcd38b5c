//! Types, paths and generic arguments

use super::Cursor;
use mx_tt::{Delimiter, TokenKind};

/// Where a path appears, which decides how generic arguments are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PathStyle {
    /// `a::b<T>` and `Fn(A) -> B`
    Type,
    /// `a::b::<T>`
    Expr,
    /// `a::b`, no generic arguments
    Mod,
}

fn at_segment(cursor: &Cursor<'_>) -> bool {
    cursor.peek().is_some_and(|token| match token.kind {
        TokenKind::Ident => cursor.text(token) != "_",
        TokenKind::CrateRoot => true,
        _ => false,
    })
}

/// Whether a `<` at the cursor opens generic arguments rather than being
/// part of `<=`, `<<=` or `<-`
fn at_generic_open(cursor: &Cursor<'_>) -> bool {
    cursor.at_punct('<') && !cursor.at_op("<=") && !cursor.at_op("<<=")
}

pub(crate) fn path(cursor: &mut Cursor<'_>, style: PathStyle) -> bool {
    let start = cursor.pos;
    if style != PathStyle::Mod && at_generic_open(cursor) {
        if !qualified_self(cursor) || !cursor.eat_op("::") {
            cursor.pos = start;
            return false;
        }
    } else {
        cursor.eat_op("::");
    }
    if !at_segment(cursor) {
        cursor.pos = start;
        return false;
    }
    cursor.pos += 1;

    loop {
        let before = cursor.pos;
        if style == PathStyle::Type {
            if at_generic_open(cursor) {
                if !generic_args(cursor) {
                    cursor.pos = before;
                    return true;
                }
            } else if cursor.at_open(Delimiter::Paren) {
                cursor.eat_token_tree();
                if cursor.at_op("->") {
                    let arrow = cursor.pos;
                    cursor.pos += 2;
                    if !ty(cursor) {
                        cursor.pos = arrow;
                    }
                }
                return true;
            }
        }

        let segment_start = cursor.pos;
        if !cursor.eat_op("::") {
            return true;
        }
        if style != PathStyle::Mod && at_generic_open(cursor) {
            if !generic_args(cursor) {
                cursor.pos = segment_start;
                return true;
            }
            continue;
        }
        if !at_segment(cursor) {
            cursor.pos = segment_start;
            return true;
        }
        cursor.pos += 1;
    }
}

/// `<T as Trait>` at the start of a qualified path
fn qualified_self(cursor: &mut Cursor<'_>) -> bool {
    if !cursor.eat_punct('<') || !ty(cursor) {
        return false;
    }
    if cursor.eat_kw("as") && !path(cursor, PathStyle::Type) {
        return false;
    }
    cursor.eat_punct('>')
}

/// `<...>` generic arguments
pub(crate) fn generic_args(cursor: &mut Cursor<'_>) -> bool {
    let start = cursor.pos;
    if !cursor.eat_punct('<') {
        return false;
    }
    loop {
        if cursor.eat_punct('>') {
            return true;
        }
        if !generic_arg(cursor) {
            cursor.pos = start;
            return false;
        }
        if cursor.eat_punct(',') {
            continue;
        }
        if cursor.eat_punct('>') {
            return true;
        }
        cursor.pos = start;
        return false;
    }
}

fn generic_arg(cursor: &mut Cursor<'_>) -> bool {
    if cursor.eat_kind(TokenKind::Lifetime) {
        return true;
    }
    if cursor.at_open(Delimiter::Brace) {
        return cursor.eat_token_tree();
    }
    if cursor.at_literal() || cursor.at_punct('-') {
        return super::literal(cursor);
    }
    // Associated item bindings: `Item = T`, `Item: Bound`
    if cursor.at_plain_ident() {
        if cursor.raw_is_punct(1, '=') && !cursor.raw_is_punct(2, '=') {
            cursor.pos += 2;
            return ty(cursor);
        }
        if cursor.raw_is_punct(1, ':') && !cursor.raw_is_punct(2, ':') {
            cursor.pos += 2;
            return bounds(cursor);
        }
    }
    ty(cursor)
}

/// Skips `<...>` generic parameters by counting angle brackets
pub(crate) fn generic_params(cursor: &mut Cursor<'_>) -> bool {
    let start = cursor.pos;
    if !cursor.eat_punct('<') {
        return false;
    }
    let mut depth = 1usize;
    while depth > 0 {
        if cursor.at_end() {
            cursor.pos = start;
            return false;
        }
        if cursor.at_op("->") || cursor.at_op("=>") {
            cursor.pos += 2;
        } else if cursor.eat_punct('<') {
            depth += 1;
        } else if cursor.eat_punct('>') {
            depth -= 1;
        } else if cursor.at_any_open() {
            cursor.eat_token_tree();
        } else {
            cursor.pos += 1;
        }
    }
    true
}

/// `Bound + Bound + 'a`
pub(crate) fn bounds(cursor: &mut Cursor<'_>) -> bool {
    if !bound(cursor) {
        return false;
    }
    loop {
        let before = cursor.pos;
        if !cursor.eat_punct('+') {
            return true;
        }
        if !bound(cursor) {
            // A trailing `+` is allowed
            if cursor.at_end() || cursor.at_punct(',') || cursor.at_punct('>') {
                return true;
            }
            cursor.pos = before;
            return true;
        }
    }
}

fn bound(cursor: &mut Cursor<'_>) -> bool {
    if cursor.eat_kind(TokenKind::Lifetime) {
        return true;
    }
    if cursor.at_open(Delimiter::Paren) {
        return cursor.eat_token_tree();
    }
    let start = cursor.pos;
    cursor.eat_punct('?');
    if cursor.at_punct('~') && cursor.nth_is_kw(1, "const") {
        cursor.pos += 2;
    }
    if cursor.eat_kw("for") && !generic_params(cursor) {
        cursor.pos = start;
        return false;
    }
    if !path(cursor, PathStyle::Type) {
        cursor.pos = start;
        return false;
    }
    true
}

/// Any type
pub(crate) fn ty(cursor: &mut Cursor<'_>) -> bool {
    let start = cursor.pos;
    let Some(token) = cursor.peek() else {
        return false;
    };
    let parsed = match token.kind {
        TokenKind::Open(Delimiter::Paren | Delimiter::Bracket) => cursor.eat_token_tree(),
        TokenKind::Punct('!') => {
            cursor.pos += 1;
            true
        }
        TokenKind::Punct('&') => {
            // `&&T` is two references
            cursor.pos += 1;
            cursor.eat_punct('&');
            cursor.eat_kind(TokenKind::Lifetime);
            cursor.eat_kw("mut");
            ty(cursor)
        }
        TokenKind::Punct('*') => {
            cursor.pos += 1;
            (cursor.eat_kw("const") || cursor.eat_kw("mut")) && ty(cursor)
        }
        TokenKind::Punct('<') => path(cursor, PathStyle::Type),
        TokenKind::Ident => match cursor.text(token) {
            "_" => {
                cursor.pos += 1;
                true
            }
            "fn" | "unsafe" | "extern" => bare_fn(cursor),
            "for" => {
                cursor.pos += 1;
                generic_params(cursor) && ty(cursor)
            }
            "impl" | "dyn" => {
                cursor.pos += 1;
                bounds(cursor)
            }
            _ => path_or_macro(cursor),
        },
        TokenKind::CrateRoot => path_or_macro(cursor),
        _ => false,
    };
    if !parsed {
        cursor.pos = start;
    }
    parsed
}

fn path_or_macro(cursor: &mut Cursor<'_>) -> bool {
    if !path(cursor, PathStyle::Type) {
        return false;
    }
    if cursor.at_punct('!') && cursor.nth(1).is_some_and(|token| matches!(token.kind, TokenKind::Open(_))) {
        cursor.pos += 1;
        cursor.eat_token_tree();
    }
    true
}

fn bare_fn(cursor: &mut Cursor<'_>) -> bool {
    cursor.eat_kw("unsafe");
    if cursor.eat_kw("extern") {
        cursor.eat_kind(TokenKind::Literal(mx_tt::LiteralKind::Str));
    }
    if !cursor.eat_kw("fn") || !cursor.eat_tree(Delimiter::Paren) {
        return false;
    }
    if cursor.at_op("->") {
        let arrow = cursor.pos;
        cursor.pos += 2;
        if !ty(cursor) {
            cursor.pos = arrow;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use crate::fragment::{parse_fragment, FragmentKind};
    use mx_intern::Interner;
    use mx_tt::{lex, SyntaxContext};

    fn consumed(kind: FragmentKind, text: &str) -> String {
        let interner = Interner::new();
        let buffer = lex(text, &interner, SyntaxContext::ROOT).unwrap();
        match parse_fragment(kind, &buffer, 0, &interner) {
            Some(end) => buffer
                .span_of(0..end)
                .map(|span| text[span.range()].to_string())
                .unwrap_or_default(),
            None => "-".to_string(),
        }
    }

    #[test]
    fn test_generic_types() {
        assert_eq!(consumed(FragmentKind::Ty, "Vec<Vec<u8>> = x"), "Vec<Vec<u8>>");
        assert_eq!(consumed(FragmentKind::Ty, "HashMap<K, V>, x"), "HashMap<K, V>");
        assert_eq!(consumed(FragmentKind::Ty, "Iterator<Item = T> {"), "Iterator<Item = T>");
        assert_eq!(consumed(FragmentKind::Ty, "[u8; 4] x"), "[u8; 4]");
        assert_eq!(consumed(FragmentKind::Ty, "&'a mut T,"), "&'a mut T");
    }

    #[test]
    fn test_function_and_trait_object_types() {
        assert_eq!(consumed(FragmentKind::Ty, "fn(u8) -> u16;"), "fn(u8) -> u16");
        assert_eq!(consumed(FragmentKind::Ty, "Box<dyn Fn(u8) -> u8 + Send>"), "Box<dyn Fn(u8) -> u8 + Send>");
        assert_eq!(consumed(FragmentKind::Ty, "impl Iterator<Item = u8> + 'a =>"), "impl Iterator<Item = u8> + 'a");
        assert_eq!(consumed(FragmentKind::Ty, "<T as Trait>::Out x"), "<T as Trait>::Out");
    }

    #[test]
    fn test_paths() {
        assert_eq!(consumed(FragmentKind::Path, "a::b::c d"), "a::b::c");
        assert_eq!(consumed(FragmentKind::Path, "::std::vec::Vec<T>"), "::std::vec::Vec<T>");
        assert_eq!(consumed(FragmentKind::Path, "a:: 1"), "a");
        assert_eq!(consumed(FragmentKind::Path, "1"), "-");
    }
}
