//! Items and statements

use super::pat::pat;
use super::ty::{self, PathStyle};
use super::{attributes, expr, vis, Cursor};
use mx_tt::{Delimiter, LiteralKind, TokenKind};

/// Keywords that may precede `fn`
const FN_QUALIFIERS: &[&str] = &["const", "async", "unsafe", "default", "safe"];

pub(crate) fn item(cursor: &mut Cursor<'_>) -> bool {
    let start = cursor.pos;
    attributes(cursor);
    vis(cursor);
    if !item_body(cursor) {
        cursor.pos = start;
        return false;
    }
    true
}

fn item_body(cursor: &mut Cursor<'_>) -> bool {
    let Some(token) = cursor.peek() else {
        return false;
    };
    if !token.is_ident() && token.kind != TokenKind::CrateRoot && !cursor.at_op("::") {
        return false;
    }
    let text = cursor.text(token);
    match text {
        "fn" => function(cursor),
        "const" if cursor.nth_is_kw(1, "fn") || cursor.nth_is_kw(1, "unsafe") || cursor.nth_is_kw(1, "async") => {
            function(cursor)
        }
        "async" | "unsafe" | "default" | "safe" if !cursor.nth_is_kw(1, "impl") && !cursor.nth_is_kw(1, "trait") => {
            let start = cursor.pos;
            if function(cursor) {
                return true;
            }
            // `default!(...)` and friends are ordinary macro calls
            cursor.pos = start;
            macro_call_item(cursor)
        }
        "unsafe" | "default" => {
            cursor.pos += 1;
            item_body(cursor)
        }
        "extern" => extern_item(cursor),
        "struct" | "union" => {
            cursor.pos += 1;
            cursor.eat_plain_ident() && adt_body(cursor)
        }
        "enum" => {
            cursor.pos += 1;
            cursor.eat_plain_ident() && generics_and_where(cursor) && cursor.eat_tree(Delimiter::Brace)
        }
        "trait" | "auto" => {
            cursor.eat_kw("auto");
            cursor.eat_kw("trait") && cursor.eat_plain_ident() && skip_header(cursor) && cursor.eat_tree(Delimiter::Brace)
        }
        "impl" => {
            cursor.pos += 1;
            skip_header(cursor) && cursor.eat_tree(Delimiter::Brace)
        }
        "mod" => {
            cursor.pos += 1;
            cursor.eat_plain_ident() && (cursor.eat_tree(Delimiter::Brace) || cursor.eat_punct(';'))
        }
        "use" => {
            cursor.pos += 1;
            cursor.skip_until(|cursor| cursor.at_punct(';'));
            cursor.eat_punct(';')
        }
        "const" | "static" => {
            cursor.pos += 1;
            cursor.eat_kw("mut");
            let named = cursor.eat_plain_ident() || cursor.eat_kw("_");
            named
                && cursor.eat_punct(':')
                && ty::ty(cursor)
                && initializer(cursor)
                && cursor.eat_punct(';')
        }
        "type" => {
            cursor.pos += 1;
            if !cursor.eat_plain_ident() {
                return false;
            }
            cursor.skip_until(|cursor| cursor.at_punct(';'));
            cursor.eat_punct(';')
        }
        "macro_rules" => {
            cursor.pos += 1;
            cursor.eat_punct('!') && cursor.eat_plain_ident() && macro_body(cursor)
        }
        _ => macro_call_item(cursor),
    }
}

fn function(cursor: &mut Cursor<'_>) -> bool {
    while cursor
        .peek()
        .is_some_and(|token| token.is_ident() && FN_QUALIFIERS.contains(&cursor.text(token)))
    {
        cursor.pos += 1;
    }
    if cursor.eat_kw("extern") {
        cursor.eat_kind(TokenKind::Literal(LiteralKind::Str));
    }
    if !cursor.eat_kw("fn") || !cursor.eat_plain_ident() {
        return false;
    }
    if cursor.at_punct('<') && !ty::generic_params(cursor) {
        return false;
    }
    if !cursor.eat_tree(Delimiter::Paren) {
        return false;
    }
    if cursor.eat_op("->") && !ty::ty(cursor) {
        return false;
    }
    if cursor.eat_kw("where") {
        cursor.skip_until(|cursor| cursor.at_open(Delimiter::Brace) || cursor.at_punct(';'));
    }
    cursor.eat_tree(Delimiter::Brace) || cursor.eat_punct(';')
}

fn extern_item(cursor: &mut Cursor<'_>) -> bool {
    if cursor.nth_is_kw(1, "crate") {
        cursor.pos += 2;
        if !(cursor.eat_plain_ident() || cursor.eat_kw("self")) {
            return false;
        }
        if cursor.eat_kw("as") && !(cursor.eat_plain_ident() || cursor.eat_kw("_")) {
            return false;
        }
        return cursor.eat_punct(';');
    }
    let start = cursor.pos;
    cursor.pos += 1;
    cursor.eat_kind(TokenKind::Literal(LiteralKind::Str));
    if cursor.eat_tree(Delimiter::Brace) {
        return true;
    }
    cursor.pos = start;
    function(cursor)
}

/// Struct body: `{ ... }`, `( ... );` or `;`, with generics and where clause
fn adt_body(cursor: &mut Cursor<'_>) -> bool {
    if cursor.at_punct('<') && !ty::generic_params(cursor) {
        return false;
    }
    if cursor.eat_tree(Delimiter::Paren) {
        if cursor.eat_kw("where") {
            cursor.skip_until(|cursor| cursor.at_punct(';'));
        }
        return cursor.eat_punct(';');
    }
    if cursor.eat_kw("where") {
        cursor.skip_until(|cursor| cursor.at_open(Delimiter::Brace) || cursor.at_punct(';'));
    }
    cursor.eat_tree(Delimiter::Brace) || cursor.eat_punct(';')
}

fn generics_and_where(cursor: &mut Cursor<'_>) -> bool {
    if cursor.at_punct('<') && !ty::generic_params(cursor) {
        return false;
    }
    if cursor.eat_kw("where") {
        cursor.skip_until(|cursor| cursor.at_open(Delimiter::Brace));
    }
    true
}

/// Everything between `impl`/`trait Name` and the body
fn skip_header(cursor: &mut Cursor<'_>) -> bool {
    if cursor.at_punct('<') && !ty::generic_params(cursor) {
        return false;
    }
    cursor.skip_until(|cursor| cursor.at_open(Delimiter::Brace));
    true
}

fn initializer(cursor: &mut Cursor<'_>) -> bool {
    if cursor.at_punct('=') && !cursor.at_op("==") {
        cursor.pos += 1;
        return expr::expr(cursor);
    }
    true
}

/// Body of `macro_rules! name`; non-brace bodies need a `;`
fn macro_body(cursor: &mut Cursor<'_>) -> bool {
    if cursor.eat_tree(Delimiter::Brace) {
        return true;
    }
    (cursor.eat_tree(Delimiter::Paren) || cursor.eat_tree(Delimiter::Bracket)) && cursor.eat_punct(';')
}

/// `path!(...);`, `path![...];` or `path! {...}`
fn macro_call_item(cursor: &mut Cursor<'_>) -> bool {
    if !ty::path(cursor, PathStyle::Mod) || !cursor.eat_punct('!') {
        return false;
    }
    // Item-position macro calls may name the item: `thread_local! name {}`
    cursor.eat_plain_ident();
    macro_body(cursor)
}

/// A statement without its trailing semicolon
pub(crate) fn stmt(cursor: &mut Cursor<'_>) -> bool {
    let start = cursor.pos;
    if cursor.eat_kw("let") {
        if !pat(cursor) {
            cursor.pos = start;
            return false;
        }
        if cursor.eat_punct(':') && !ty::ty(cursor) {
            cursor.pos = start;
            return false;
        }
        if cursor.at_punct('=') && !cursor.at_op("==") {
            cursor.pos += 1;
            if !expr::expr(cursor) {
                cursor.pos = start;
                return false;
            }
            if cursor.eat_kw("else") && !cursor.eat_tree(Delimiter::Brace) {
                cursor.pos = start;
                return false;
            }
        }
        return true;
    }
    if starts_item(cursor) && item(cursor) {
        return true;
    }
    cursor.pos = start;
    expr::expr(cursor)
}

/// Whether the tokens at the cursor can only begin an item
fn starts_item(cursor: &Cursor<'_>) -> bool {
    let mut probe = Cursor::new(cursor.buffer, cursor.interner, cursor.pos);
    attributes(&mut probe);
    vis(&mut probe);
    if probe.at_kw("const") {
        return !probe
            .nth(1)
            .is_some_and(|next| next.kind == TokenKind::Open(Delimiter::Brace));
    }
    probe.peek().is_some_and(|token| {
        token.is_ident()
            && matches!(
                probe.text(token),
                "fn" | "struct"
                    | "enum"
                    | "union"
                    | "trait"
                    | "impl"
                    | "mod"
                    | "use"
                    | "static"
                    | "type"
                    | "extern"
                    | "macro_rules"
            )
    })
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
    fn test_items() {
        assert_eq!(consumed(FragmentKind::Item, "fn x(){} = fn y(){}"), "fn x(){}");
        assert_eq!(
            consumed(FragmentKind::Item, "#[derive(Debug)] pub struct S<T> where T: Copy { t: T } x"),
            "#[derive(Debug)] pub struct S<T> where T: Copy { t: T }"
        );
        assert_eq!(consumed(FragmentKind::Item, "struct U(u8); y"), "struct U(u8);");
        assert_eq!(consumed(FragmentKind::Item, "impl<T> Tr for S<T> {} z"), "impl<T> Tr for S<T> {}");
        assert_eq!(consumed(FragmentKind::Item, "pub(crate) const N: usize = 4; a"), "pub(crate) const N: usize = 4;");
        assert_eq!(consumed(FragmentKind::Item, "use a::{b, c}; d"), "use a::{b, c};");
        assert_eq!(consumed(FragmentKind::Item, "foo!(x); y"), "foo!(x);");
        assert_eq!(consumed(FragmentKind::Item, "async fn f() -> u8 { 1 }"), "async fn f() -> u8 { 1 }");
    }

    #[test]
    fn test_item_rejects_expressions() {
        assert_eq!(consumed(FragmentKind::Item, "1 + 1"), "-");
        assert_eq!(consumed(FragmentKind::Item, "foo!(x) y"), "-");
    }

    #[test]
    fn test_statements() {
        assert_eq!(consumed(FragmentKind::Stmt, "let x: u8 = 1; y"), "let x: u8 = 1");
        assert_eq!(consumed(FragmentKind::Stmt, "let Some(v) = o else { return }; z"), "let Some(v) = o else { return }");
        assert_eq!(consumed(FragmentKind::Stmt, "a += 1; b"), "a += 1");
        assert_eq!(consumed(FragmentKind::Stmt, "fn f() {} g"), "fn f() {}");
    }
}
