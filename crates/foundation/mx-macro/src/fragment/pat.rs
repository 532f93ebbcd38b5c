//! Patterns

use super::ty::{self, PathStyle};
use super::Cursor;
use mx_tt::{Delimiter, TokenKind};

/// Top-level pattern, `|` alternatives included
pub(crate) fn pat(cursor: &mut Cursor<'_>) -> bool {
    let start = cursor.pos;
    if cursor.at_punct('|') && !cursor.at_op("||") {
        cursor.pos += 1;
    }
    if !pat_no_alt(cursor) {
        cursor.pos = start;
        return false;
    }
    loop {
        let before = cursor.pos;
        if !cursor.at_punct('|') || cursor.at_op("||") {
            return true;
        }
        cursor.pos += 1;
        if !pat_no_alt(cursor) {
            cursor.pos = before;
            return true;
        }
    }
}

fn pat_no_alt(cursor: &mut Cursor<'_>) -> bool {
    let start = cursor.pos;
    if cursor.at_op("..") {
        // Rest pattern `..` or half-open `..=end`
        cursor.pos += 2;
        return true;
    }
    if cursor.at_op("..=") {
        cursor.pos += 3;
        if !range_end(cursor) {
            cursor.pos = start;
            return false;
        }
        return true;
    }
    let Some(token) = cursor.peek() else {
        return false;
    };
    let parsed = match token.kind {
        TokenKind::Literal(_) | TokenKind::Punct('-') => super::literal(cursor) && range_tail(cursor),
        TokenKind::Punct('&') => {
            cursor.pos += 1;
            cursor.eat_punct('&');
            cursor.eat_kw("mut");
            pat_no_alt(cursor)
        }
        TokenKind::Open(Delimiter::Paren | Delimiter::Bracket) => cursor.eat_token_tree(),
        TokenKind::Punct('<' | ':') | TokenKind::CrateRoot => path_pat(cursor),
        TokenKind::Ident => match cursor.text(token) {
            "_" => {
                cursor.pos += 1;
                true
            }
            "true" | "false" => {
                cursor.pos += 1;
                true
            }
            "ref" | "mut" => {
                cursor.eat_kw("ref");
                cursor.eat_kw("mut");
                cursor.eat_plain_ident() && subpattern(cursor)
            }
            "box" => {
                cursor.pos += 1;
                pat_no_alt(cursor)
            }
            text if mx_tt::is_keyword(text) && !matches!(text, "self" | "Self" | "super" | "crate") => false,
            _ => path_pat(cursor),
        },
        _ => false,
    };
    if !parsed {
        cursor.pos = start;
    }
    parsed
}

/// Path pattern: binding, constant, tuple struct, struct or macro call
fn path_pat(cursor: &mut Cursor<'_>) -> bool {
    let start = cursor.pos;
    if !ty::path(cursor, PathStyle::Expr) {
        return false;
    }
    if cursor.at_punct('!') && cursor.nth(1).is_some_and(|token| matches!(token.kind, TokenKind::Open(_))) {
        cursor.pos += 1;
        return cursor.eat_token_tree();
    }
    if cursor.eat_tree(Delimiter::Paren) || cursor.eat_tree(Delimiter::Brace) {
        return true;
    }
    if cursor.pos == start + 1 && cursor.at_punct('@') {
        return subpattern(cursor);
    }
    range_tail(cursor)
}

/// Optional `@ pattern` after a binding
fn subpattern(cursor: &mut Cursor<'_>) -> bool {
    if cursor.eat_punct('@') {
        return pat_no_alt(cursor);
    }
    true
}

/// Optional `..=end`, `...end` or `..end` after a range start
fn range_tail(cursor: &mut Cursor<'_>) -> bool {
    let before = cursor.pos;
    if cursor.eat_op("..=") || cursor.eat_op("...") {
        if !range_end(cursor) {
            cursor.pos = before;
        }
        return true;
    }
    if cursor.eat_op("..") {
        let end = cursor.pos;
        if !range_end(cursor) {
            cursor.pos = end;
        }
    }
    true
}

fn range_end(cursor: &mut Cursor<'_>) -> bool {
    if cursor.at_literal() || cursor.at_punct('-') {
        return super::literal(cursor);
    }
    ty::path(cursor, PathStyle::Expr)
}

#[cfg(test)]
mod tests {
    use crate::fragment::{parse_fragment, FragmentKind};
    use mx_intern::Interner;
    use mx_tt::{lex, SyntaxContext};

    fn consumed(text: &str) -> String {
        let interner = Interner::new();
        let buffer = lex(text, &interner, SyntaxContext::ROOT).unwrap();
        match parse_fragment(FragmentKind::Pat, &buffer, 0, &interner) {
            Some(end) => buffer
                .span_of(0..end)
                .map(|span| text[span.range()].to_string())
                .unwrap_or_default(),
            None => "-".to_string(),
        }
    }

    #[test]
    fn test_patterns() {
        assert_eq!(consumed("Some(x) | None => 1"), "Some(x) | None");
        assert_eq!(consumed("ref mut x @ 1..=5, y"), "ref mut x @ 1..=5");
        assert_eq!(consumed("Point { x, .. } if x > 0"), "Point { x, .. }");
        assert_eq!(consumed("&(a, b) = t"), "&(a, b)");
        assert_eq!(consumed("-1 in"), "-1");
        assert_eq!(consumed("a::B::C"), "a::B::C");
    }

    #[test]
    fn test_rejects_keywords() {
        assert_eq!(consumed("if x"), "-");
        assert_eq!(consumed("=> x"), "-");
    }
}
