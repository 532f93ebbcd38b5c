//! Expressions
//!
//! Operator precedence does not change where an expression ends, so the
//! recogniser reads `operand (binop operand)*` and leaves precedence alone.

use super::pat::pat;
use super::ty::{self, PathStyle};
use super::{attributes, Cursor};
use mx_tt::{Delimiter, TokenKind};

const BINARY_OPS: &[&str] = &[
    "=", "+=", "-=", "*=", "/=", "%=", "^=", "&=", "|=", "<<=", ">>=", "||", "&&", "==", "!=",
    "<", ">", "<=", ">=", "|", "^", "&", "<<", ">>", "+", "-", "*", "/", "%", "..", "..=",
];

/// Keywords that start a path rather than ending an expression
const PATH_KEYWORDS: &[&str] = &["self", "Self", "super", "crate"];

#[derive(Debug, Clone, Copy, Default)]
struct Restrictions {
    /// `a {}` is not a struct literal (conditions and scrutinees)
    no_struct: bool,
}

pub(crate) fn expr(cursor: &mut Cursor<'_>) -> bool {
    expr_with(cursor, Restrictions::default())
}

fn expr_with(cursor: &mut Cursor<'_>, restrictions: Restrictions) -> bool {
    let start = cursor.pos;
    if !operand(cursor, restrictions) {
        cursor.pos = start;
        return false;
    }
    loop {
        let before = cursor.pos;
        let Some(op) = cursor.op().filter(|op| BINARY_OPS.contains(&op.as_str())) else {
            return true;
        };
        cursor.pos += op.len();
        if op == ".." || op == "..=" {
            let end = cursor.pos;
            if !operand(cursor, restrictions) {
                cursor.pos = end;
                if op == "..=" {
                    cursor.pos = before;
                    return true;
                }
            }
            continue;
        }
        if !operand(cursor, restrictions) {
            cursor.pos = before;
            return true;
        }
    }
}

/// Prefix operators, a primary expression and its postfix chain
fn operand(cursor: &mut Cursor<'_>, restrictions: Restrictions) -> bool {
    let start = cursor.pos;
    loop {
        if cursor.eat_punct('-') || cursor.eat_punct('!') || cursor.eat_punct('*') {
            continue;
        }
        if cursor.eat_punct('&') {
            cursor.eat_kw("mut");
            continue;
        }
        break;
    }
    if cursor.at_op("..") || cursor.at_op("..=") {
        cursor.pos += cursor.op_len();
        let end = cursor.pos;
        if !operand(cursor, restrictions) {
            cursor.pos = end;
        }
        return true;
    }
    if !primary(cursor, restrictions) {
        cursor.pos = start;
        return false;
    }
    postfix(cursor);
    true
}

fn postfix(cursor: &mut Cursor<'_>) {
    loop {
        if cursor.eat_punct('?') {
            continue;
        }
        if cursor.at_open(Delimiter::Paren) || cursor.at_open(Delimiter::Bracket) {
            cursor.eat_token_tree();
            continue;
        }
        if cursor.at_op(".") {
            let dot = cursor.pos;
            cursor.pos += 1;
            let field = cursor.peek().is_some_and(|token| {
                token.is_ident()
                    || matches!(
                        token.kind,
                        TokenKind::Literal(mx_tt::LiteralKind::Integer | mx_tt::LiteralKind::Float)
                    )
            });
            if !field {
                cursor.pos = dot;
                return;
            }
            cursor.pos += 1;
            if cursor.at_op("::") {
                let turbofish = cursor.pos;
                cursor.pos += 2;
                if !ty::generic_args(cursor) {
                    cursor.pos = turbofish;
                }
            }
            continue;
        }
        if cursor.at_kw("as") {
            let cast = cursor.pos;
            cursor.pos += 1;
            if !ty::ty(cursor) {
                cursor.pos = cast;
                return;
            }
            continue;
        }
        return;
    }
}

fn primary(cursor: &mut Cursor<'_>, restrictions: Restrictions) -> bool {
    let Some(token) = cursor.peek() else {
        return false;
    };
    let text = cursor.text(token);
    match token.kind {
        TokenKind::Literal(_) => {
            cursor.pos += 1;
            true
        }
        TokenKind::Lifetime => {
            // Labelled loop or block: `'a: loop {}`
            cursor.pos += 1;
            cursor.eat_punct(':') && primary(cursor, restrictions)
        }
        TokenKind::Open(_) => cursor.eat_token_tree(),
        TokenKind::Punct('|') => closure(cursor, restrictions),
        TokenKind::Punct('<') => path_expr(cursor, restrictions),
        TokenKind::Punct('#') => {
            attributes(cursor);
            operand(cursor, restrictions)
        }
        TokenKind::Punct(':') if cursor.at_op("::") => path_expr(cursor, restrictions),
        TokenKind::CrateRoot => path_expr(cursor, restrictions),
        TokenKind::Ident => keyword_expr(cursor, text, restrictions),
        _ => false,
    }
}

fn keyword_expr(cursor: &mut Cursor<'_>, text: &str, restrictions: Restrictions) -> bool {
    let no_struct = Restrictions { no_struct: true };
    match text {
        "true" | "false" => {
            cursor.pos += 1;
            true
        }
        "if" => if_expr(cursor),
        "match" => {
            cursor.pos += 1;
            expr_with(cursor, no_struct) && cursor.eat_tree(Delimiter::Brace)
        }
        "while" => {
            cursor.pos += 1;
            expr_with(cursor, no_struct) && cursor.eat_tree(Delimiter::Brace)
        }
        "for" => {
            cursor.pos += 1;
            pat(cursor)
                && cursor.eat_kw("in")
                && expr_with(cursor, no_struct)
                && cursor.eat_tree(Delimiter::Brace)
        }
        "loop" | "unsafe" | "const" => {
            cursor.pos += 1;
            cursor.eat_tree(Delimiter::Brace)
        }
        "async" => {
            cursor.pos += 1;
            cursor.eat_kw("move");
            if cursor.at_punct('|') {
                return closure(cursor, restrictions);
            }
            cursor.eat_tree(Delimiter::Brace)
        }
        "move" | "static" => {
            cursor.pos += 1;
            cursor.eat_kw("move");
            closure(cursor, restrictions)
        }
        "let" => {
            cursor.pos += 1;
            pat(cursor) && !cursor.at_op("==") && cursor.eat_punct('=') && operand_chain(cursor, no_struct)
        }
        "return" | "break" | "yield" | "become" | "continue" => {
            cursor.pos += 1;
            if text == "break" || text == "continue" {
                cursor.eat_kind(TokenKind::Lifetime);
            }
            if text != "continue" {
                let before = cursor.pos;
                if !expr_with(cursor, restrictions) {
                    cursor.pos = before;
                }
            }
            true
        }
        "box" => {
            cursor.pos += 1;
            operand(cursor, restrictions)
        }
        _ if mx_tt::is_keyword(text) && !PATH_KEYWORDS.contains(&text) => false,
        _ => path_expr(cursor, restrictions),
    }
}

/// The scrutinee of `let` inside a condition; `&&` chains belong to the
/// enclosing condition
fn operand_chain(cursor: &mut Cursor<'_>, restrictions: Restrictions) -> bool {
    let start = cursor.pos;
    if !operand(cursor, restrictions) {
        cursor.pos = start;
        return false;
    }
    loop {
        let before = cursor.pos;
        let Some(op) = cursor
            .op()
            .filter(|op| op != "&&" && op != "||" && BINARY_OPS.contains(&op.as_str()))
        else {
            return true;
        };
        cursor.pos += op.len();
        if !operand(cursor, restrictions) {
            cursor.pos = before;
            return true;
        }
    }
}

fn if_expr(cursor: &mut Cursor<'_>) -> bool {
    if !cursor.eat_kw("if") {
        return false;
    }
    if !expr_with(cursor, Restrictions { no_struct: true }) || !cursor.eat_tree(Delimiter::Brace) {
        return false;
    }
    if !cursor.eat_kw("else") {
        return true;
    }
    if cursor.at_kw("if") {
        if_expr(cursor)
    } else {
        cursor.eat_tree(Delimiter::Brace)
    }
}

fn closure(cursor: &mut Cursor<'_>, restrictions: Restrictions) -> bool {
    if cursor.at_op("||") {
        cursor.pos += 2;
    } else {
        if !cursor.eat_punct('|') {
            return false;
        }
        cursor.skip_until(|cursor| cursor.at_punct('|'));
        if !cursor.eat_punct('|') {
            return false;
        }
    }
    if cursor.at_op("->") {
        cursor.pos += 2;
        return ty::ty(cursor) && cursor.eat_tree(Delimiter::Brace);
    }
    expr_with(cursor, restrictions)
}

fn path_expr(cursor: &mut Cursor<'_>, restrictions: Restrictions) -> bool {
    if !ty::path(cursor, PathStyle::Expr) {
        return false;
    }
    if cursor.at_punct('!') && !cursor.at_op("!=") {
        let bang = cursor.pos;
        cursor.pos += 1;
        if cursor.at_any_open() {
            cursor.eat_token_tree();
            return true;
        }
        cursor.pos = bang;
        return true;
    }
    if !restrictions.no_struct && cursor.at_open(Delimiter::Brace) {
        cursor.eat_token_tree();
    }
    true
}
