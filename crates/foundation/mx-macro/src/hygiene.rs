//! Hygiene contexts
//!
//! A context is an opaque integer. Every expansion draws a fresh one and
//! stamps it on the identifiers its template introduces, so two expansions
//! never share a definition-introduced name and no such name equals a
//! call-site identifier with the same text.

use mx_tt::{SyntaxContext, Token, TokenKind};
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_CONTEXT: AtomicU32 = AtomicU32::new(1);

/// Allocates a context no other expansion in this process has used
pub fn fresh_context() -> SyntaxContext {
    SyntaxContext(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
}

/// Moves every identifier and lifetime in `tokens` from context `from` to `to`
///
/// Used when a cached expansion is handed to a new call site, which must
/// not share hygiene with the call that produced the cached output.
pub fn restamp(tokens: &mut [Token], from: SyntaxContext, to: SyntaxContext) {
    for token in tokens {
        if matches!(token.kind, TokenKind::Ident | TokenKind::Lifetime) && token.ctx == from {
            token.ctx = to;
        }
    }
}
