//! Macro calls and definitions found in expansion output
//!
//! Nested calls are not expanded here. They are reported to the caller,
//! which queues them as new expansion requests.

use crate::fragment::macro_path_end;
use mx_intern::Interner;
use mx_tt::{Delimiter, TokenBuffer, TokenKind};
use serde::Serialize;
use std::ops::Range;

/// `path ! (...)` in expansion output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedCall {
    /// Macro path as written, e.g. `vec` or `::demo::helper`
    pub path: String,
    /// Token range of the body, delimiters excluded
    pub body: Range<usize>,
    /// Text between the delimiters
    pub body_text: String,
    /// Output offset where the body text starts
    pub offset: u32,
    /// Delimiter around the body
    pub delimiter: Delimiter,
}

impl NestedCall {
    /// Last path segment, which names the macro
    pub fn name(&self) -> &str {
        self.path.rsplit("::").next().unwrap_or(&self.path)
    }
}

/// `macro_rules! name { ... }` in expansion output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedDefinition {
    /// Name of the defined macro
    pub name: String,
    /// Full text of the definition
    pub text: String,
    /// Output offset of `macro_rules`
    pub offset: u32,
}

/// Everything macro-shaped in one expansion output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Discovered {
    /// Calls in output order
    pub calls: Vec<NestedCall>,
    /// Definitions in output order
    pub definitions: Vec<NestedDefinition>,
}

/// Scans expansion output for calls and definitions
///
/// `tokens` must be spanned over `text`. Bodies of calls are not scanned:
/// calls inside them surface when the outer call is expanded.
pub fn find_nested(tokens: &TokenBuffer, text: &str, interner: &Interner) -> Discovered {
    let mut found = Discovered::default();
    let slice = |start: u32, end: u32| text.get(start as usize..end as usize).unwrap_or_default().to_string();
    let mut pos = 0;

    while pos < tokens.len() {
        let Some(end) = macro_path_end(tokens, pos, interner) else {
            pos += 1;
            continue;
        };
        let bang = tokens.get(end).is_some_and(|token| token.is_punct('!'));
        let (Some(first), Some(last)) = (tokens.get(pos), tokens.get(end - 1)) else {
            pos += 1;
            continue;
        };
        if !bang {
            pos = end;
            continue;
        }
        let path = slice(first.span.start, last.span.end);

        let definition = path == "macro_rules"
            && tokens.get(end + 1).is_some_and(|token| token.is_ident())
            && tokens
                .get(end + 2)
                .is_some_and(|token| matches!(token.kind, TokenKind::Open(_)));
        if definition {
            let close = tokens.partner(end + 2);
            let (Some(name), Some(close_token)) = (tokens.get(end + 1), tokens.get(close)) else {
                pos = end + 1;
                continue;
            };
            found.definitions.push(NestedDefinition {
                name: interner.resolve(&name.text).to_string(),
                text: slice(first.span.start, close_token.span.end),
                offset: first.span.start,
            });
            pos = close + 1;
            continue;
        }

        let Some(open) = tokens.get(end + 1) else {
            pos = end + 1;
            continue;
        };
        let TokenKind::Open(delimiter) = open.kind else {
            pos = end + 1;
            continue;
        };
        let close = tokens.partner(end + 1);
        let Some(close_token) = tokens.get(close) else {
            pos = end + 1;
            continue;
        };
        found.calls.push(NestedCall {
            path,
            body: end + 2..close,
            body_text: slice(open.span.end, close_token.span.start),
            offset: open.span.end,
            delimiter,
        });
        pos = close + 1;
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use mx_tt::{lex, SyntaxContext};

    #[test]
    fn test_finds_calls_and_definitions() {
        let interner = Interner::new();
        let text = "foo!(a) let v = b::c![1, 2]; { inner!{ x } } macro_rules! m { () => { y!() } } d";
        let tokens = lex(text, &interner, SyntaxContext::ROOT).unwrap();
        let found = find_nested(&tokens, text, &interner);

        let calls: Vec<_> = found
            .calls
            .iter()
            .map(|call| (call.path.as_str(), call.body_text.as_str(), call.offset, call.delimiter))
            .collect();
        assert_eq!(
            calls,
            vec![
                ("foo", "a", 5, Delimiter::Paren),
                ("b::c", "1, 2", 22, Delimiter::Bracket),
                ("inner", " x ", 38, Delimiter::Brace),
            ]
        );
        assert_eq!(found.calls[1].name(), "c");
        assert_eq!(found.calls[0].body, 3..4);

        assert_eq!(found.definitions.len(), 1);
        assert_eq!(found.definitions[0].name, "m");
        assert_eq!(found.definitions[0].text, "macro_rules! m { () => { y!() } }");
    }

    #[test]
    fn test_bang_without_body_is_not_a_call() {
        let interner = Interner::new();
        let text = "a != b; !c; x ! y";
        let tokens = lex(text, &interner, SyntaxContext::ROOT).unwrap();
        assert_eq!(find_nested(&tokens, text, &interner), Discovered::default());
    }
}
