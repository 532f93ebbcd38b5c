//! Token-to-text rendering

use crate::token::{DisplayText, Token, TokenKind};
use mx_intern::Interner;
use mx_span::Span;

/// Rendered text plus the output span of every pushed token
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    /// Output text
    pub text: String,
    /// Span of the n-th pushed token inside `text`
    pub spans: Vec<Span>,
}

/// Incremental renderer
///
/// The caller decides whether each token is glued to the previous one, so
/// spacing inside delimiters follows whatever the tokens came from.
pub struct Renderer<'int> {
    interner: &'int Interner,
    out: Rendered,
    previous: Option<TokenKind>,
}

impl<'int> Renderer<'int> {
    /// Creates an empty renderer
    pub fn new(interner: &'int Interner) -> Self {
        Self {
            interner,
            out: Rendered::default(),
            previous: None,
        }
    }

    /// Appends `token`, separated by one space unless `glued`
    pub fn push(&mut self, token: &Token, glued: bool) {
        if self.previous.is_some() && !glued {
            self.out.text.push(' ');
        }
        let start = self.out.text.len() as u32;
        match token.display_text(self.interner) {
            DisplayText::Plain(text) => self.out.text.push_str(text),
            DisplayText::CrateRoot(name) => {
                self.out.text.push_str("::");
                self.out.text.push_str(name);
            }
        }
        let end = self.out.text.len() as u32;
        self.out.spans.push(Span::new(start, end));
        self.previous = Some(token.kind);
    }

    /// Whether nothing has been pushed yet
    pub fn is_empty(&self) -> bool {
        self.previous.is_none()
    }

    /// Finishes rendering
    pub fn finish(self) -> Rendered {
        self.out
    }
}
