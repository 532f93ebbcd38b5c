//! Flat token buffer with matched delimiters
//!
//! Token trees are stored flat: an `Open` token, the tree's contents and the
//! matching `Close` token are consecutive. Every delimiter records the index
//! of its partner, so skipping a whole tree is a single jump.

use crate::error::LexError;
use crate::render::Renderer;
use crate::token::{Token, TokenKind};
use mx_intern::Interner;
use mx_span::Span;
use std::ops::Range;

/// A balanced sequence of tokens
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenBuffer {
    tokens: Vec<Token>,
    partners: Vec<u32>,
}

impl TokenBuffer {
    /// Builds a buffer, matching every delimiter with its partner
    ///
    /// # Errors
    ///
    /// Returns an error if the delimiters are not balanced.
    pub fn new(tokens: Vec<Token>) -> Result<Self, LexError> {
        let mut partners: Vec<u32> = (0..tokens.len() as u32).collect();
        let mut stack: Vec<usize> = Vec::new();

        for (index, token) in tokens.iter().enumerate() {
            match token.kind {
                TokenKind::Open(_) => stack.push(index),
                TokenKind::Close(close) => {
                    let Some(open_index) = stack.pop() else {
                        return Err(LexError::UnexpectedCloseDelimiter {
                            delimiter: close,
                            span: token.span,
                        });
                    };
                    let open_token = tokens[open_index];
                    if open_token.kind != TokenKind::Open(close) {
                        let TokenKind::Open(open) = open_token.kind else {
                            continue;
                        };
                        return Err(LexError::MismatchedDelimiter {
                            open,
                            open_span: open_token.span,
                            close,
                            close_span: token.span,
                        });
                    }
                    partners[open_index] = index as u32;
                    partners[index] = open_index as u32;
                }
                _ => {}
            }
        }

        if let Some(open_index) = stack.pop() {
            let token = tokens[open_index];
            if let TokenKind::Open(delimiter) = token.kind {
                return Err(LexError::UnclosedDelimiter {
                    delimiter,
                    span: token.span,
                });
            }
        }

        Ok(Self { tokens, partners })
    }

    /// Number of tokens, delimiters included
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the buffer holds no tokens
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Token at `index`
    pub fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    /// All tokens
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Tokens for in-place edits that keep every token's kind
    ///
    /// Changing a delimiter's kind through this slice invalidates the
    /// partner table.
    pub fn tokens_mut(&mut self) -> &mut [Token] {
        &mut self.tokens
    }

    /// Index of the matching delimiter; the index itself for other tokens
    pub fn partner(&self, index: usize) -> usize {
        self.partners.get(index).map_or(index, |&partner| partner as usize)
    }

    /// Exclusive end of the token tree starting at `index`
    ///
    /// A leaf spans one token; a delimited group spans up to and including
    /// its closing delimiter.
    pub fn tree_end(&self, index: usize) -> usize {
        match self.tokens.get(index).map(|token| token.kind) {
            Some(TokenKind::Open(_)) => self.partner(index) + 1,
            Some(_) => index + 1,
            None => index,
        }
    }

    /// Smallest source span covering `range`, if the range is not empty
    pub fn span_of(&self, range: Range<usize>) -> Option<Span> {
        let first = self.tokens.get(range.start)?;
        let last = self.tokens.get(range.end.checked_sub(1)?)?;
        (range.start < range.end).then(|| first.span.cover(last.span))
    }

    /// Source offset just past the last token, or 0 for an empty buffer
    pub fn end_offset(&self) -> u32 {
        self.tokens.last().map_or(0, |token| token.span.end)
    }

    /// Renders the tokens of a single source unit as text
    ///
    /// Tokens that touch in the source stay touching; everything else is
    /// separated by one space.
    pub fn render(&self, interner: &Interner) -> String {
        let mut renderer = Renderer::new(interner);
        let mut previous: Option<&Token> = None;
        for token in &self.tokens {
            let glued = previous.is_some_and(|prev| {
                prev.span.end == token.span.start || prev.span == token.span
            });
            renderer.push(token, glued);
            previous = Some(token);
        }
        renderer.finish().text
    }
}

#[cfg(test)]
mod tests {
    use crate::lexer::lex;
    use crate::token::SyntaxContext;
    use crate::LexError;
    use mx_intern::Interner;

    #[test]
    fn test_partners_and_tree_end() {
        let interner = Interner::new();
        let buffer = lex("a (b [c]) d", &interner, SyntaxContext::ROOT).unwrap();
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.partner(1), 6);
        assert_eq!(buffer.partner(6), 1);
        assert_eq!(buffer.tree_end(1), 7);
        assert_eq!(buffer.tree_end(0), 1);
        assert_eq!(buffer.tree_end(3), 6);
    }

    #[test]
    fn test_unbalanced_input() {
        let interner = Interner::new();
        assert!(matches!(
            lex("(a", &interner, SyntaxContext::ROOT),
            Err(LexError::UnclosedDelimiter { .. })
        ));
        assert!(matches!(
            lex("a)", &interner, SyntaxContext::ROOT),
            Err(LexError::UnexpectedCloseDelimiter { .. })
        ));
        assert!(matches!(
            lex("(a]", &interner, SyntaxContext::ROOT),
            Err(LexError::MismatchedDelimiter { .. })
        ));
    }

    #[test]
    fn test_render_keeps_adjacency() {
        let interner = Interner::new();
        let buffer = lex("fn  x(){}   =", &interner, SyntaxContext::ROOT).unwrap();
        assert_eq!(buffer.render(&interner), "fn x(){} =");
    }
}
