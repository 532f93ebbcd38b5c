//! Lexing error types

use crate::token::Delimiter;
use mx_span::Span;

/// Error produced while turning text into a token buffer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    /// A character sequence that is not a token
    #[error("unrecognized input `{text}` at {}..{}", span.start, span.end)]
    InvalidToken {
        /// Offending text
        text: String,
        /// Source location
        span: Span,
    },
    /// An opening delimiter was never closed
    #[error("unclosed delimiter `{}`", delimiter.open_char())]
    UnclosedDelimiter {
        /// The unclosed delimiter
        delimiter: Delimiter,
        /// Where it was opened
        span: Span,
    },
    /// A closing delimiter without an opening one
    #[error("unexpected closing delimiter `{}`", delimiter.close_char())]
    UnexpectedCloseDelimiter {
        /// The stray delimiter
        delimiter: Delimiter,
        /// Where it appears
        span: Span,
    },
    /// A closing delimiter of the wrong kind
    #[error("mismatched closing delimiter: `{}` closed by `{}`", open.open_char(), close.close_char())]
    MismatchedDelimiter {
        /// Delimiter that was open
        open: Delimiter,
        /// Where it was opened
        open_span: Span,
        /// Delimiter that closed it
        close: Delimiter,
        /// Where the wrong close appears
        close_span: Span,
    },
}

impl LexError {
    /// Primary location of the error
    pub fn span(&self) -> Span {
        match self {
            Self::InvalidToken { span, .. }
            | Self::UnclosedDelimiter { span, .. }
            | Self::UnexpectedCloseDelimiter { span, .. } => *span,
            Self::MismatchedDelimiter { close_span, .. } => *close_span,
        }
    }
}
