//! Token trees for macro definitions and invocations
//!
//! Text is lexed into a flat [`TokenBuffer`] where every delimiter knows
//! the index of its partner. Matching, transcription and rendering all work
//! on this representation.

pub mod buffer;
pub mod error;
pub mod lexer;
pub mod render;
pub mod token;

pub use buffer::TokenBuffer;
pub use error::LexError;
pub use lexer::lex;
pub use render::{Rendered, Renderer};
pub use token::{
    is_keyword, Delimiter, DisplayText, LiteralKind, Spacing, SyntaxContext, Token, TokenKind,
    KEYWORDS,
};
