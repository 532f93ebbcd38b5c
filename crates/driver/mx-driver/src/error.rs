//! Driver error types

use mx_macro::{DefinitionError, MacroError};
use mx_tt::LexError;
use mx_vfs::VfsError;
use thiserror::Error;

/// Errors that end an expansion request
#[derive(Debug, Error)]
pub enum DriverError {
    /// No definition for the call's path is visible from its scope
    #[error("cannot find macro `{path}` in scope `{scope}`")]
    UnresolvedMacro {
        /// Path as written at the call
        path: String,
        /// Scope the call was resolved in
        scope: String,
    },
    /// The call body is not a balanced token sequence
    #[error("invalid macro call body")]
    Lex(#[from] LexError),
    /// A definition could not be parsed
    #[error("invalid macro definition")]
    Definition(#[from] Box<DefinitionError>),
    /// Matching or transcription of the root call failed
    #[error(transparent)]
    Expansion(#[from] MacroError),
    /// Virtual storage rejected an operation
    #[error("virtual storage error")]
    Storage(#[from] VfsError),
    /// A batch was cancelled between call sites
    #[error("expansion interrupted after {processed} call sites")]
    Interrupted {
        /// Call sites completed before the interruption
        processed: usize,
    },
    /// A thread panicked while holding driver state
    #[error("driver state lock poisoned")]
    LockPoisoned,
}

impl From<DefinitionError> for DriverError {
    fn from(error: DefinitionError) -> Self {
        Self::Definition(Box::new(error))
    }
}
