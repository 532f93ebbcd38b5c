//! Macro definition and expansion error types
//!
//! Note: the fields of [`DefinitionError`] are read by miette's
//! `#[derive(Diagnostic)]` expansion.

#![allow(unused_assignments, reason = "fields are read by the Diagnostic derive")]

use crate::fragment::FragmentKind;
use miette::{Diagnostic, SourceSpan};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Why one rule did not match an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    /// A literal in the matcher differs from the input token
    UnmatchedToken,
    /// Input ended while the matcher expected more
    EndOfInput,
    /// No prefix of the input is a fragment of this kind
    FragmentNotParsed {
        /// Kind the matcher asked for
        kind: FragmentKind,
    },
    /// A `+` repetition matched nothing
    TooFewGroupElements,
    /// A repetition iteration consumed no input
    EmptyGroup,
    /// The matcher finished before the input did
    ExtraInput,
    /// A delimited group in the input holds more than the matcher's group
    Nesting,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnmatchedToken => formatter.write_str("unexpected token"),
            Self::EndOfInput => formatter.write_str("unexpected end of input"),
            Self::FragmentNotParsed { kind } => write!(formatter, "expected {kind}"),
            Self::TooFewGroupElements => formatter.write_str("repetition needs at least one element"),
            Self::EmptyGroup => formatter.write_str("repetition matched empty input"),
            Self::ExtraInput => formatter.write_str("unexpected trailing input"),
            Self::Nesting => formatter.write_str("delimited group has leftover tokens"),
        }
    }
}

/// Failure of one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchFailure {
    /// Index of the rule in declaration order
    pub rule: usize,
    /// Offset in the invocation body where matching stopped
    pub offset: u32,
    /// What went wrong
    pub reason: FailureReason,
}

impl fmt::Display for MatchFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "rule {} at offset {}: {}", self.rule, self.offset, self.reason)
    }
}

/// Budget that a recursive expansion exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BudgetKind {
    /// Nesting depth of macro-calling-macro
    Depth,
    /// Number of expansions in one tree
    Calls,
    /// Number of produced tokens in one tree
    Tokens,
}

impl fmt::Display for BudgetKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Depth => "nesting depth",
            Self::Calls => "expansions",
            Self::Tokens => "tokens",
        })
    }
}

/// Result kinds of matching and transcription
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum MacroError {
    /// No rule consumed the whole input
    #[error("no rules of `{name}` matched this input")]
    NoMatchingRule {
        /// Macro name
        name: String,
        /// One entry per rule; empty when the definition is disabled
        failures: Vec<MatchFailure>,
    },
    /// A rule matched a prefix but left trailing tokens
    #[error("`{name}` matched a prefix of the input; unexpected tokens at offset {offset}")]
    ExtraInput {
        /// Macro name
        name: String,
        /// Rule that got furthest with only trailing input left
        rule: usize,
        /// Offset of the first unconsumed token
        offset: u32,
        /// One entry per rule
        failures: Vec<MatchFailure>,
    },
    /// Metavariables repeated together have different lengths
    #[error("meta-variable `{name}` repeats {found} times, but another repeats {expected} times")]
    ArityMismatch {
        /// Metavariable with the differing length
        name: String,
        /// Length of the first metavariable in the group
        expected: usize,
        /// Length of `name`
        found: usize,
    },
    /// A metavariable is used at the wrong repetition depth
    #[error("meta-variable `{name}` is bound at repetition depth {bound} but used at depth {used}")]
    MetaVarReuse {
        /// Metavariable name
        name: String,
        /// Depth at which the matcher binds it
        bound: usize,
        /// Depth of the template use
        used: usize,
    },
    /// A recursive expansion exhausted a budget
    #[error("recursion limit reached: more than {limit} {kind}")]
    RecursionLimitExceeded {
        /// Configured limit
        limit: usize,
        /// Which budget ran out
        kind: BudgetKind,
    },
    /// The definition cannot be used at all
    #[error("definition of `{name}` is malformed: {reason}")]
    DefinitionMalformed {
        /// Macro name
        name: String,
        /// Explanation
        reason: String,
    },
}

impl MacroError {
    /// Per-rule failures, for the two matching errors
    pub fn failures(&self) -> &[MatchFailure] {
        match self {
            Self::NoMatchingRule { failures, .. } | Self::ExtraInput { failures, .. } => failures,
            _ => &[],
        }
    }
}

/// Text that cannot be read as a macro definition
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum DefinitionError {
    /// The text is not a balanced token sequence
    #[error("{message}")]
    #[diagnostic(code(macro_def::lex))]
    Lex {
        /// Lexer message
        message: String,
        /// Source location
        #[label("here")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: miette::NamedSource<String>,
    },

    /// `$name` in a matcher without `:kind`
    #[error("missing fragment specifier for `${name}`")]
    #[diagnostic(
        code(macro_def::missing_fragment),
        help("add a fragment specifier, for example `${name}:tt`")
    )]
    MissingFragment {
        /// Metavariable name
        name: String,
        /// Source location
        #[label("needs a fragment specifier")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: miette::NamedSource<String>,
    },

    /// `$name:kind` with an unknown kind
    #[error("invalid fragment specifier `{found}`")]
    #[diagnostic(
        code(macro_def::unknown_fragment),
        help("valid fragment specifiers are `ident`, `block`, `stmt`, `expr`, `pat`, `ty`, `lifetime`, `literal`, `path`, `meta`, `tt`, `item` and `vis`")
    )]
    UnknownFragment {
        /// Specifier as written
        found: String,
        /// Source location
        #[label("unknown specifier")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: miette::NamedSource<String>,
    },

    /// A metavariable is bound twice in one matcher
    #[error("duplicate matcher binding `${name}`")]
    #[diagnostic(code(macro_def::duplicate_binding))]
    DuplicateBinding {
        /// Metavariable name
        name: String,
        /// Second binding
        #[label("bound again here")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: miette::NamedSource<String>,
    },

    /// `$( ... )` not followed by a repetition operator
    #[error("expected one of `*`, `+` or `?` after repetition")]
    #[diagnostic(code(macro_def::repetition_operator))]
    MissingRepetitionOperator {
        /// Source location
        #[label("repetition ends here")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: miette::NamedSource<String>,
    },

    /// The `?` operator was given a separator
    #[error("the `?` repetition operator does not take a separator")]
    #[diagnostic(code(macro_def::optional_separator))]
    SeparatorOnOptional {
        /// Source location
        #[label("separator here")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: miette::NamedSource<String>,
    },

    /// Definition source is not shaped like a macro
    #[error("expected {expected}")]
    #[diagnostic(code(macro_def::syntax))]
    Syntax {
        /// What was expected
        expected: String,
        /// Source location
        #[label("expected {expected}")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: miette::NamedSource<String>,
    },
}
