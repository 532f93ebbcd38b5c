//! Macro definition types

use crate::fragment::FragmentKind;
use mx_intern::{Interner, Symbol};
use mx_span::Span;
use mx_tt::{Delimiter, SyntaxContext, Token};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kleene operator of a repetition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepeatOp {
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
    /// `?`
    ZeroOrOne,
}

impl RepeatOp {
    /// Operator for a punctuation character
    pub const fn from_char(ch: char) -> Option<Self> {
        match ch {
            '*' => Some(Self::ZeroOrMore),
            '+' => Some(Self::OneOrMore),
            '?' => Some(Self::ZeroOrOne),
            _ => None,
        }
    }

    /// The operator character
    pub const fn as_char(self) -> char {
        match self {
            Self::ZeroOrMore => '*',
            Self::OneOrMore => '+',
            Self::ZeroOrOne => '?',
        }
    }

    /// Whether zero iterations are accepted
    pub const fn allows_zero(self) -> bool {
        !matches!(self, Self::OneOrMore)
    }

    /// Whether more than one iteration is accepted
    pub const fn allows_many(self) -> bool {
        !matches!(self, Self::ZeroOrOne)
    }
}

impl fmt::Display for RepeatOp {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.as_char())
    }
}

/// Separator between repetition iterations
///
/// A separator is a single token tree; glued operators such as `=>` are
/// stored as their individual punctuation tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Separator(pub Vec<Token>);

impl Separator {
    /// Tokens of the separator
    pub fn tokens(&self) -> &[Token] {
        &self.0
    }

    /// Whether this is `,` or `;`, which render glued to what precedes them
    pub fn is_list_punct(&self) -> bool {
        matches!(self.0.as_slice(), [token] if token.is_punct(',') || token.is_punct(';'))
    }

    /// Separator as source text
    pub fn text(&self, interner: &Interner) -> String {
        self.0
            .iter()
            .map(|token| token.display_text(interner).to_string())
            .collect()
    }
}

/// One element of a rule's pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatcherElement {
    /// Token that must appear verbatim
    Literal(Token),
    /// `$name:kind`
    MetaVar {
        /// Metavariable name
        name: Symbol,
        /// Fragment specifier
        kind: FragmentKind,
        /// Location of `$name:kind` in the definition
        span: Span,
    },
    /// `$( ... ) sep? op`
    Group {
        /// Repeated pattern
        inner: Vec<MatcherElement>,
        /// Separator between iterations
        separator: Option<Separator>,
        /// Kleene operator
        op: RepeatOp,
        /// Location from `$` to the operator
        span: Span,
    },
    /// A delimited tree whose contents must match `inner` completely
    Delimited {
        /// Delimiter kind
        delimiter: Delimiter,
        /// Opening token
        open: Token,
        /// Closing token
        close: Token,
        /// Pattern for the contents
        inner: Vec<MatcherElement>,
    },
}

impl MatcherElement {
    /// Calls `visit` for every metavariable in this element, with its
    /// repetition depth relative to the element
    pub fn for_each_var(&self, depth: usize, visit: &mut impl FnMut(Symbol, FragmentKind, usize)) {
        match self {
            Self::Literal(_) => {}
            Self::MetaVar { name, kind, .. } => visit(*name, *kind, depth),
            Self::Group { inner, .. } => {
                for element in inner {
                    element.for_each_var(depth + 1, visit);
                }
            }
            Self::Delimited { inner, .. } => {
                for element in inner {
                    element.for_each_var(depth, visit);
                }
            }
        }
    }
}

/// One element of a rule's template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateElement {
    /// Token copied to the output; delimiters are kept as plain tokens
    Literal(Token),
    /// `$name`
    MetaVarRef {
        /// The `$` token
        dollar: Token,
        /// The name token
        ident: Token,
    },
    /// `$( ... ) sep? op`
    Group {
        /// Repeated template
        inner: Vec<TemplateElement>,
        /// Separator emitted between iterations
        separator: Option<Separator>,
        /// Kleene operator
        op: RepeatOp,
        /// Location from `$` to the operator
        span: Span,
    },
    /// `$crate`
    CrateRef {
        /// Location of `$crate`
        span: Span,
    },
}

impl TemplateElement {
    /// Location in the definition
    pub fn span(&self) -> Span {
        match self {
            Self::Literal(token) => token.span,
            Self::MetaVarRef { dollar, ident } => dollar.span.cover(ident.span),
            Self::Group { span, .. } | Self::CrateRef { span } => *span,
        }
    }

    /// Names of every metavariable referenced in this element
    pub fn referenced_vars(&self, names: &mut Vec<Symbol>) {
        match self {
            Self::MetaVarRef { ident, .. } => {
                if !names.contains(&ident.text) {
                    names.push(ident.text);
                }
            }
            Self::Group { inner, .. } => {
                for element in inner {
                    element.referenced_vars(names);
                }
            }
            Self::Literal(_) | Self::CrateRef { .. } => {}
        }
    }
}

/// A pattern/template pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Left-hand side
    pub matcher: Vec<MatcherElement>,
    /// Right-hand side
    pub template: Vec<TemplateElement>,
}

/// A declarative macro: ordered rules plus the identity `$crate` needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDefinition {
    /// Macro name
    pub name: Symbol,
    /// Crate that owns the definition
    pub krate: Symbol,
    /// Rules, first match wins
    pub rules: Vec<Rule>,
    /// Hygiene context of the definition's own tokens
    pub ctx: SyntaxContext,
    /// Definition text, used for content hashing
    pub source: String,
}
