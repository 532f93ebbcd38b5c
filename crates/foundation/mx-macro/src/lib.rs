//! Declarative macro expansion
//!
//! A definition is parsed into rules ([`parse`]), compiled once into a
//! shared [`MatcherGraph`], and then used for any number of calls: the
//! [`matcher`] binds an invocation to the first rule that consumes it
//! completely and [`transcribe`] substitutes the bindings into that rule's
//! template. The [`walker`] explores the same graph for calls that do not
//! match yet.

pub mod ast;
pub mod calls;
pub mod error;
pub mod fragment;
pub mod graph;
pub mod hygiene;
pub mod marks;
pub mod matcher;
pub mod parse;
pub mod ranges;
pub mod transcribe;
pub mod walker;

pub use ast::{MacroDefinition, MatcherElement, RepeatOp, Rule, Separator, TemplateElement};
pub use calls::{find_nested, Discovered, NestedCall, NestedDefinition};
pub use error::{BudgetKind, DefinitionError, FailureReason, MacroError, MatchFailure};
pub use fragment::{is_atomic_expr, parse_fragment, FragmentKind};
pub use graph::MatcherGraph;
pub use marks::Mark;
pub use matcher::{match_rules, Bindings, Capture, MatchOutcome};
pub use parse::{check_follow_sets, parse_macro_rules, parse_rules, FollowWarning};
pub use ranges::{MappedRange, RangeMap};
pub use transcribe::{transcribe, Expansion};

use mx_intern::Interner;
use mx_tt::TokenBuffer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Syntactic position of a call, which decides how its expansion must parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallContext {
    /// Expression position
    Expr,
    /// Item position
    Item,
    /// Statement position
    Stmt,
    /// Type position
    Type,
    /// Pattern position
    Pat,
}

impl CallContext {
    /// Tag as used in configuration and hashes
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expr => "expr",
            Self::Item => "item",
            Self::Stmt => "stmt",
            Self::Type => "type",
            Self::Pat => "pat",
        }
    }

    /// Whether `tokens` parse completely in this position
    ///
    /// Item and statement positions accept any number of elements,
    /// including none.
    pub fn accepts(self, tokens: &TokenBuffer, interner: &Interner) -> bool {
        let single = |kind: FragmentKind| parse_fragment(kind, tokens, 0, interner) == Some(tokens.len());
        match self {
            Self::Expr => single(FragmentKind::Expr),
            Self::Type => single(FragmentKind::Ty),
            Self::Pat => single(FragmentKind::Pat),
            Self::Item | Self::Stmt => {
                let kind = if self == Self::Item {
                    FragmentKind::Item
                } else {
                    FragmentKind::Stmt
                };
                let mut pos = 0;
                while pos < tokens.len() {
                    if kind == FragmentKind::Stmt && tokens.get(pos).is_some_and(|token| token.is_punct(';')) {
                        pos += 1;
                        continue;
                    }
                    match parse_fragment(kind, tokens, pos, interner) {
                        Some(end) => pos = end,
                        None => return false,
                    }
                }
                true
            }
        }
    }
}

impl fmt::Display for CallContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for CallContext {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "expr" => Ok(Self::Expr),
            "item" => Ok(Self::Item),
            "stmt" => Ok(Self::Stmt),
            "type" => Ok(Self::Type),
            "pat" => Ok(Self::Pat),
            _ => Err(format!("unknown call context `{text}`")),
        }
    }
}

/// A definition together with its compiled matcher graph
///
/// A definition whose graph cannot be built stays registered but is
/// disabled: every call to it fails with [`MacroError::NoMatchingRule`].
#[derive(Debug, Clone)]
pub struct CompiledMacro {
    definition: MacroDefinition,
    graph: Result<MatcherGraph, MacroError>,
}

impl CompiledMacro {
    /// Compiles `definition`
    pub fn compile(definition: MacroDefinition, interner: &Interner) -> Self {
        let graph = MatcherGraph::compile(&definition, interner);
        if let Err(error) = &graph {
            warn!(macro_name = interner.resolve(&definition.name), %error, "definition disabled");
        }
        Self { definition, graph }
    }

    /// The parsed definition
    pub fn definition(&self) -> &MacroDefinition {
        &self.definition
    }

    /// The compiled graph, unless the definition is malformed
    pub fn graph(&self) -> Option<&MatcherGraph> {
        self.graph.as_ref().ok()
    }

    /// Why the definition is disabled
    pub fn malformed(&self) -> Option<&MacroError> {
        self.graph.as_ref().err()
    }

    fn disabled(&self, interner: &Interner) -> MacroError {
        MacroError::NoMatchingRule {
            name: interner.resolve(&self.definition.name).to_string(),
            failures: Vec::new(),
        }
    }

    /// Binds `input` to the first rule that consumes all of it
    ///
    /// # Errors
    ///
    /// Fails when no rule matches or the definition is malformed.
    pub fn match_call(&self, input: &TokenBuffer, interner: &Interner) -> Result<MatchOutcome, MacroError> {
        let Ok(graph) = &self.graph else {
            return Err(self.disabled(interner));
        };
        match_rules(graph, interner.resolve(&self.definition.name), input, interner)
    }

    /// Matches and transcribes one call
    ///
    /// # Errors
    ///
    /// Fails when no rule matches, the definition is malformed or the template
    /// cannot be transcribed.
    pub fn expand(&self, input: &TokenBuffer, interner: &Interner) -> Result<Expansion, MacroError> {
        let outcome = self.match_call(input, interner)?;
        transcribe(&self.definition, &outcome, input, interner)
    }

    /// Fragment kinds that could be written at `caret` in `input`
    pub fn reachable_kinds(&self, input: &TokenBuffer, caret: u32, interner: &Interner) -> BTreeSet<FragmentKind> {
        self.graph().map_or_else(BTreeSet::new, |graph| {
            walker::reachable_kinds(graph, input, caret, interner)
        })
    }
}
