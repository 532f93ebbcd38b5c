//! Token-tree matcher and binder
//!
//! Rules are tried strictly in declaration order. Each rule is matched by a
//! single cursor that walks the rule's chain through the graph. Fragments
//! are parsed greedily and never revisited; repetitions loop on their inner
//! chain and stop at the first iteration that fails, rolling back to the end
//! of the last complete iteration.

use crate::ast::RepeatOp;
use crate::error::{FailureReason, MacroError, MatchFailure};
use crate::fragment::{parse_fragment, FragmentKind};
use crate::graph::{EdgeLabel, GroupId, MatcherGraph, NodeId, NodeKind};
use crate::marks::Mark;
use indexmap::IndexMap;
use mx_intern::{Interner, Symbol};
use mx_tt::{Spacing, Token, TokenBuffer, TokenKind};
use std::ops::Range;
use tracing::{debug, trace};

/// Bound value of a metavariable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capture {
    /// Tokens `range` of the invocation, parsed as `kind`
    Fragment {
        /// Kind of the binding metavariable
        kind: FragmentKind,
        /// Token index range in the invocation buffer
        range: Range<usize>,
    },
    /// One capture per repetition iteration
    Seq(Vec<Capture>),
}

impl Capture {
    /// Number of enclosing repetitions this capture was bound under
    pub fn depth(&self) -> usize {
        match self {
            Self::Fragment { .. } => 0,
            Self::Seq(items) => 1 + items.first().map_or(0, Self::depth),
        }
    }
}

/// Binding environment
pub type Bindings = IndexMap<Symbol, Capture>;

/// A successful match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Index of the rule that matched
    pub rule: usize,
    /// Its bindings
    pub bindings: Bindings,
}

/// Matches `input` against every rule of `graph`, first match wins
///
/// # Errors
///
/// Returns [`MacroError::NoMatchingRule`] with the failure of every rule
/// when none matches.
pub fn match_rules(
    graph: &MatcherGraph,
    name: &str,
    input: &TokenBuffer,
    interner: &Interner,
) -> Result<MatchOutcome, MacroError> {
    let mut failures = Vec::with_capacity(graph.rules().len());
    for (index, rule) in graph.rules().iter().enumerate() {
        let mut binder = Binder {
            graph,
            input,
            interner,
            rule: index,
            pos: 0,
        };
        let mut bindings = Bindings::new();
        let result = binder
            .chain(rule.entry, &mut bindings)
            .and_then(|()| binder.finish());
        match result {
            Ok(()) => {
                debug!(macro_name = name, rule = index, "rule matched");
                return Ok(MatchOutcome {
                    rule: index,
                    bindings,
                });
            }
            Err(failure) => {
                trace!(macro_name = name, %failure, "rule did not match");
                failures.push(failure);
            }
        }
    }

    // Furthest leftover wins; ties keep the earlier rule
    let extra = failures
        .iter()
        .filter(|failure| failure.reason == FailureReason::ExtraInput)
        .rev()
        .max_by_key(|failure| failure.offset)
        .copied();
    match extra {
        Some(failure) => Err(MacroError::ExtraInput {
            name: name.to_string(),
            rule: failure.rule,
            offset: failure.offset,
            failures,
        }),
        None => Err(MacroError::NoMatchingRule {
            name: name.to_string(),
            failures,
        }),
    }
}

struct Binder<'toks> {
    graph: &'toks MatcherGraph,
    input: &'toks TokenBuffer,
    interner: &'toks Interner,
    rule: usize,
    pos: usize,
}

impl Binder<'_> {
    fn fail(&self, reason: FailureReason) -> MatchFailure {
        let offset = self
            .input
            .get(self.pos)
            .map_or_else(|| self.input.end_offset(), |token| token.span.start);
        MatchFailure {
            rule: self.rule,
            offset,
            reason,
        }
    }

    /// Token at the cursor, unless the cursor is at the end of its tree
    fn peek(&self) -> Option<&Token> {
        self.input
            .get(self.pos)
            .filter(|token| !matches!(token.kind, TokenKind::Close(_)))
    }

    fn at_end(&self) -> bool {
        self.peek().is_none()
    }

    /// Follows forward edges from `node` until a rule or iteration ends
    fn chain(&mut self, mut node: NodeId, bindings: &mut Bindings) -> Result<(), MatchFailure> {
        let graph = self.graph;
        loop {
            let current = graph.node(node);
            if matches!(current.kind, NodeKind::End(_) | NodeKind::GroupEnd(_)) {
                return Ok(());
            }
            let Some(edge) = current.forward() else {
                return Ok(());
            };
            node = match &edge.label {
                EdgeLabel::Literal { token, joint } => {
                    self.literal(token, *joint)?;
                    edge.target
                }
                EdgeLabel::Fragment { name, kind } => {
                    self.fragment(*name, *kind, bindings)?;
                    edge.target
                }
                EdgeLabel::EnterGroup(group) => {
                    self.group(*group, bindings)?;
                    graph.group(*group).after
                }
                EdgeLabel::Rule(_)
                | EdgeLabel::EndIteration(_)
                | EdgeLabel::ExitGroup(_)
                | EdgeLabel::Repeat(_)
                | EdgeLabel::SkipGroup(_) => edge.target,
            };
        }
    }

    fn literal(&mut self, expected: &Token, joint: bool) -> Result<(), MatchFailure> {
        let Some(found) = self.input.get(self.pos) else {
            Mark::MatchFailedOnToken.hit();
            return Err(self.fail(FailureReason::EndOfInput));
        };
        let closing = matches!(expected.kind, TokenKind::Close(_));
        if !found.same_text(expected) || (joint && found.spacing != Spacing::Joint) {
            Mark::MatchFailedOnToken.hit();
            let reason = match found.kind {
                _ if closing => FailureReason::Nesting,
                TokenKind::Close(_) => FailureReason::EndOfInput,
                _ => FailureReason::UnmatchedToken,
            };
            return Err(self.fail(reason));
        }
        self.pos += 1;
        Ok(())
    }

    fn fragment(&mut self, name: Symbol, kind: FragmentKind, bindings: &mut Bindings) -> Result<(), MatchFailure> {
        let Some(end) = parse_fragment(kind, self.input, self.pos, self.interner) else {
            Mark::MatchFailedOnFragment.hit();
            let reason = if self.at_end() {
                FailureReason::EndOfInput
            } else {
                FailureReason::FragmentNotParsed { kind }
            };
            return Err(self.fail(reason));
        };
        bindings.insert(name, Capture::Fragment {
            kind,
            range: self.pos..end,
        });
        self.pos = end;
        Ok(())
    }

    /// Consumes the group's separator, leaving the cursor alone on failure
    fn separator(&mut self, group: GroupId) -> bool {
        let graph = self.graph;
        let Some(separator) = &graph.group(group).separator else {
            return true;
        };
        let tokens = separator.tokens();
        let matched = tokens.iter().enumerate().all(|(offset, expected)| {
            self.input.get(self.pos + offset).is_some_and(|found| {
                found.same_text(expected) && (offset + 1 == tokens.len() || found.spacing == Spacing::Joint)
            })
        });
        if matched {
            self.pos += tokens.len();
        }
        matched
    }

    fn group(&mut self, id: GroupId, bindings: &mut Bindings) -> Result<(), MatchFailure> {
        let graph = self.graph;
        let group = graph.group(id);
        let mut iterations: Vec<Bindings> = Vec::new();
        // End of the last complete iteration; a trailing separator is given back
        let mut mark = self.pos;
        loop {
            if self.at_end() {
                Mark::GroupEndedAtInputStart.hit();
                self.pos = mark;
                break;
            }
            let before = self.pos;
            let mut inner = Bindings::new();
            if let Err(failure) = self.chain(group.start, &mut inner) {
                if failure.reason == FailureReason::EmptyGroup {
                    return Err(failure);
                }
                Mark::GroupEndedAtFailedIteration.hit();
                self.pos = mark;
                break;
            }
            if self.pos == before && group.separator.is_none() && group.op != RepeatOp::ZeroOrOne {
                Mark::GroupMatchedEmpty.hit();
                return Err(self.fail(FailureReason::EmptyGroup));
            }
            iterations.push(inner);
            mark = self.pos;

            if group.op == RepeatOp::ZeroOrOne {
                Mark::GroupEndedAfterOptional.hit();
                break;
            }
            if self.at_end() {
                Mark::GroupEndedAfterIteration.hit();
                break;
            }
            if !self.separator(id) {
                Mark::GroupEndedAtSeparator.hit();
                break;
            }
        }

        if group.op == RepeatOp::OneOrMore && iterations.is_empty() {
            Mark::GroupTooFewElements.hit();
            return Err(self.fail(FailureReason::TooFewGroupElements));
        }
        for var in &group.vars {
            let items = iterations
                .iter_mut()
                .map(|iteration| iteration.shift_remove(var).unwrap_or(Capture::Seq(Vec::new())))
                .collect();
            bindings.insert(*var, Capture::Seq(items));
        }
        Ok(())
    }

    /// A rule matches only when it consumed the whole input
    fn finish(&self) -> Result<(), MatchFailure> {
        if self.pos < self.input.len() {
            Mark::MatchFailedOnExtraInput.hit();
            return Err(self.fail(FailureReason::ExtraInput));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marks;
    use crate::parse::parse_rules;
    use mx_tt::{lex, SyntaxContext};

    struct Fixture {
        interner: Interner,
        graph: MatcherGraph,
    }

    impl Fixture {
        fn new(rules: &[(&str, &str)]) -> Self {
            let interner = Interner::new();
            let definition = parse_rules("m", "demo", rules, &interner, SyntaxContext::ROOT).unwrap();
            let graph = MatcherGraph::compile(&definition, &interner).unwrap();
            Self { interner, graph }
        }

        fn run(&self, input: &str) -> (TokenBuffer, Result<MatchOutcome, MacroError>) {
            let buffer = lex(input, &self.interner, SyntaxContext::ROOT).unwrap();
            let result = match_rules(&self.graph, "m", &buffer, &self.interner);
            (buffer, result)
        }

        /// Bindings rendered as `name=text` with repetitions in brackets
        fn bindings(&self, input: &str) -> String {
            let (buffer, result) = self.run(input);
            let outcome = result.unwrap();
            let mut parts = vec![format!("rule {}", outcome.rule)];
            for (name, capture) in &outcome.bindings {
                parts.push(format!("{}={}", self.interner.resolve(name), self.show(&buffer, capture)));
            }
            parts.join(" ")
        }

        fn show(&self, buffer: &TokenBuffer, capture: &Capture) -> String {
            match capture {
                Capture::Fragment { range, .. } => {
                    let tokens = buffer.tokens()[range.clone()].to_vec();
                    TokenBuffer::new(tokens).unwrap().render(&self.interner)
                }
                Capture::Seq(items) => format!(
                    "[{}]",
                    items.iter().map(|item| self.show(buffer, item)).collect::<Vec<_>>().join(", ")
                ),
            }
        }
    }

    #[test]
    fn test_repetition_operators() {
        let star = Fixture::new(&[("($($i:ident),*)", "")]);
        assert_eq!(star.bindings(""), "rule 0 i=[]");
        assert_eq!(star.bindings("a, b ,c"), "rule 0 i=[a, b, c]");
        assert!(star.run("a,").1.is_err());

        let plus = Fixture::new(&[("($($i:ident),+)", "")]);
        assert_eq!(plus.bindings("a"), "rule 0 i=[a]");
        let (_, error) = plus.run("");
        assert_eq!(
            error.unwrap_err().failures()[0].reason,
            FailureReason::TooFewGroupElements
        );

        let optional = Fixture::new(&[("($($i:ident)?)", "")]);
        assert_eq!(optional.bindings(""), "rule 0 i=[]");
        assert_eq!(optional.bindings("a"), "rule 0 i=[a]");
        assert!(matches!(optional.run("a b").1, Err(MacroError::ExtraInput { .. })));
    }

    #[test]
    fn test_first_rule_wins() {
        let fixture = Fixture::new(&[("($i:ident)", ""), ("($e:expr)", "")]);
        assert_eq!(fixture.bindings("x"), "rule 0 i=x");
        assert_eq!(fixture.bindings("x + 1"), "rule 1 e=x + 1");
    }

    #[test]
    fn test_separator_and_terminator_collide() {
        let fixture = Fixture::new(&[("($($i:item)=* =)", "")]);
        let tracker = marks::track();
        assert_eq!(fixture.bindings("fn x(){} ="), "rule 0 i=[fn x(){}]");
        assert_eq!(tracker.hits(Mark::GroupEndedAtInputStart), 1);
    }

    #[test]
    fn test_nested_repetitions() {
        let fixture = Fixture::new(&[("($($k:ident: [$($v:literal),*]);*)", "")]);
        assert_eq!(
            fixture.bindings("a: [1, 2]; b: []"),
            "rule 0 k=[a, b] v=[[1, 2], []]"
        );
    }

    #[test]
    fn test_delimited_groups_must_match_completely() {
        let fixture = Fixture::new(&[("(($a:ident) $b:tt)", "")]);
        assert_eq!(fixture.bindings("(x) {y}"), "rule 0 a=x b={y}");
        let (_, result) = fixture.run("(x y) z");
        let failure = result.unwrap_err().failures()[0];
        assert_eq!(failure.reason, FailureReason::Nesting);
        assert_eq!(failure.offset, 3);
    }

    #[test]
    fn test_failure_reasons_and_marks() {
        let fixture = Fixture::new(&[("(a $e:expr)", "")]);
        let tracker = marks::track();
        let (_, wrong_token) = fixture.run("b 1");
        assert_eq!(wrong_token.unwrap_err().failures()[0].reason, FailureReason::UnmatchedToken);
        let (_, bad_fragment) = fixture.run("a =>");
        assert_eq!(
            bad_fragment.unwrap_err().failures()[0].reason,
            FailureReason::FragmentNotParsed { kind: FragmentKind::Expr }
        );
        let (_, short) = fixture.run("a");
        assert_eq!(short.unwrap_err().failures()[0].reason, FailureReason::EndOfInput);
        assert_eq!(tracker.hits(Mark::MatchFailedOnToken), 1);
        assert_eq!(tracker.hits(Mark::MatchFailedOnFragment), 2);
    }

    #[test]
    fn test_extra_input_is_reported_with_offset() {
        let fixture = Fixture::new(&[("($i:ident)", ""), ("(1)", "")]);
        let (_, result) = fixture.run("a b");
        assert!(matches!(
            &result,
            Err(MacroError::ExtraInput { rule: 0, offset: 2, failures, .. }) if failures.len() == 2
        ));
    }

    #[test]
    fn test_extra_input_names_the_rule_that_got_furthest() {
        let fixture = Fixture::new(&[("($i:ident)", ""), ("($i:ident $j:ident)", "")]);
        let (_, result) = fixture.run("a b c");
        assert!(matches!(result, Err(MacroError::ExtraInput { rule: 1, offset: 4, .. })));

        let tied = Fixture::new(&[("($i:ident)", ""), ("($j:ident)", "")]);
        let (_, tie) = tied.run("a b");
        assert!(matches!(tie, Err(MacroError::ExtraInput { rule: 0, offset: 2, .. })));
    }

    #[test]
    fn test_glued_literals_require_glued_input() {
        let fixture = Fixture::new(&[("($a:ident => $b:ident)", "")]);
        assert_eq!(fixture.bindings("x=>y"), "rule 0 a=x b=y");
        assert!(fixture.run("x = > y").1.is_err());
    }

    #[test]
    fn test_vis_may_bind_nothing() {
        let fixture = Fixture::new(&[("($v:vis fn $name:ident)", "")]);
        assert_eq!(fixture.bindings("fn f"), "rule 0 v= name=f");
        assert_eq!(fixture.bindings("pub(crate) fn f"), "rule 0 v=pub(crate) name=f");
    }
}
