//! Speculative walk of the matcher graph
//!
//! While a call is being edited no rule may match it. The walker follows
//! every path through the graph at once, consuming the tokens before the
//! caret, and reports which fragment kinds could be written at the caret.

use crate::fragment::{parse_fragment, FragmentKind};
use crate::graph::{EdgeLabel, MatcherGraph, NodeId};
use mx_intern::Interner;
use mx_tt::{Spacing, TokenBuffer, TokenKind};
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use tracing::debug;

/// Fragment kinds reachable at `caret`, an offset in the invocation body
pub fn reachable_kinds(
    graph: &MatcherGraph,
    input: &TokenBuffer,
    caret: u32,
    interner: &Interner,
) -> BTreeSet<FragmentKind> {
    let mut kinds = BTreeSet::new();
    let mut visited: FxHashSet<(NodeId, usize)> = FxHashSet::default();
    let mut stack = vec![(graph.start(), 0usize)];
    // A token is consumable only if it starts before the caret
    let before_caret = |pos: usize| {
        input
            .get(pos)
            .filter(|token| token.span.start < caret)
    };

    while let Some((node, pos)) = stack.pop() {
        if !visited.insert((node, pos)) {
            continue;
        }
        for edge in &graph.node(node).edges {
            match &edge.label {
                EdgeLabel::Literal { token, joint } => {
                    let consumed = before_caret(pos).is_some_and(|found| {
                        found.same_text(token) && (!joint || found.spacing == Spacing::Joint)
                    });
                    if consumed {
                        stack.push((edge.target, pos + 1));
                    }
                }
                EdgeLabel::Fragment { kind, .. } => {
                    let next = before_caret(pos).filter(|token| !matches!(token.kind, TokenKind::Close(_)));
                    if next.is_none() {
                        kinds.insert(*kind);
                        // An empty fragment leaves the caret to whatever follows
                        if kind.can_be_empty() {
                            stack.push((edge.target, pos));
                        }
                        continue;
                    }
                    let Some(end) = parse_fragment(*kind, input, pos, interner) else {
                        continue;
                    };
                    if end == pos {
                        stack.push((edge.target, pos));
                    } else if input.get(end - 1).is_some_and(|last| last.span.end >= caret) {
                        kinds.insert(*kind);
                    } else {
                        stack.push((edge.target, end));
                    }
                }
                EdgeLabel::Repeat(group) => match &graph.group(*group).separator {
                    None => stack.push((edge.target, pos)),
                    Some(separator) => {
                        let tokens = separator.tokens();
                        let consumed = tokens.iter().enumerate().all(|(offset, expected)| {
                            before_caret(pos + offset).is_some_and(|found| found.same_text(expected))
                        });
                        if consumed {
                            stack.push((edge.target, pos + tokens.len()));
                        }
                    }
                },
                EdgeLabel::Rule(_)
                | EdgeLabel::EnterGroup(_)
                | EdgeLabel::EndIteration(_)
                | EdgeLabel::ExitGroup(_)
                | EdgeLabel::SkipGroup(_) => stack.push((edge.target, pos)),
            }
        }
    }

    debug!(caret, visited = visited.len(), ?kinds, "walked matcher graph");
    kinds
}
