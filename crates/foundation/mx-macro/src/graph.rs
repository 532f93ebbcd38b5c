//! Matcher graph
//!
//! Every rule of a definition is compiled onto one graph with a shared start
//! node and one end node per rule. Elements become edges: literals and
//! fragments consume input, group bookkeeping edges do not. A repetition is a
//! local loop from its `GroupEnd` back to its `GroupStart`, labelled with the
//! separator, plus a skip edge around the group when zero iterations are
//! allowed.
//!
//! The binder follows one path through the graph per rule; the walker
//! explores every path at once.

use crate::ast::{MacroDefinition, MatcherElement, RepeatOp, Separator};
use crate::error::MacroError;
use crate::fragment::FragmentKind;
use indexmap::IndexMap;
use la_arena::{Arena, Idx};
use mx_intern::{Interner, Symbol};
use mx_tt::{Spacing, Token, TokenKind};

/// Node index
pub type NodeId = Idx<Node>;
/// Repetition group index
pub type GroupId = Idx<GroupInfo>;

/// What a node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Shared entry of every rule
    Start,
    /// Position between two elements
    Step,
    /// Entry of one repetition iteration
    GroupStart(GroupId),
    /// Exit of one repetition iteration
    GroupEnd(GroupId),
    /// Accepting node of a rule
    End(usize),
}

/// Edge label
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeLabel {
    /// From the start node into a rule
    Rule(usize),
    /// Consumes one token equal in kind and text
    Literal {
        /// Expected token
        token: Token,
        /// The next matcher token is punctuation glued to this one
        joint: bool,
    },
    /// Consumes one fragment and binds it
    Fragment {
        /// Metavariable name
        name: Symbol,
        /// Fragment kind
        kind: FragmentKind,
    },
    /// Starts the first iteration of a group
    EnterGroup(GroupId),
    /// Ends the current iteration
    EndIteration(GroupId),
    /// Consumes the separator and starts another iteration
    Repeat(GroupId),
    /// Leaves a group after at least one iteration
    ExitGroup(GroupId),
    /// Bypasses a group that may match zero times
    SkipGroup(GroupId),
}

/// Directed edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Label
    pub label: EdgeLabel,
    /// Target node
    pub target: NodeId,
}

/// Graph node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Role of the node
    pub kind: NodeKind,
    /// Outgoing edges; the first one continues the rule's element chain
    pub edges: Vec<Edge>,
}

impl Node {
    /// The edge that continues the element chain
    pub fn forward(&self) -> Option<&Edge> {
        self.edges.first()
    }
}

/// Compiled repetition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    /// Kleene operator
    pub op: RepeatOp,
    /// Separator between iterations
    pub separator: Option<Separator>,
    /// `GroupStart` node
    pub start: NodeId,
    /// `GroupEnd` node
    pub end: NodeId,
    /// Node after the group
    pub after: NodeId,
    /// Metavariables bound anywhere inside, in declaration order
    pub vars: Vec<Symbol>,
}

/// Per-rule view of the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleInfo {
    /// First node of the rule's chain
    pub entry: NodeId,
    /// The rule's `End` node
    pub end: NodeId,
    /// Fragment kind and repetition depth of each metavariable
    pub vars: IndexMap<Symbol, (FragmentKind, usize)>,
}

/// The compiled matcher of one definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatcherGraph {
    nodes: Arena<Node>,
    groups: Arena<GroupInfo>,
    start: NodeId,
    rules: Vec<RuleInfo>,
}

impl MatcherGraph {
    /// Compiles every rule of `definition`
    ///
    /// # Errors
    ///
    /// Returns [`MacroError::DefinitionMalformed`] when a repetition can
    /// match empty input unboundedly.
    pub fn compile(definition: &MacroDefinition, interner: &Interner) -> Result<Self, MacroError> {
        let name = interner.resolve(&definition.name).to_string();
        let mut builder = Builder {
            nodes: Arena::default(),
            groups: Arena::default(),
            name: &name,
            interner,
        };
        let start = builder.node(NodeKind::Start);
        let mut rules = Vec::with_capacity(definition.rules.len());

        for (index, rule) in definition.rules.iter().enumerate() {
            let end = builder.node(NodeKind::End(index));
            let entry = if rule.matcher.is_empty() {
                end
            } else {
                builder.node(NodeKind::Step)
            };
            builder.edge(start, EdgeLabel::Rule(index), entry);
            builder.sequence(&rule.matcher, entry, end)?;

            let mut vars = IndexMap::new();
            for element in &rule.matcher {
                element.for_each_var(0, &mut |var, kind, depth| {
                    vars.insert(var, (kind, depth));
                });
            }
            rules.push(RuleInfo { entry, end, vars });
        }

        Ok(Self {
            nodes: builder.nodes,
            groups: builder.groups,
            start,
            rules,
        })
    }

    /// The shared start node
    pub fn start(&self) -> NodeId {
        self.start
    }

    /// Node by index
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Group by index
    pub fn group(&self, id: GroupId) -> &GroupInfo {
        &self.groups[id]
    }

    /// Compiled rules in declaration order
    pub fn rules(&self) -> &[RuleInfo] {
        &self.rules
    }
}

struct Builder<'def> {
    nodes: Arena<Node>,
    groups: Arena<GroupInfo>,
    name: &'def str,
    interner: &'def Interner,
}

impl Builder<'_> {
    fn node(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.alloc(Node {
            kind,
            edges: Vec::new(),
        })
    }

    fn edge(&mut self, from: NodeId, label: EdgeLabel, target: NodeId) {
        self.nodes[from].edges.push(Edge { label, target });
    }

    /// Compiles `elements` as a chain from `from` to `to`
    ///
    /// An empty sequence requires `from == to`.
    fn sequence(&mut self, elements: &[MatcherElement], from: NodeId, to: NodeId) -> Result<(), MacroError> {
        let mut current = from;
        for (index, element) in elements.iter().enumerate() {
            let next = if index + 1 == elements.len() {
                to
            } else {
                self.node(NodeKind::Step)
            };
            match element {
                MatcherElement::Literal(token) => {
                    let joint = token.spacing == Spacing::Joint
                        && matches!(token.kind, TokenKind::Punct(_))
                        && matches!(
                            elements.get(index + 1),
                            Some(MatcherElement::Literal(next)) if matches!(next.kind, TokenKind::Punct(_))
                        );
                    self.edge(current, EdgeLabel::Literal { token: *token, joint }, next);
                }
                MatcherElement::MetaVar { name, kind, .. } => {
                    self.edge(current, EdgeLabel::Fragment { name: *name, kind: *kind }, next);
                }
                MatcherElement::Delimited { open, close, inner, .. } => {
                    let inside = self.node(NodeKind::Step);
                    let before_close = if inner.is_empty() {
                        inside
                    } else {
                        self.node(NodeKind::Step)
                    };
                    self.edge(current, EdgeLabel::Literal { token: *open, joint: false }, inside);
                    self.sequence(inner, inside, before_close)?;
                    self.edge(before_close, EdgeLabel::Literal { token: *close, joint: false }, next);
                }
                MatcherElement::Group { inner, separator, op, .. } => {
                    self.group(current, next, inner, separator.as_ref(), *op)?;
                }
            }
            current = next;
        }
        Ok(())
    }

    fn group(
        &mut self,
        from: NodeId,
        after: NodeId,
        inner: &[MatcherElement],
        separator: Option<&Separator>,
        op: RepeatOp,
    ) -> Result<(), MacroError> {
        if separator.is_none() && op.allows_many() && inner.iter().all(is_nullable) {
            return Err(MacroError::DefinitionMalformed {
                name: self.name.to_string(),
                reason: "repetition matches empty token tree".to_string(),
            });
        }

        let mut vars = Vec::new();
        for element in inner {
            element.for_each_var(0, &mut |var, _, _| vars.push(var));
        }

        let start = self.node(NodeKind::Step);
        let end = self.node(NodeKind::Step);
        let id = self.groups.alloc(GroupInfo {
            op,
            separator: separator.cloned(),
            start,
            end,
            after,
            vars,
        });
        self.nodes[start].kind = NodeKind::GroupStart(id);
        self.nodes[end].kind = NodeKind::GroupEnd(id);

        self.edge(from, EdgeLabel::EnterGroup(id), start);
        if op.allows_zero() {
            self.edge(from, EdgeLabel::SkipGroup(id), after);
        }
        if inner.is_empty() {
            self.edge(start, EdgeLabel::EndIteration(id), end);
        } else {
            self.sequence(inner, start, end)?;
        }
        // The exit edge comes first so the chain continues past the group
        self.edge(end, EdgeLabel::ExitGroup(id), after);
        if op.allows_many() {
            self.edge(end, EdgeLabel::Repeat(id), start);
        }
        tracing::trace!(
            macro_name = self.name,
            separator = %separator.map(|sep| sep.text(self.interner)).unwrap_or_default(),
            %op,
            "compiled repetition"
        );
        Ok(())
    }
}

/// Whether an element can match without consuming input
fn is_nullable(element: &MatcherElement) -> bool {
    match element {
        MatcherElement::MetaVar { kind, .. } => kind.can_be_empty(),
        MatcherElement::Group { op, inner, .. } => {
            op.allows_zero() || inner.iter().all(is_nullable)
        }
        MatcherElement::Literal(_) | MatcherElement::Delimited { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_rules;
    use mx_tt::SyntaxContext;

    fn compile(rules: &[(&str, &str)]) -> Result<MatcherGraph, MacroError> {
        let interner = Interner::new();
        let definition = parse_rules("m", "demo", rules, &interner, SyntaxContext::ROOT).unwrap();
        MatcherGraph::compile(&definition, &interner)
    }

    #[test]
    fn test_rules_share_start() {
        let graph = compile(&[("($e:expr)", "$e"), ("($i:ident)", "$i")]).unwrap();
        let start = graph.node(graph.start());
        assert_eq!(start.edges.len(), 2);
        for (index, rule) in graph.rules().iter().enumerate() {
            assert_eq!(start.edges[index].label, EdgeLabel::Rule(index));
            let entry = graph.node(rule.entry);
            assert!(matches!(entry.edges[0].label, EdgeLabel::Fragment { .. }));
            assert_eq!(entry.edges[0].target, rule.end);
            assert_eq!(graph.node(rule.end).kind, NodeKind::End(index));
        }
    }

    #[test]
    fn test_group_loop_shape() {
        let graph = compile(&[("($($i:ident),*)", "$($i)*")]).unwrap();
        let rule = &graph.rules()[0];
        let entry = graph.node(rule.entry);
        let labels: Vec<_> = entry.edges.iter().map(|edge| &edge.label).collect();
        assert!(matches!(labels.as_slice(), [EdgeLabel::EnterGroup(_), EdgeLabel::SkipGroup(_)]));

        let EdgeLabel::EnterGroup(id) = entry.edges[0].label else {
            unreachable!()
        };
        let group = graph.group(id);
        assert_eq!(group.vars.len(), 1);
        let end = graph.node(group.end);
        assert_eq!(end.edges[0].label, EdgeLabel::ExitGroup(id));
        assert_eq!(end.edges[1], Edge { label: EdgeLabel::Repeat(id), target: group.start });
        assert_eq!(group.after, rule.end);
        assert_eq!(rule.vars.values().next(), Some(&(FragmentKind::Ident, 1)));
    }

    #[test]
    fn test_optional_group_has_no_back_edge() {
        let graph = compile(&[("($($v:vis)? x)", "")]).unwrap();
        let entry = graph.node(graph.rules()[0].entry);
        let EdgeLabel::EnterGroup(id) = entry.edges[0].label else {
            unreachable!()
        };
        assert_eq!(graph.node(graph.group(id).end).edges.len(), 1);
    }

    #[test]
    fn test_rejects_empty_repetition() {
        let malformed = |matcher: &str| matches!(compile(&[(matcher, "")]), Err(MacroError::DefinitionMalformed { .. }));
        assert!(malformed("($($v:vis)*)"));
        assert!(malformed("($($($a:ident)?)+)"));
        assert!(malformed("($()*)"));
        assert!(!malformed("($($v:vis),*)"));
        assert!(!malformed("($($v:vis)?)"));
        assert!(!malformed("($($t:tt)*)"));
    }

    #[test]
    fn test_template_repetitions_are_not_checked_at_compile_time() {
        assert!(compile(&[("($($i:ident)*)", "$(x)*")]).is_ok());
    }
}
