//! Template transcription
//!
//! The matched rule's template is walked depth first. Literal tokens are
//! copied with the definition's hygiene, captured tokens keep the hygiene of
//! the call site, and identifiers the template introduces get a context
//! unique to this expansion. The output is rendered to text together with a
//! map from output offsets back to the invocation body.

use crate::ast::{MacroDefinition, Separator, TemplateElement};
use crate::error::MacroError;
use crate::fragment::{is_atomic_expr, FragmentKind};
use crate::hygiene::fresh_context;
use crate::marks::Mark;
use crate::matcher::{Bindings, Capture, MatchOutcome};
use crate::ranges::{MappedRange, RangeMap};
use mx_intern::{Interner, Symbol};
use mx_span::Span;
use mx_tt::{Delimiter, Renderer, Spacing, SyntaxContext, Token, TokenBuffer, TokenKind};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Output of one expansion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// Output tokens; spans are offsets into `text`
    pub tokens: TokenBuffer,
    /// Rendered output
    pub text: String,
    /// Hygiene context of the identifiers the template introduced
    pub ctx: SyntaxContext,
    /// Call-site span of each output token, `None` for definition tokens
    pub origins: Vec<Option<Span>>,
    /// Output offsets copied from the invocation body
    pub ranges: RangeMap,
    /// Index of the rule that produced the output
    pub rule: usize,
}

impl Expansion {
    /// Mapped ranges whose text differs between `call_body` and the output
    pub fn range_mismatches(&self, call_body: &str) -> Vec<MappedRange> {
        self.ranges.mismatches(call_body, &self.text).collect()
    }
}

struct Emitted {
    token: Token,
    origin: Option<Span>,
    glued: bool,
}

struct Transcriber<'toks> {
    name: &'toks str,
    definition: &'toks MacroDefinition,
    bindings: &'toks Bindings,
    /// Repetition depth each metavariable is bound at
    depths: FxHashMap<Symbol, usize>,
    input: &'toks TokenBuffer,
    interner: &'toks Interner,
    ctx: SyntaxContext,
    out: Vec<Emitted>,
    /// End of the last template token emitted, for gluing by adjacency
    last_template_end: Option<u32>,
}

/// Produces the expansion of `outcome` for the invocation `input`
///
/// # Errors
///
/// Fails when a variable is used at the wrong depth, repetitions disagree
/// on their count or the output does not form balanced token trees.
pub fn transcribe(
    definition: &MacroDefinition,
    outcome: &MatchOutcome,
    input: &TokenBuffer,
    interner: &Interner,
) -> Result<Expansion, MacroError> {
    let name = interner.resolve(&definition.name);
    let Some(rule) = definition.rules.get(outcome.rule) else {
        return Err(MacroError::DefinitionMalformed {
            name: name.to_string(),
            reason: format!("rule {} does not exist", outcome.rule),
        });
    };

    let mut depths = FxHashMap::default();
    for element in &rule.matcher {
        element.for_each_var(0, &mut |var, _, depth| {
            depths.insert(var, depth);
        });
    }

    let mut transcriber = Transcriber {
        name,
        definition,
        bindings: &outcome.bindings,
        depths,
        input,
        interner,
        ctx: fresh_context(),
        out: Vec::new(),
        last_template_end: None,
    };
    transcriber.elements(&rule.template, &mut Vec::new())?;
    let expansion = transcriber.finish(outcome.rule)?;
    debug!(
        macro_name = name,
        rule = outcome.rule,
        tokens = expansion.tokens.len(),
        ctx = %expansion.ctx,
        "transcribed"
    );
    Ok(expansion)
}

/// Follows `indices` into `capture`, stopping at a fragment, which is
/// reused at every deeper index
fn descend<'ctx>(capture: &'ctx Capture, indices: &[usize]) -> Option<&'ctx Capture> {
    let mut current = capture;
    for &index in indices {
        match current {
            Capture::Fragment { .. } => break,
            Capture::Seq(items) => current = items.get(index)?,
        }
    }
    Some(current)
}

impl Transcriber<'_> {
    fn elements(&mut self, elements: &[TemplateElement], indices: &mut Vec<usize>) -> Result<(), MacroError> {
        for element in elements {
            match element {
                TemplateElement::Literal(token) => self.literal(*token),
                TemplateElement::MetaVarRef { dollar, ident } => self.meta_var(*dollar, *ident, indices)?,
                TemplateElement::CrateRef { span } => {
                    let token = Token {
                        kind: TokenKind::CrateRoot,
                        text: self.definition.krate,
                        span: *span,
                        spacing: Spacing::Alone,
                        ctx: self.definition.ctx,
                    };
                    let glued = self.template_glued(span.start);
                    self.emit(token, None, glued);
                    self.last_template_end = Some(span.end);
                }
                TemplateElement::Group {
                    inner,
                    separator,
                    span,
                    ..
                } => self.group(element, inner, separator.as_ref(), *span, indices)?,
            }
        }
        Ok(())
    }

    fn template_glued(&self, start: u32) -> bool {
        self.last_template_end == Some(start)
    }

    fn emit(&mut self, token: Token, origin: Option<Span>, glued: bool) {
        self.out.push(Emitted { token, origin, glued });
    }

    fn literal(&mut self, token: Token) {
        let ctx = match token.kind {
            TokenKind::Ident | TokenKind::Lifetime => self.ctx,
            _ => self.definition.ctx,
        };
        let glued = self.template_glued(token.span.start);
        self.emit(token.with_ctx(ctx), None, glued);
        self.last_template_end = Some(token.span.end);
    }

    fn meta_var(&mut self, dollar: Token, ident: Token, indices: &[usize]) -> Result<(), MacroError> {
        let bindings = self.bindings;
        let Some(capture) = bindings.get(&ident.text) else {
            Mark::UnboundMetaVarInTemplate.hit();
            self.literal(dollar);
            self.literal(ident);
            return Ok(());
        };
        let glued = self.template_glued(dollar.span.start);
        self.last_template_end = Some(ident.span.end);

        match descend(capture, indices) {
            None => Ok(()),
            Some(Capture::Seq(_)) => Err(MacroError::MetaVarReuse {
                name: self.interner.resolve(&ident.text).to_string(),
                bound: self.depths.get(&ident.text).copied().unwrap_or_default(),
                used: indices.len(),
            }),
            Some(Capture::Fragment { kind, range }) => {
                let parenthesise = *kind == FragmentKind::Expr
                    && !is_atomic_expr(self.input, range.start, range.end, self.interner);
                let span = dollar.span.cover(ident.span);
                if parenthesise {
                    self.synthetic(TokenKind::Open(Delimiter::Paren), "(", span, glued);
                }
                self.capture(range.start, range.end, glued || parenthesise);
                if parenthesise {
                    self.synthetic(TokenKind::Close(Delimiter::Paren), ")", span, true);
                }
                Ok(())
            }
        }
    }

    /// Copies input tokens `start..end`, keeping the call site's spacing
    ///
    /// A capture that directly follows another one is glued to it when the
    /// two touch in the call body.
    fn capture(&mut self, start: usize, end: usize, first_glued: bool) {
        let mut previous: Option<Token> = None;
        for index in start..end {
            let Some(&token) = self.input.get(index) else {
                break;
            };
            let glued = match previous {
                Some(prev) => prev.span.end == token.span.start || prev.span == token.span,
                None => {
                    first_glued
                        || self
                            .out
                            .last()
                            .and_then(|last| last.origin)
                            .is_some_and(|origin| origin.end == token.span.start)
                }
            };
            self.emit(token, Some(token.span), glued);
            previous = Some(token);
        }
    }

    /// Emits a token that exists in neither the template nor the input
    fn synthetic(&mut self, kind: TokenKind, text: &str, span: Span, glued: bool) {
        let token = Token::new(kind, self.interner.intern(text), span).with_ctx(self.definition.ctx);
        self.emit(token, None, glued);
    }

    fn separator(&mut self, separator: &Separator) {
        let mut previous: Option<Span> = None;
        for token in separator.tokens() {
            let glued = previous.map_or_else(|| separator.is_list_punct(), |prev| prev.end == token.span.start);
            self.emit(token.with_ctx(self.definition.ctx), None, glued);
            previous = Some(token.span);
        }
    }

    /// Number of iterations of a template group at `indices`
    ///
    /// A group that references no bound metavariable has no count; only the
    /// rule that owns it fails.
    fn iterations(&self, group: &TemplateElement, indices: &[usize]) -> Result<usize, MacroError> {
        let mut referenced = Vec::new();
        group.referenced_vars(&mut referenced);

        let mut count: Option<usize> = None;
        let mut first_bound: Option<Symbol> = None;
        for var in referenced {
            let Some(capture) = self.bindings.get(&var) else {
                continue;
            };
            if first_bound.is_none() {
                first_bound = Some(var);
            }
            let Some(Capture::Seq(items)) = descend(capture, indices) else {
                continue;
            };
            match count {
                None => count = Some(items.len()),
                Some(expected) if expected != items.len() => {
                    return Err(MacroError::ArityMismatch {
                        name: self.interner.resolve(&var).to_string(),
                        expected,
                        found: items.len(),
                    });
                }
                Some(_) => {}
            }
        }

        match (count, first_bound) {
            (Some(count), _) => Ok(count),
            (None, Some(var)) => Err(MacroError::MetaVarReuse {
                name: self.interner.resolve(&var).to_string(),
                bound: self.depths.get(&var).copied().unwrap_or_default(),
                used: indices.len() + 1,
            }),
            (None, None) => Err(MacroError::DefinitionMalformed {
                name: self.name.to_string(),
                reason: format!(
                    "repetition in template at {}..{} contains no meta-variables bound by the matcher",
                    group.span().start,
                    group.span().end
                ),
            }),
        }
    }

    fn group(
        &mut self,
        element: &TemplateElement,
        inner: &[TemplateElement],
        separator: Option<&Separator>,
        span: Span,
        indices: &mut Vec<usize>,
    ) -> Result<(), MacroError> {
        let count = self.iterations(element, indices)?;
        let entry_glued = self.template_glued(span.start);

        for iteration in 0..count {
            if iteration == 0 {
                self.last_template_end = inner
                    .first()
                    .filter(|_| entry_glued)
                    .map(|first| first.span().start);
            } else {
                if let Some(separator) = separator {
                    self.separator(separator);
                }
                self.last_template_end = None;
            }
            indices.push(iteration);
            let result = self.elements(inner, indices);
            indices.pop();
            result?;
        }

        self.last_template_end = (count > 0 || entry_glued).then_some(span.end);
        Ok(())
    }

    fn finish(self, rule: usize) -> Result<Expansion, MacroError> {
        let mut renderer = Renderer::new(self.interner);
        for emitted in &self.out {
            renderer.push(&emitted.token, emitted.glued);
        }
        let rendered = renderer.finish();

        let mut ranges = RangeMap::new();
        let mut tokens = Vec::with_capacity(self.out.len());
        let mut origins = Vec::with_capacity(self.out.len());
        for (emitted, output) in self.out.iter().zip(&rendered.spans) {
            if let Some(origin) = emitted.origin {
                // Lowered doc comments render differently from their source
                if origin.len() == output.len() {
                    ranges.merge_add(MappedRange::new(origin.start, output.start, output.len()));
                }
            }
            tokens.push(Token {
                span: *output,
                ..emitted.token
            });
            origins.push(emitted.origin);
        }

        let tokens = TokenBuffer::new(tokens).map_err(|error| MacroError::DefinitionMalformed {
            name: self.name.to_string(),
            reason: format!("expansion is not balanced: {error}"),
        })?;
        Ok(Expansion {
            tokens,
            text: rendered.text,
            ctx: self.ctx,
            origins,
            ranges,
            rule,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MatcherGraph;
    use crate::marks;
    use crate::matcher::match_rules;
    use crate::parse::parse_rules;
    use expect_test::{expect, Expect};
    use mx_tt::lex;

    fn expand(rules: &[(&str, &str)], body: &str) -> Result<Expansion, MacroError> {
        let interner = Interner::new();
        let definition = parse_rules("m", "demo", rules, &interner, SyntaxContext::ROOT).unwrap();
        let graph = MatcherGraph::compile(&definition, &interner).unwrap();
        let input = lex(body, &interner, SyntaxContext::ROOT).unwrap();
        let outcome = match_rules(&graph, "m", &input, &interner)?;
        let expansion = transcribe(&definition, &outcome, &input, &interner)?;
        assert_eq!(expansion.range_mismatches(body), Vec::new());
        Ok(expansion)
    }

    fn check(rules: &[(&str, &str)], body: &str, expected: Expect) {
        expected.assert_eq(&expand(rules, body).unwrap().text);
    }

    #[test]
    fn test_substitutes_identifier() {
        check(&[("($i:ident)", "(fn $i() {})")], "bar", expect!["fn bar() {}"]);
    }

    #[test]
    fn test_repetition_expands_per_capture() {
        let rules = [("($($i:ident),*)", "($(mod $i {})*)")];
        check(&rules, "", expect![""]);
        check(&rules, "a,b", expect!["mod a {} mod b {}"]);
        check(&[("($($i:ident),*)", "([$($i),*])")], "a, b,c", expect!["[a, b, c]"]);
    }

    #[test]
    fn test_spacing_follows_call_body_and_template() {
        check(&[("($($t:tt)*)", "($($t)*)")], "fn foo() {}", expect!["fn foo() {}"]);
        check(&[("($($t:tt)*)", "($($t)*)")], "a . b", expect!["a . b"]);
        check(
            &[("()", "(impl S { fn foo() -> Self { S } })")],
            "",
            expect!["impl S { fn foo() -> Self { S } }"],
        );
    }

    #[test]
    fn test_separator_terminator_collision() {
        check(&[("($($i:item)=* =)", "($($i)*)")], "fn x(){} =", expect!["fn x(){}"]);
    }

    #[test]
    fn test_crate_ref_names_definition_crate() {
        check(&[("()", "($crate::helper!())")], "", expect!["::demo::helper!()"]);
    }

    #[test]
    fn test_non_atomic_expressions_are_parenthesised() {
        let rules = [("($e:expr)", "($e * 2)")];
        check(&rules, "1 + 1", expect!["(1 + 1) * 2"]);
        check(&rules, "f(1)", expect!["(f(1)) * 2"]);
        check(&rules, "x", expect!["x * 2"]);
        check(&rules, "[1, 2]", expect!["[1, 2] * 2"]);
    }

    #[test]
    fn test_nested_repetitions_reuse_outer_fragments() {
        check(
            &[("($($k:ident: $($v:literal)*);*)", "($($($k = $v;)*)*)")],
            "a: 1 2; b: 3",
            expect!["a = 1; a = 2; b = 3;"],
        );
    }

    #[test]
    fn test_arity_mismatch() {
        let error = expand(&[("($($a:ident)* ; $($b:ident)*)", "($($a $b)*)")], "x y ; z").unwrap_err();
        assert_eq!(
            error,
            MacroError::ArityMismatch {
                name: "b".to_string(),
                expected: 2,
                found: 1,
            }
        );
    }

    #[test]
    fn test_meta_var_used_at_wrong_depth() {
        let shallow = expand(&[("($($a:ident)*)", "($a)")], "x y").unwrap_err();
        assert_eq!(
            shallow,
            MacroError::MetaVarReuse {
                name: "a".to_string(),
                bound: 1,
                used: 0,
            }
        );
        let deep = expand(&[("($a:ident)", "($($a)*)")], "x").unwrap_err();
        assert!(matches!(deep, MacroError::MetaVarReuse { bound: 0, used: 1, .. }));
    }

    #[test]
    fn test_unbound_meta_var_is_kept_verbatim() {
        let tracker = marks::track();
        check(&[("($a:ident)", "($a $b)")], "x", expect!["x $b"]);
        assert_eq!(tracker.hits(Mark::UnboundMetaVarInTemplate), 1);
    }

    #[test]
    fn test_template_identifiers_get_fresh_hygiene() {
        let rules = [("($v:ident)", "(let tmp = $v;)")];
        let first = expand(&rules, "tmp").unwrap();
        let second = expand(&rules, "tmp").unwrap();
        assert_eq!(first.text, "let tmp = tmp;");
        assert_ne!(first.ctx, second.ctx);

        let tokens = first.tokens.tokens();
        assert_eq!(tokens[1].ctx, first.ctx);
        assert_eq!(tokens[3].ctx, SyntaxContext::ROOT);
        assert!(!tokens[1].same_binding(&tokens[3]));
        assert_eq!(tokens[2].ctx, SyntaxContext::ROOT);
    }

    #[test]
    fn test_offset_map_points_into_call_body() {
        let copied = expand(&[("($i:ident)", "(fn $i() {})")], "  bar ").unwrap();
        assert_eq!(copied.ranges.ranges(), &[MappedRange::new(2, 3, 3)]);
        assert_eq!(copied.origins[0], None);
        assert_eq!(copied.origins[1], Some(Span::new(2, 5)));
        assert_eq!(copied.tokens.tokens()[1].span, Span::new(3, 6));

        let fragment = expand(&[("($e:expr)", "($e * 2)")], "1 + 1").unwrap();
        assert_eq!(fragment.ranges.ranges(), &[MappedRange::new(0, 1, 5)]);
    }
}
