//! Reading macro definitions from text
//!
//! A definition arrives either as `(matcher, template)` text pairs or as a
//! whole `macro_rules! name { ... }` item. Both are lexed into token buffers
//! and then read into [`MatcherElement`] and [`TemplateElement`] trees.

use crate::ast::{MacroDefinition, MatcherElement, RepeatOp, Rule, Separator, TemplateElement};
use crate::error::DefinitionError;
use crate::fragment::{Cursor, FragmentKind};
use miette::{NamedSource, SourceSpan};
use mx_intern::{Interner, Symbol};
use mx_span::Span;
use mx_tt::{lex, Delimiter, LexError, SyntaxContext, Token, TokenBuffer, TokenKind};
use rustc_hash::FxHashSet;
use std::ops::Range;

/// Builds a definition from `(matcher, template)` text pairs
///
/// Each text may be written with or without its outer delimiters; a text
/// that is exactly one delimited tree is unwrapped.
///
/// # Errors
///
/// Fails when a matcher or template does not lex or is malformed.
pub fn parse_rules(
    name: &str,
    krate: &str,
    rules: &[(&str, &str)],
    interner: &Interner,
    ctx: SyntaxContext,
) -> Result<MacroDefinition, DefinitionError> {
    let mut parsed = Vec::with_capacity(rules.len());
    let mut source = String::new();
    for (index, (matcher_text, template_text)) in rules.iter().enumerate() {
        let matcher_name = format!("{name} rule {index} matcher");
        let matcher_buffer = lex_definition(matcher_text, &matcher_name, interner, ctx)?;
        let mut matcher_reader = DefinitionReader::new(&matcher_buffer, interner, krate, matcher_text, &matcher_name);
        let matcher = matcher_reader.matcher(unwrap_tree(&matcher_buffer))?;

        let template_name = format!("{name} rule {index} template");
        let template_buffer = lex_definition(template_text, &template_name, interner, ctx)?;
        let template_reader = DefinitionReader::new(&template_buffer, interner, krate, template_text, &template_name);
        let template = template_reader.template(unwrap_tree(&template_buffer))?;

        source.push_str(matcher_text);
        source.push_str(" => ");
        source.push_str(template_text);
        source.push_str(";\n");
        parsed.push(Rule { matcher, template });
    }
    Ok(MacroDefinition {
        name: interner.intern(name),
        krate: interner.intern(krate),
        rules: parsed,
        ctx,
        source,
    })
}

/// Builds a definition from `macro_rules! name { (...) => {...}; ... }`
///
/// # Errors
///
/// Fails when `text` is not a `macro_rules!` item or one of its rules is
/// malformed.
pub fn parse_macro_rules(
    text: &str,
    krate: &str,
    interner: &Interner,
    ctx: SyntaxContext,
) -> Result<MacroDefinition, DefinitionError> {
    let buffer = lex_definition(text, "macro_rules", interner, ctx)?;
    let mut reader = DefinitionReader::new(&buffer, interner, krate, text, "macro_rules");
    let (name, body) = reader.header()?;
    let mut rules = Vec::new();
    let mut index = body.start;
    while index < body.end {
        let matcher_range = reader.expect_tree(index, "a delimited matcher")?;
        index = matcher_range.end + 1;
        reader.expect_arrow(index)?;
        index += 2;
        let template_range = reader.expect_tree(index, "a delimited template")?;
        index = template_range.end + 1;

        reader.bound.clear();
        let matcher = reader.matcher(matcher_range)?;
        let template = reader.template(template_range)?;
        rules.push(Rule { matcher, template });

        if index < body.end {
            if !reader.token(index).is_punct(';') {
                return Err(reader.syntax(index, "`;` between rules"));
            }
            index += 1;
        }
    }
    Ok(MacroDefinition {
        name,
        krate: interner.intern(krate),
        rules,
        ctx,
        source: text.to_string(),
    })
}

fn lex_definition(
    text: &str,
    source_name: &str,
    interner: &Interner,
    ctx: SyntaxContext,
) -> Result<TokenBuffer, DefinitionError> {
    lex(text, interner, ctx).map_err(|error: LexError| DefinitionError::Lex {
        message: error.to_string(),
        span: source_span(error.span()),
        src: NamedSource::new(source_name, text.to_string()),
    })
}

/// The contents of a buffer holding exactly one delimited tree, or the
/// whole buffer
fn unwrap_tree(buffer: &TokenBuffer) -> Range<usize> {
    let single_tree = matches!(buffer.get(0).map(|token| token.kind), Some(TokenKind::Open(_)))
        && buffer.tree_end(0) == buffer.len();
    if single_tree {
        1..buffer.len() - 1
    } else {
        0..buffer.len()
    }
}

fn source_span(span: Span) -> SourceSpan {
    SourceSpan::from(span.range())
}

struct DefinitionReader<'text> {
    buffer: &'text TokenBuffer,
    interner: &'text Interner,
    krate: Symbol,
    text: &'text str,
    source_name: &'text str,
    /// Metavariables bound so far by the current matcher
    bound: FxHashSet<Symbol>,
}

impl<'text> DefinitionReader<'text> {
    fn new(
        buffer: &'text TokenBuffer,
        interner: &'text Interner,
        krate: &str,
        text: &'text str,
        source_name: &'text str,
    ) -> Self {
        Self {
            buffer,
            interner,
            krate: interner.intern(krate),
            text,
            source_name,
            bound: FxHashSet::default(),
        }
    }

    fn src(&self) -> NamedSource<String> {
        NamedSource::new(self.source_name, self.text.to_string())
    }

    fn token(&self, index: usize) -> Token {
        self.buffer.tokens()[index]
    }

    /// Span of the token at `index`, or an empty span at the end of input
    fn span_at(&self, index: usize) -> Span {
        self.buffer
            .get(index)
            .map_or_else(|| Span::empty(self.buffer.end_offset()), |token| token.span)
    }

    fn syntax(&self, index: usize, expected: &str) -> DefinitionError {
        DefinitionError::Syntax {
            expected: expected.to_string(),
            span: source_span(self.span_at(index)),
            src: self.src(),
        }
    }

    /// Reads `macro_rules! name`, returning the name and the body range
    fn header(&mut self) -> Result<(Symbol, Range<usize>), DefinitionError> {
        let mut index = 0;
        // Leading attributes, doc comments included
        while self.buffer.get(index).is_some_and(|token| token.is_punct('#')) {
            index += 1;
            if self.buffer.get(index).is_some_and(|token| token.is_punct('!')) {
                index += 1;
            }
            if !matches!(self.buffer.get(index).map(|token| token.kind), Some(TokenKind::Open(Delimiter::Bracket))) {
                return Err(self.syntax(index, "an attribute"));
            }
            index = self.buffer.tree_end(index);
        }
        if !self
            .buffer
            .get(index)
            .is_some_and(|token| token.is_keyword("macro_rules", self.interner))
        {
            return Err(self.syntax(index, "`macro_rules`"));
        }
        if !self.buffer.get(index + 1).is_some_and(|token| token.is_punct('!')) {
            return Err(self.syntax(index + 1, "`!`"));
        }
        let Some(name) = self.buffer.get(index + 2).filter(|token| token.is_ident()) else {
            return Err(self.syntax(index + 2, "a macro name"));
        };
        let name = name.text;
        let body = self.expect_tree(index + 3, "a delimited macro body")?;
        let mut end = body.end + 1;
        if self.buffer.get(end).is_some_and(|token| token.is_punct(';')) {
            end += 1;
        }
        if end < self.buffer.len() {
            return Err(self.syntax(end, "end of definition"));
        }
        Ok((name, body))
    }

    /// Expects a delimited tree at `index`, returning the range of its
    /// contents; the closing delimiter sits at `range.end`
    fn expect_tree(&self, index: usize, expected: &str) -> Result<Range<usize>, DefinitionError> {
        match self.buffer.get(index).map(|token| token.kind) {
            Some(TokenKind::Open(_)) => Ok(index + 1..self.buffer.partner(index)),
            _ => Err(self.syntax(index, expected)),
        }
    }

    fn expect_arrow(&self, index: usize) -> Result<(), DefinitionError> {
        let arrow = self.buffer.get(index).is_some_and(|token| token.is_punct('='))
            && self.buffer.get(index).is_some_and(|token| token.spacing == mx_tt::Spacing::Joint)
            && self.buffer.get(index + 1).is_some_and(|token| token.is_punct('>'));
        if arrow {
            Ok(())
        } else {
            Err(self.syntax(index, "`=>`"))
        }
    }

    fn matcher(&mut self, range: Range<usize>) -> Result<Vec<MatcherElement>, DefinitionError> {
        let mut elements = Vec::new();
        let mut index = range.start;
        while index < range.end {
            let token = self.token(index);
            match token.kind {
                TokenKind::Punct('$') if index + 1 < range.end => {
                    let next = self.token(index + 1);
                    match next.kind {
                        TokenKind::Open(Delimiter::Paren) => {
                            let close = self.buffer.partner(index + 1);
                            let inner = self.matcher(index + 2..close)?;
                            let (separator, op, end) = self.repetition(close + 1, range.end)?;
                            elements.push(MatcherElement::Group {
                                inner,
                                separator,
                                op,
                                span: token.span.cover(self.token(end - 1).span),
                            });
                            index = end;
                        }
                        TokenKind::Ident if self.interner.resolve(&next.text) == "crate" => {
                            elements.push(MatcherElement::Literal(self.crate_root(token, next)));
                            index += 2;
                        }
                        TokenKind::Ident => {
                            elements.push(self.meta_var(index, range.end)?);
                            index += 4;
                        }
                        _ => {
                            elements.push(MatcherElement::Literal(token));
                            index += 1;
                        }
                    }
                }
                TokenKind::Open(delimiter) => {
                    let close = self.buffer.partner(index);
                    let inner = self.matcher(index + 1..close)?;
                    elements.push(MatcherElement::Delimited {
                        delimiter,
                        open: token,
                        close: self.token(close),
                        inner,
                    });
                    index = close + 1;
                }
                _ => {
                    elements.push(MatcherElement::Literal(token));
                    index += 1;
                }
            }
        }
        Ok(elements)
    }

    /// `$name:kind` starting at the `$` at `index`
    fn meta_var(&mut self, index: usize, end: usize) -> Result<MatcherElement, DefinitionError> {
        let dollar = self.token(index);
        let ident = self.token(index + 1);
        let name = self.interner.resolve(&ident.text).to_string();
        let colon = index + 2 < end && self.token(index + 2).is_punct(':');
        let specifier = (index + 3 < end)
            .then(|| self.token(index + 3))
            .filter(|token| token.is_ident());
        let (true, Some(specifier)) = (colon, specifier) else {
            return Err(DefinitionError::MissingFragment {
                name,
                span: source_span(dollar.span.cover(ident.span)),
                src: self.src(),
            });
        };
        let kind: FragmentKind = self
            .interner
            .resolve(&specifier.text)
            .parse()
            .map_err(|_| DefinitionError::UnknownFragment {
                found: self.interner.resolve(&specifier.text).to_string(),
                span: source_span(specifier.span),
                src: self.src(),
            })?;
        let span = dollar.span.cover(specifier.span);
        if !self.bound.insert(ident.text) {
            return Err(DefinitionError::DuplicateBinding {
                name,
                span: source_span(span),
                src: self.src(),
            });
        }
        Ok(MatcherElement::MetaVar {
            name: ident.text,
            kind,
            span,
        })
    }

    fn crate_root(&self, dollar: Token, ident: Token) -> Token {
        Token {
            kind: TokenKind::CrateRoot,
            text: self.krate,
            span: dollar.span.cover(ident.span),
            spacing: ident.spacing,
            ctx: ident.ctx,
        }
    }

    /// Separator and operator after the `)` of a repetition
    ///
    /// Returns the index just past the operator.
    fn repetition(
        &self,
        index: usize,
        end: usize,
    ) -> Result<(Option<Separator>, RepeatOp, usize), DefinitionError> {
        let missing = |at: usize| DefinitionError::MissingRepetitionOperator {
            span: source_span(self.span_at(at.saturating_sub(1))),
            src: self.src(),
        };
        if index >= end {
            return Err(missing(index));
        }
        let first = self.token(index);
        if let TokenKind::Punct(ch) = first.kind
            && let Some(op) = RepeatOp::from_char(ch)
        {
            return Ok((None, op, index + 1));
        }
        if matches!(first.kind, TokenKind::Open(_) | TokenKind::Close(_)) {
            return Err(missing(index));
        }

        let cursor = Cursor::new(self.buffer, self.interner, index);
        let separator_len = cursor.op_len().max(1);
        let op_index = index + separator_len;
        if op_index >= end {
            return Err(missing(op_index));
        }
        let separator = Separator(self.buffer.tokens()[index..op_index].to_vec());
        match self.token(op_index).kind {
            TokenKind::Punct('?') => Err(DefinitionError::SeparatorOnOptional {
                span: source_span(first.span),
                src: self.src(),
            }),
            TokenKind::Punct(ch) => match RepeatOp::from_char(ch) {
                Some(op) => Ok((Some(separator), op, op_index + 1)),
                None => Err(missing(op_index)),
            },
            _ => Err(missing(op_index)),
        }
    }

    fn template(&self, range: Range<usize>) -> Result<Vec<TemplateElement>, DefinitionError> {
        let mut elements = Vec::new();
        let mut index = range.start;
        while index < range.end {
            let token = self.token(index);
            if !token.is_punct('$') || index + 1 >= range.end {
                elements.push(TemplateElement::Literal(token));
                index += 1;
                continue;
            }
            let next = self.token(index + 1);
            match next.kind {
                TokenKind::Open(Delimiter::Paren) => {
                    let close = self.buffer.partner(index + 1);
                    let inner = self.template(index + 2..close)?;
                    let (separator, op, end) = self.repetition(close + 1, range.end)?;
                    elements.push(TemplateElement::Group {
                        inner,
                        separator,
                        op,
                        span: token.span.cover(self.token(end - 1).span),
                    });
                    index = end;
                }
                TokenKind::Ident if self.interner.resolve(&next.text) == "crate" => {
                    elements.push(TemplateElement::CrateRef {
                        span: token.span.cover(next.span),
                    });
                    index += 2;
                }
                TokenKind::Ident => {
                    elements.push(TemplateElement::MetaVarRef {
                        dollar: token,
                        ident: next,
                    });
                    index += 2;
                }
                _ => {
                    elements.push(TemplateElement::Literal(token));
                    index += 1;
                }
            }
        }
        Ok(elements)
    }
}

/// A fragment followed by a token its recogniser would read on into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowWarning {
    /// Rule index
    pub rule: usize,
    /// Metavariable name
    pub name: String,
    /// Its fragment kind
    pub kind: FragmentKind,
    /// The token that follows it
    pub found: String,
    /// Location of the metavariable
    pub span: Span,
}

/// Finds fragments followed by tokens outside their stop set
///
/// Such matchers still work, but the fragment swallows the token and the
/// literal after it can never match.
pub fn check_follow_sets(definition: &MacroDefinition, interner: &Interner) -> Vec<FollowWarning> {
    let mut warnings = Vec::new();
    for (rule, body) in definition.rules.iter().enumerate() {
        follow_in(&body.matcher, None, rule, interner, &mut warnings);
    }
    warnings
}

fn follow_in(
    elements: &[MatcherElement],
    trailing: Option<&Separator>,
    rule: usize,
    interner: &Interner,
    warnings: &mut Vec<FollowWarning>,
) {
    for (index, element) in elements.iter().enumerate() {
        match element {
            MatcherElement::MetaVar { name, kind, span } => {
                let Some(stops) = kind.stop_tokens() else {
                    continue;
                };
                let follower = match elements.get(index + 1) {
                    Some(MatcherElement::Literal(_)) => Some(literal_run(&elements[index + 1..], interner)),
                    Some(MatcherElement::Delimited { delimiter, .. }) => Some(delimiter.open_char().to_string()),
                    Some(_) => None,
                    None => trailing.map(|separator| separator.text(interner)),
                };
                let Some(found) = follower else {
                    continue;
                };
                let allowed = stops.contains(&found.as_str())
                    || (*kind == FragmentKind::Vis && !found.starts_with(|ch: char| ch.is_ascii_punctuation()));
                if !allowed {
                    warnings.push(FollowWarning {
                        rule,
                        name: interner.resolve(name).to_string(),
                        kind: *kind,
                        found,
                        span: *span,
                    });
                }
            }
            MatcherElement::Group { inner, separator, .. } => {
                follow_in(inner, separator.as_ref(), rule, interner, warnings);
            }
            MatcherElement::Delimited { inner, .. } => {
                follow_in(inner, None, rule, interner, warnings);
            }
            MatcherElement::Literal(_) => {}
        }
    }
}

/// Text of the literal run starting the slice, gluing joint punctuation
fn literal_run(elements: &[MatcherElement], interner: &Interner) -> String {
    let mut text = String::new();
    for element in elements {
        let MatcherElement::Literal(token) = element else {
            break;
        };
        text.push_str(interner.resolve(&token.text));
        let glued = matches!(token.kind, TokenKind::Punct(_)) && token.spacing == mx_tt::Spacing::Joint;
        if !glued || text.len() >= 3 {
            break;
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher_shape(elements: &[MatcherElement], interner: &Interner) -> String {
        elements
            .iter()
            .map(|element| match element {
                MatcherElement::Literal(token) => token.display_text(interner).to_string(),
                MatcherElement::MetaVar { name, kind, .. } => {
                    format!("${}:{kind}", interner.resolve(name))
                }
                MatcherElement::Group { inner, separator, op, .. } => format!(
                    "$({}){}{op}",
                    matcher_shape(inner, interner),
                    separator.as_ref().map(|sep| sep.text(interner)).unwrap_or_default()
                ),
                MatcherElement::Delimited { delimiter, inner, .. } => format!(
                    "{}{}{}",
                    delimiter.open_char(),
                    matcher_shape(inner, interner),
                    delimiter.close_char()
                ),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_parse_rule_pairs() {
        let interner = Interner::new();
        let definition = parse_rules(
            "foo",
            "demo",
            &[("($($i:ident),* ; [$e:expr] $crate)", "{ $($i)* }")],
            &interner,
            SyntaxContext::ROOT,
        )
        .unwrap();
        assert_eq!(
            matcher_shape(&definition.rules[0].matcher, &interner),
            "$($i:ident),* ; [$e:expr] ::demo"
        );
        assert!(matches!(
            definition.rules[0].template.as_slice(),
            [TemplateElement::Group { separator: None, op: RepeatOp::ZeroOrMore, .. }]
        ));
    }

    #[test]
    fn test_parse_macro_rules_source() {
        let interner = Interner::new();
        let definition = parse_macro_rules(
            "/// Doc\nmacro_rules! pair { ($a:tt => $b:tt) => { ($a, $b) }; () => [()] }",
            "demo",
            &interner,
            SyntaxContext::ROOT,
        )
        .unwrap();
        assert_eq!(interner.resolve(&definition.name), "pair");
        assert_eq!(definition.rules.len(), 2);
        assert_eq!(
            matcher_shape(&definition.rules[0].matcher, &interner),
            "$a:tt = > $b:tt"
        );
        assert!(definition.rules[1].matcher.is_empty());
    }

    #[test]
    fn test_glued_separators() {
        let interner = Interner::new();
        let definition = parse_rules(
            "m",
            "demo",
            &[("$($k:ident => $v:expr)=>* $($i:item)=* =", "")],
            &interner,
            SyntaxContext::ROOT,
        )
        .unwrap();
        assert_eq!(
            matcher_shape(&definition.rules[0].matcher, &interner),
            "$($k:ident = > $v:expr)=>* $($i:item)=* ="
        );
    }

    #[test]
    fn test_definition_errors() {
        let interner = Interner::new();
        let error = |matcher: &str| {
            parse_rules("m", "demo", &[(matcher, "")], &interner, SyntaxContext::ROOT)
                .unwrap_err()
                .to_string()
        };
        assert_eq!(error("($x)"), "missing fragment specifier for `$x`");
        assert_eq!(error("($x:expression)"), "invalid fragment specifier `expression`");
        assert_eq!(error("($x:tt $x:tt)"), "duplicate matcher binding `$x`");
        assert_eq!(error("($($x:tt))"), "expected one of `*`, `+` or `?` after repetition");
        assert_eq!(error("($($x:tt),?)"), "the `?` repetition operator does not take a separator");
        assert!(error("(a").contains("unclosed delimiter"));

        let missing_arrow = parse_macro_rules("macro_rules! m { () {} }", "demo", &interner, SyntaxContext::ROOT)
            .unwrap_err()
            .to_string();
        assert_eq!(missing_arrow, "expected `=>`");
    }

    #[test]
    fn test_follow_set_warnings() {
        let interner = Interner::new();
        let definition = parse_rules(
            "m",
            "demo",
            &[
                ("($e:expr => $t:ty, $($p:pat)|*)", ""),
                ("($e:expr + 1)", ""),
                ("($($e:expr)-*)", ""),
            ],
            &interner,
            SyntaxContext::ROOT,
        )
        .unwrap();
        let warnings: Vec<_> = check_follow_sets(&definition, &interner)
            .into_iter()
            .map(|warning| (warning.rule, warning.name, warning.found))
            .collect();
        assert_eq!(
            warnings,
            vec![(1, "e".to_string(), "+".to_string()), (2, "e".to_string(), "-".to_string())]
        );
    }
}
