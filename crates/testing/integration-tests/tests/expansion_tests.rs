//! Matching and transcription through the driver

use integration_tests::{expand_text, TestFixture};
use mx_driver::{BranchFailure, DriverError};
use mx_macro::{CallContext, FailureReason, MacroError};

fn expand(rules: &[(&str, &str)], body: &str) -> Result<String, DriverError> {
    expand_text(rules, body, CallContext::Item)
}

fn failure_reasons(error: &DriverError) -> Vec<FailureReason> {
    match error {
        DriverError::Expansion(error) => error.failures().iter().map(|failure| failure.reason).collect(),
        _ => Vec::new(),
    }
}

#[test]
fn test_identifier_becomes_function_name() {
    assert_eq!(expand(&[("($i:ident)", "(fn $i() {})")], "bar").unwrap(), "fn bar() {}");
}

#[test]
fn test_repetition_expands_each_capture() {
    let rules = [("($($i:ident),*)", "($(mod $i {})*)")];
    assert_eq!(expand(&rules, "").unwrap(), "");
    assert_eq!(expand(&rules, "a,b").unwrap(), "mod a {} mod b {}");
}

#[test]
fn test_first_declared_rule_wins() {
    let rules = [("($i:ident)", "(struct First;)"), ("($i:ident)", "(struct Second;)")];
    assert!(expand(&rules, "x").unwrap().contains("First"));
}

#[test]
fn test_repetition_operators() {
    let star = [("($($i:ident),*)", "($(mod $i {})*)")];
    assert_eq!(expand(&star, "a, b, c").unwrap(), "mod a {} mod b {} mod c {}");

    let plus = [("($($i:ident),+)", "($(mod $i {})*)")];
    assert_eq!(expand(&plus, "a").unwrap(), "mod a {}");
    let error = expand(&plus, "").unwrap_err();
    assert_eq!(failure_reasons(&error), vec![FailureReason::TooFewGroupElements]);

    let optional = [("($($i:ident)?)", "($(mod $i {})?)")];
    assert_eq!(expand(&optional, "").unwrap(), "");
    assert_eq!(expand(&optional, "a").unwrap(), "mod a {}");
    assert!(matches!(
        expand(&optional, "a b"),
        Err(DriverError::Expansion(MacroError::ExtraInput { .. }))
    ));
}

#[test]
fn test_separator_that_is_also_the_terminator() {
    assert_eq!(expand(&[("($($i:item)=* =)", "($($i)*)")], "fn x(){} =").unwrap(), "fn x(){}");
}

#[test]
fn test_trailing_input_is_extra_input() {
    let error = expand(&[("($i:ident)", "(fn $i() {})")], "a b").unwrap_err();
    assert!(matches!(
        error,
        DriverError::Expansion(MacroError::ExtraInput { rule: 0, offset: 2, .. })
    ));
}

#[test]
fn test_keywords_bind_as_identifiers() {
    assert_eq!(
        expand_text(&[("($i:ident)", "(stringify!($i))")], "fn", CallContext::Expr).unwrap(),
        "stringify!(fn)"
    );
}

#[test]
fn test_token_trees_pass_through() {
    let rules = [("($($t:tt)*)", "($($t)*)")];
    assert_eq!(
        expand_text(&rules, "a (b c) [d]", CallContext::Expr).unwrap(),
        "a (b c) [d]"
    );
}

#[test]
fn test_doc_comments_reach_meta_fragments() {
    let rules = [("($(#[$m:meta])* $i:item)", "($i)")];
    assert_eq!(expand(&rules, "/// docs\nfn f() {}").unwrap(), "fn f() {}");
}

#[test]
fn test_expression_precedence_survives_substitution() {
    let rules = [("($e:expr)", "($e * 2)")];
    assert_eq!(expand_text(&rules, "1 + 1", CallContext::Expr).unwrap(), "(1 + 1) * 2");
}

#[test]
fn test_zipped_repetitions_must_have_equal_lengths() {
    let error = expand(&[("($($a:ident)* ; $($b:ident)*)", "($(fn $a() -> $b {})*)")], "x y ; z").unwrap_err();
    assert!(matches!(
        error,
        DriverError::Expansion(MacroError::ArityMismatch {
            expected: 2,
            found: 1,
            ..
        })
    ));
}

#[test]
fn test_crate_paths_name_the_definition_crate() {
    let mut fixture = TestFixture::new();
    fixture
        .define_in("demo", "macro_rules! helper { () => { struct Helper; } }")
        .unwrap();
    fixture
        .define_in("demo", "macro_rules! public { () => { $crate::helper!(); } }")
        .unwrap();

    let site = fixture.call("main.rs", "::demo::public", "", CallContext::Item);
    let report = fixture.expand(&site).unwrap();
    assert_eq!(report.text(), "::demo::helper!();");

    let nested = &report.tree.calls[1];
    assert_eq!(nested.macro_path, "::demo::helper");
    assert_eq!(nested.error, None);
    assert_eq!(nested.text, "struct Helper;");
}

#[test]
fn test_template_identifiers_are_hygienic() {
    let mut fixture = TestFixture::new();
    fixture.define("m", &[("($v:ident)", "(let tmp = $v;)")]).unwrap();
    let first = fixture.call("main.rs", "m", "tmp", CallContext::Stmt);
    let second = fixture.call("main.rs", "m", "tmp", CallContext::Stmt);
    let first = fixture.expand(&first).unwrap();
    let second = fixture.expand(&second).unwrap();

    assert_eq!(first.text(), second.text());
    let ctx = |report: &mx_driver::ExpansionReport| report.tree.root().and_then(|root| root.ctx);
    assert!(ctx(&first).is_some());
    assert_ne!(ctx(&first), ctx(&second));
}

#[test]
fn test_offset_map_points_into_the_call_body() {
    let mut fixture = TestFixture::new();
    fixture.define("m", &[("($a:ident $b:ident)", "(fn $b() {} fn $a() {})")]).unwrap();
    let site = fixture.call("main.rs", "m", "first second", CallContext::Item);
    let report = fixture.expand(&site).unwrap();
    let root = report.tree.root().unwrap();

    assert_eq!(report.text(), "fn second() {} fn first() {}");
    // `second` at output 3, `first` at output 18
    assert_eq!(root.ranges.map_to_source(3), Some(6));
    assert_eq!(root.ranges.map_to_source(18), Some(0));
    assert_eq!(root.ranges.map_to_source(0), None);
    assert_eq!(root.ranges.map_to_output(7), vec![4]);
}

#[test]
fn test_nested_failure_leaves_siblings_alone() {
    let mut fixture = TestFixture::new();
    fixture.define("ok", &[("()", "(struct Ok;)")]).unwrap();
    fixture.define("strict", &[("($i:ident)", "(struct $i;)")]).unwrap();
    fixture
        .define("both", &[("()", "(strict!(1); ok!();)")])
        .unwrap();

    let site = fixture.call("main.rs", "both", "", CallContext::Item);
    let report = fixture.expand(&site).unwrap();
    let calls = &report.tree.calls;
    assert_eq!(calls.len(), 3);
    assert!(matches!(
        calls[1].error,
        Some(BranchFailure::Expansion(MacroError::NoMatchingRule { .. }))
    ));
    assert_eq!(calls[2].error, None);
    assert_eq!(calls[2].text, "struct Ok;");
}
