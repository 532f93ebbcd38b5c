//! Input files run through the command implementations

use colored::control;
use expect_test::expect;
use integration_tests::{fixture_path, load_fixture};
use mx_cli::commands::{check, expand, walk};
use mx_cli::{unit_name, Format};
use mx_driver::ExpansionConfig;
use serde_json::Value;

fn json(text: &str) -> Value {
    serde_json::from_str(text).unwrap()
}

#[test]
fn test_expand_demo_file() {
    let input = load_fixture("demo.toml").unwrap();
    let unit = unit_name(&fixture_path("demo.toml"));
    assert_eq!(unit, "demo");

    let out = json(&expand::run(&input, &unit, ExpansionConfig::default(), Format::Json).unwrap());
    let root_text = |index: usize| out[index]["tree"]["calls"][0]["text"].clone();
    assert_eq!(root_text(0), "fn bar() {}");
    assert_eq!(root_text(1), "mod a {} mod b {}");
    assert_eq!(root_text(2), "");
    assert_eq!(root_text(3), "fn x(){}");
    assert_eq!(root_text(4), "::demo::helper!(7);");

    let nested = &out[4]["tree"]["calls"][1];
    assert_eq!(nested["macro_path"], "::demo::helper");
    assert_eq!(nested["text"], "const HELPER: u32 = 7;");
    assert_eq!(nested["node"], "/macro_expansions/demo/4/1.rs");
    assert!(out.as_array().unwrap().iter().all(|call| call["error"].is_null()));
}

#[test]
fn test_expand_text_report() {
    control::set_override(false);
    let input = load_fixture("demo.toml").unwrap();
    let out = expand::run(&input, "demo", ExpansionConfig::default(), Format::Text).unwrap();
    assert!(out.starts_with("call 0 `make_fn!(bar)` (item, miss)\n  fn bar() {}\n"));
    assert!(out.contains("  nested 1 `::demo::helper!` (depth 1)\n    const HELPER: u32 = 7;\n"));
}

#[test]
fn test_limits_from_config_file() {
    let config = ExpansionConfig::from_file(&fixture_path("limits.toml")).unwrap();
    assert_eq!(config.recursion_limit, 3);
    assert_eq!(config.call_budget, 64);
    assert!(config.cache_enabled);
    assert_eq!(config.root(), "/macro_expansions");
}

#[test]
fn test_walk_file() {
    let input = load_fixture("walk.toml").unwrap();
    let out = json(&walk::run(&input, ExpansionConfig::default(), Format::Json).unwrap());
    assert_eq!(out[0]["kinds"], serde_json::json!(["Expr", "Ident"]));
    assert_eq!(out[1]["kinds"], serde_json::json!(["Expr", "Ident"]));
    assert!(out[2]["error"].as_str().unwrap().contains("cannot find macro `bar`"));
}

#[test]
fn test_walk_text_report() {
    control::set_override(false);
    let input = load_fixture("walk.toml").unwrap();
    let out = walk::run(&input, ExpansionConfig::default(), Format::Text).unwrap();
    expect![[r#"
        call 0 `foo!(x )` at 1: expr, ident
        call 1 `foo!()` at 0: expr, ident
        call 2 `bar!()` at 0: error: cannot find macro `bar` in scope `main`
    "#]]
    .assert_eq(&out);
}

#[test]
fn test_check_broken_file() {
    control::set_override(false);
    let input = load_fixture("broken.toml").unwrap();
    let report = check::run(&input, Format::Text).unwrap();
    assert_eq!(report.errors, 2);
    assert_eq!(report.warnings, 0);
    assert!(report.text.starts_with("ok `fine`\n"));
    assert!(report.text.contains("error `no_kind`"));
    assert!(report.text.contains("error `empty_loop`"));

    let clean = check::run(&load_fixture("demo.toml").unwrap(), Format::Text).unwrap();
    assert_eq!(clean.errors, 0);
}
