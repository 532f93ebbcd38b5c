//! Reachable fragment kinds for unfinished calls

use integration_tests::{TestFixture, SCOPE};
use mx_driver::DriverError;
use mx_macro::{CallContext, FragmentKind, MacroError};

fn kinds(fixture: &TestFixture, path: &str, body: &str, caret: u32) -> Vec<FragmentKind> {
    fixture
        .driver
        .reachable_kinds(SCOPE, path, body, caret)
        .unwrap()
        .into_iter()
        .collect()
}

#[test]
fn test_partial_call_reaches_both_rules() {
    let mut fixture = TestFixture::new();
    fixture.define("foo", &[("($e:expr)", "$e"), ("($i:ident)", "$i")]).unwrap();
    assert_eq!(kinds(&fixture, "foo", "x ", 1), vec![FragmentKind::Expr, FragmentKind::Ident]);

    // The same body is a complete call for the first rule
    let site = fixture.call("main.rs", "foo", "x ", CallContext::Expr);
    assert_eq!(fixture.expand(&site).unwrap().text(), "x");
}

#[test]
fn test_walk_into_delimited_groups() {
    let fixture = TestFixture::new();
    fixture
        .define(
            "record",
            &[("(struct $name:ident { $($field:ident : $ty:ty),* })", "(struct $name;)")],
        )
        .unwrap();
    let body = "struct Foo { a: }";
    assert_eq!(kinds(&fixture, "record", body, 16), vec![FragmentKind::Ty]);
    assert_eq!(kinds(&fixture, "record", body, 14), vec![FragmentKind::Ident]);
    assert_eq!(kinds(&fixture, "record", body, 0), Vec::new());
}

#[test]
fn test_walk_works_where_matching_fails() {
    let mut fixture = TestFixture::new();
    fixture.define("pair", &[("($a:ident , $b:ty)", "(type $a = $b;)")]).unwrap();

    let site = fixture.call("main.rs", "pair", "x,", CallContext::Item);
    assert!(matches!(
        fixture.expand(&site),
        Err(DriverError::Expansion(MacroError::NoMatchingRule { .. }))
    ));
    assert_eq!(kinds(&fixture, "pair", "x,", 2), vec![FragmentKind::Ty]);
}

#[test]
fn test_unknown_macro_cannot_be_walked() {
    let fixture = TestFixture::new();
    assert!(matches!(
        fixture.driver.reachable_kinds(SCOPE, "missing", "x", 1),
        Err(DriverError::UnresolvedMacro { .. })
    ));
}
