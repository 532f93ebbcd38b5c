//! Walk command implementation

use super::{call_text, load};
use crate::input::InputFile;
use crate::Format;
use anyhow::Result;
use colored::Colorize as _;
use mx_driver::ExpansionConfig;
use mx_macro::FragmentKind;
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Serialize)]
struct WalkOutput {
    index: usize,
    caret: u32,
    kinds: Vec<FragmentKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Reports reachable fragment kinds for every call with a `caret`
///
/// # Errors
///
/// Fails when the output cannot be rendered.
pub fn run(input: &InputFile, config: ExpansionConfig, format: Format) -> Result<String> {
    let driver = load(input, config);
    let mut outputs = Vec::new();
    for (index, call) in input.calls.iter().enumerate() {
        let Some(caret) = call.caret else {
            continue;
        };
        let (kinds, error) = match driver.reachable_kinds(&call.scope, &call.path, &call.body, caret) {
            Ok(kinds) => (kinds.into_iter().collect(), None),
            Err(error) => (Vec::new(), Some(error.to_string())),
        };
        outputs.push(WalkOutput {
            index,
            caret,
            kinds,
            error,
        });
    }

    if format == Format::Json {
        return Ok(serde_json::to_string_pretty(&outputs)? + "\n");
    }
    let mut out = String::new();
    for output in &outputs {
        let call = &input.calls[output.index];
        let header = format!("call {}", output.index);
        write!(out, "{} `{}` at {}: ", header.bold(), call_text(&call.path, &call.body), output.caret)?;
        if let Some(error) = &output.error {
            writeln!(out, "{} {error}", "error:".red().bold())?;
        } else if output.kinds.is_empty() {
            writeln!(out, "{}", "nothing reachable".dimmed())?;
        } else {
            let kinds: Vec<_> = output.kinds.iter().map(ToString::to_string).collect();
            writeln!(out, "{}", kinds.join(", "))?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use colored::control;
    use expect_test::expect;

    #[test]
    fn test_reports_kinds_at_caret() {
        control::set_override(false);
        let input = InputFile::from_toml(
            r#"
            [[macro]]
            name = "pick"
            rules = [
                { matcher = "($e:expr)", template = "($e)" },
                { matcher = "($i:ident)", template = "($i)" },
            ]

            [[macro]]
            name = "pair"
            rules = [{ matcher = "($a:ident , $b:ty)", template = "()" }]

            [[call]]
            macro = "pick"
            body = "x "
            caret = 1

            [[call]]
            macro = "pick"
            body = "x"

            [[call]]
            macro = "pair"
            body = "x, "
            caret = 3

            [[call]]
            macro = "pair"
            body = "1"
            caret = 1

            [[call]]
            macro = "gone"
            body = ""
            caret = 0
            "#,
        )
        .unwrap();

        let out = run(&input, ExpansionConfig::default(), Format::Text).unwrap();
        expect![[r#"
            call 0 `pick!(x )` at 1: expr, ident
            call 2 `pair!(x, )` at 3: ty
            call 3 `pair!(1)` at 1: nothing reachable
            call 4 `gone!()` at 0: error: cannot find macro `gone` in scope `main`
        "#]]
        .assert_eq(&out);

        let json: serde_json::Value =
            serde_json::from_str(&run(&input, ExpansionConfig::default(), Format::Json).unwrap()).unwrap();
        assert_eq!(json[0]["kinds"], serde_json::json!(["Expr", "Ident"]));
        assert_eq!(json.as_array().map(Vec::len), Some(4));
    }
}
