//! Expand command implementation

use super::{call_text, load};
use crate::input::InputFile;
use crate::Format;
use anyhow::Result;
use colored::Colorize as _;
use mx_driver::{BranchFailure, CacheClass, ExpandedCall, ExpansionConfig, ExpansionTree};
use mx_macro::CallContext;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;

#[derive(Serialize)]
struct CallOutput<'out> {
    index: usize,
    #[serde(rename = "macro")]
    path: &'out str,
    body: &'out str,
    context: CallContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    class: Option<CacheClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tree: Option<Arc<ExpansionTree>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Expands every call of `input` in order
///
/// # Errors
///
/// Fails when the batch is interrupted or the output cannot be rendered.
pub fn run(input: &InputFile, unit: &str, config: ExpansionConfig, format: Format) -> Result<String> {
    let driver = load(input, config);
    let sites: Vec<_> = input
        .calls
        .iter()
        .enumerate()
        .map(|(index, call)| call.site(unit, index))
        .collect();
    let results = driver.expand_all(&sites)?;

    let outputs: Vec<CallOutput<'_>> = input
        .calls
        .iter()
        .zip(results)
        .enumerate()
        .map(|(index, (call, result))| {
            let (class, tree, error) = match result {
                Ok(report) => (Some(report.class), Some(report.tree), None),
                Err(error) => (None, None, Some(error.to_string())),
            };
            CallOutput {
                index,
                path: &call.path,
                body: &call.body,
                context: call.context,
                class,
                tree,
                error,
            }
        })
        .collect();

    match format {
        Format::Json => Ok(serde_json::to_string_pretty(&outputs)? + "\n"),
        Format::Text => render_text(&outputs),
    }
}

fn render_text(outputs: &[CallOutput<'_>]) -> Result<String> {
    let mut out = String::new();
    for output in outputs {
        let header = format!("call {}", output.index);
        write!(out, "{} `{}` ({}", header.bold(), call_text(output.path, output.body), output.context)?;
        if let Some(class) = output.class {
            write!(out, ", {class}")?;
        }
        writeln!(out, ")")?;

        if let Some(error) = &output.error {
            writeln!(out, "  {} {error}", "error:".red().bold())?;
        }
        let Some(tree) = &output.tree else {
            continue;
        };
        for (index, call) in tree.calls.iter().enumerate() {
            render_call(&mut out, index, call)?;
        }
    }
    Ok(out)
}

fn render_call(out: &mut String, index: usize, call: &ExpandedCall) -> Result<()> {
    let indent = "  ".repeat(call.depth);
    if index > 0 {
        writeln!(out, "{indent}{} {index} `{}!` (depth {})", "nested".cyan(), call.macro_path, call.depth)?;
    }
    match &call.error {
        Some(BranchFailure::Unresolved { path }) => {
            writeln!(out, "{indent}  {} cannot find macro `{path}`", "error:".red().bold())?;
        }
        Some(BranchFailure::Expansion(error)) => {
            writeln!(out, "{indent}  {} {error}", "error:".red().bold())?;
        }
        None => {
            for line in call.text.lines() {
                writeln!(out, "{indent}  {line}")?;
            }
            if !call.parses_in_context {
                writeln!(out, "{indent}  {} output does not parse in this position", "warning:".yellow().bold())?;
            }
        }
    }
    Ok(())
}
