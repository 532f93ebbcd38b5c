//! Check command implementation

use crate::input::{InputFile, MacroSpec};
use crate::Format;
use anyhow::Result;
use colored::Colorize as _;
use miette::{GraphicalReportHandler, GraphicalTheme};
use mx_intern::Interner;
use mx_macro::{check_follow_sets, parse_macro_rules, parse_rules, CompiledMacro, DefinitionError, MacroDefinition};
use mx_tt::SyntaxContext;
use serde::Serialize;
use std::fmt::Write as _;

/// Outcome of checking every definition of a file
#[derive(Debug, Clone)]
pub struct CheckReport {
    /// Rendered report
    pub text: String,
    /// Definitions that cannot be used
    pub errors: usize,
    /// Follow-set warnings
    pub warnings: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum Status {
    Ok,
    Invalid,
    Malformed,
}

#[derive(Serialize)]
struct MacroOutput {
    name: String,
    status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    warnings: Vec<String>,
}

fn parse(spec: &MacroSpec, interner: &Interner) -> Result<MacroDefinition, DefinitionError> {
    if let Some(source) = &spec.source {
        return parse_macro_rules(source, &spec.krate, interner, SyntaxContext::ROOT);
    }
    let rules: Vec<(&str, &str)> = spec
        .rules
        .iter()
        .map(|rule| (rule.matcher.as_str(), rule.template.as_str()))
        .collect();
    parse_rules(spec.display_name(), &spec.krate, &rules, interner, SyntaxContext::ROOT)
}

fn render_diagnostic(error: &DefinitionError) -> String {
    let mut rendered = String::new();
    let handler = GraphicalReportHandler::new_themed(GraphicalTheme::unicode_nocolor());
    if handler.render_report(&mut rendered, error).is_err() {
        return error.to_string();
    }
    rendered
}

fn check_one(spec: &MacroSpec, interner: &Interner) -> (MacroOutput, Option<String>) {
    let definition = match parse(spec, interner) {
        Ok(definition) => definition,
        Err(error) => {
            let output = MacroOutput {
                name: spec.display_name().to_string(),
                status: Status::Invalid,
                message: Some(error.to_string()),
                warnings: Vec::new(),
            };
            return (output, Some(render_diagnostic(&error)));
        }
    };

    let name = interner.resolve(&definition.name).to_string();
    let warnings = check_follow_sets(&definition, interner)
        .into_iter()
        .map(|warning| {
            format!(
                "rule {}: `${}:{}` is followed by `{}`, which it may read on into",
                warning.rule, warning.name, warning.kind, warning.found
            )
        })
        .collect();
    let compiled = CompiledMacro::compile(definition, interner);
    let (status, message) = match compiled.malformed() {
        Some(error) => (Status::Malformed, Some(error.to_string())),
        None => (Status::Ok, None),
    };
    let output = MacroOutput {
        name,
        status,
        message,
        warnings,
    };
    (output, None)
}

/// Compiles every definition of `input` and reports what cannot be used
///
/// # Errors
///
/// Fails when the report cannot be rendered.
pub fn run(input: &InputFile, format: Format) -> Result<CheckReport> {
    let interner = Interner::new();
    let mut outputs = Vec::new();
    let mut text = String::new();

    for spec in &input.macros {
        let (output, diagnostic) = check_one(spec, &interner);
        match (&output.status, &output.message) {
            (Status::Ok, _) => writeln!(text, "{} `{}`", "ok".green().bold(), output.name)?,
            (_, Some(message)) => {
                writeln!(text, "{} `{}`: {message}", "error".red().bold(), output.name)?;
            }
            (_, None) => writeln!(text, "{} `{}`", "error".red().bold(), output.name)?,
        }
        for warning in &output.warnings {
            writeln!(text, "  {} {warning}", "warning:".yellow().bold())?;
        }
        if let Some(diagnostic) = diagnostic {
            for line in diagnostic.lines() {
                writeln!(text, "  {}", line.trim_end())?;
            }
        }
        outputs.push(output);
    }

    let errors = outputs
        .iter()
        .filter(|output| !matches!(output.status, Status::Ok))
        .count();
    let warnings = outputs.iter().map(|output| output.warnings.len()).sum();
    if format == Format::Json {
        text = serde_json::to_string_pretty(&outputs)? + "\n";
    }
    Ok(CheckReport { text, errors, warnings })
}
