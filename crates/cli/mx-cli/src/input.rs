//! TOML input files
//!
//! ```toml
//! [[macro]]
//! name = "make"
//! crate = "demo"
//! rules = [{ matcher = "($i:ident)", template = "(fn $i() {})" }]
//!
//! [[call]]
//! macro = "make"
//! body = "bar"
//! context = "item"
//! ```

use anyhow::{Context as _, Result};
use mx_driver::{CallSite, Driver, DriverError};
use mx_macro::CallContext;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Scope calls are resolved in unless they name one
pub const DEFAULT_SCOPE: &str = "main";

/// Definitions and calls read from one file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputFile {
    /// Macro definitions, registered in order
    #[serde(default, rename = "macro")]
    pub macros: Vec<MacroSpec>,
    /// Calls, expanded in order
    #[serde(default, rename = "call")]
    pub calls: Vec<CallSpec>,
}

/// One `[[macro]]` table
///
/// Either `rules` (with `name`) or `source` holding `macro_rules! ...`
/// text must be given.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MacroSpec {
    /// Macro name; read from `source` when absent
    pub name: Option<String>,
    /// Crate that owns the definition; its scope receives the definition
    #[serde(rename = "crate", default = "default_scope")]
    pub krate: String,
    /// (matcher, template) pairs
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
    /// Full `macro_rules!` text
    pub source: Option<String>,
}

/// One rule of a `[[macro]]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    /// Matcher text, delimiters included
    pub matcher: String,
    /// Template text, delimiters included
    pub template: String,
}

/// One `[[call]]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallSpec {
    /// Macro path as written at the call
    #[serde(rename = "macro")]
    pub path: String,
    /// Text between the call's delimiters
    pub body: String,
    /// Syntactic position of the call
    #[serde(default = "default_context")]
    pub context: CallContext,
    /// Scope the path is resolved in
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Offset in `body` for `walk`
    pub caret: Option<u32>,
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

const fn default_context() -> CallContext {
    CallContext::Expr
}

impl MacroSpec {
    /// Name to report in diagnostics
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<macro_rules>")
    }

    /// Registers the definition in the scope of its crate
    ///
    /// # Errors
    ///
    /// Fails when the definition does not parse.
    pub fn define(&self, driver: &Driver) -> Result<(), DriverError> {
        if let Some(source) = &self.source {
            driver.define_macro_rules(&self.krate, &self.krate, source)?;
            return Ok(());
        }
        let rules: Vec<(&str, &str)> = self
            .rules
            .iter()
            .map(|rule| (rule.matcher.as_str(), rule.template.as_str()))
            .collect();
        driver.define_rules(&self.krate, self.display_name(), &self.krate, &rules)?;
        Ok(())
    }
}

impl CallSpec {
    /// Call site for the `index`-th call of `unit`
    pub fn site(&self, unit: &str, index: usize) -> CallSite {
        CallSite {
            unit: unit.to_string(),
            index,
            scope: self.scope.clone(),
            path: self.path.clone(),
            body: self.body.clone(),
            context: self.context,
            offset: 0,
        }
    }
}

impl InputFile {
    /// Load an input file
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or does not parse.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?;

        Self::from_toml(&contents).with_context(|| format!("Failed to parse input file: {}", path.display()))
    }

    /// Parse an input file from TOML text
    ///
    /// # Errors
    ///
    /// Fails on malformed TOML, unknown keys or a macro with neither `source`
    /// nor rules.
    pub fn from_toml(text: &str) -> Result<Self> {
        let input: Self = toml::from_str(text)?;
        for spec in &input.macros {
            anyhow::ensure!(
                spec.source.is_some() || (spec.name.is_some() && !spec.rules.is_empty()),
                "macro `{}` needs either `source` or `name` and `rules`",
                spec.display_name()
            );
        }
        Ok(input)
    }

    /// Registers every definition that can be read
    ///
    /// Returns the unreadable ones with their errors; `check` reports them.
    pub fn define_all<'src>(&'src self, driver: &Driver) -> Vec<(&'src MacroSpec, DriverError)> {
        self.macros
            .iter()
            .filter_map(|spec| spec.define(driver).err().map(|error| (spec, error)))
            .collect()
    }
}
