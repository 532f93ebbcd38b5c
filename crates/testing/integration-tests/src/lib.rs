//! Integration test utilities for the expansion engine

use anyhow::Result;
use mx_cli::input::InputFile;
use mx_driver::{CallSite, DefineOutcome, Driver, DriverError, ExpansionConfig, ExpansionReport};
use mx_intern::Interner;
use mx_macro::CallContext;
use rustc_hash::FxHashMap;
use std::path::PathBuf;

/// Scope every fixture call is resolved in
pub const SCOPE: &str = "main";

/// A driver plus the call sites registered against it
pub struct TestFixture {
    /// Driver instance
    pub driver: Driver,
    /// Calls registered per unit
    calls: FxHashMap<String, usize>,
}

impl TestFixture {
    /// Creates a fixture with default limits
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ExpansionConfig::default())
    }

    /// Creates a fixture with the given limits
    #[must_use]
    pub fn with_config(config: ExpansionConfig) -> Self {
        Self {
            driver: Driver::new(config, Interner::new()),
            calls: FxHashMap::default(),
        }
    }

    /// Defines a macro in the fixture scope from (matcher, template) pairs
    ///
    /// # Errors
    ///
    /// Returns an error if the rules cannot be parsed
    pub fn define(&self, name: &str, rules: &[(&str, &str)]) -> Result<DefineOutcome, DriverError> {
        self.driver.define_rules(SCOPE, name, SCOPE, rules)
    }

    /// Defines a macro owned by `krate` from `macro_rules!` text
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be parsed
    pub fn define_in(&self, krate: &str, source: &str) -> Result<DefineOutcome, DriverError> {
        self.driver.define_macro_rules(krate, krate, source)
    }

    /// Next call site of `unit`
    pub fn call(&mut self, unit: &str, path: &str, body: &str, context: CallContext) -> CallSite {
        let count = self.calls.entry(unit.to_string()).or_default();
        let index = *count;
        *count += 1;
        CallSite {
            unit: unit.to_string(),
            index,
            scope: SCOPE.to_string(),
            path: path.to_string(),
            body: body.to_string(),
            context,
            offset: 0,
        }
    }

    /// Expands `site`
    ///
    /// # Errors
    ///
    /// Returns the driver's error for the root call
    pub fn expand(&self, site: &CallSite) -> Result<ExpansionReport, DriverError> {
        self.driver.expand_call(site)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Expands one call of a fresh single-definition macro `m`
///
/// # Errors
///
/// Returns the driver's error for the call
pub fn expand_text(rules: &[(&str, &str)], body: &str, context: CallContext) -> Result<String, DriverError> {
    let mut fixture = TestFixture::new();
    fixture.define("m", rules)?;
    let site = fixture.call("lib.rs", "m", body, context);
    fixture.expand(&site).map(|report| report.text().to_string())
}

/// Path of a file in the `fixtures` directory
#[must_use]
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
}

/// Reads an input file from the `fixtures` directory
///
/// # Errors
///
/// Returns an error if the file is missing or not valid input
pub fn load_fixture(name: &str) -> Result<InputFile> {
    InputFile::from_file(&fixture_path(name))
}
