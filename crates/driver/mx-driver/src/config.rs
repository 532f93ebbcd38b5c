//! Driver configuration

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Limits and storage settings for recursive expansion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExpansionConfig {
    /// Maximum nesting depth of macro-calling-macro
    pub recursion_limit: usize,
    /// Maximum number of expansions in one recursive tree
    pub call_budget: usize,
    /// Maximum number of output tokens in one recursive tree
    pub token_budget: usize,
    /// Directory in virtual storage that holds expansion outputs
    pub storage_root: String,
    /// Whether results are reused across requests
    pub cache_enabled: bool,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            recursion_limit: 64,
            call_budget: 4096,
            token_budget: 1 << 20,
            storage_root: "/macro_expansions".to_string(),
            cache_enabled: true,
        }
    }
}

impl ExpansionConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or is not a valid configuration.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from TOML text; missing keys take defaults
    ///
    /// # Errors
    ///
    /// Fails on malformed TOML, unknown keys or a relative storage root.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        anyhow::ensure!(
            config.storage_root.starts_with('/'),
            "storage_root must be an absolute path, found `{}`",
            config.storage_root
        );
        Ok(config)
    }

    /// Storage root without a trailing slash
    pub fn root(&self) -> &str {
        self.storage_root.trim_end_matches('/')
    }
}
