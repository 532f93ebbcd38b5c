//! Macro definitions grouped by scope
//!
//! Every scope carries a structural stamp. Adding or removing a definition,
//! or any other declaration change reported through [`Registry::touch`],
//! moves the stamp and invalidates every cached expansion resolved in that
//! scope. Replacing the text of an existing definition does not: those
//! edits are caught by content hashes.

use indexmap::IndexMap;
use mx_intern::Interner;
use mx_macro::CompiledMacro;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct Scope {
    stamp: u64,
    macros: IndexMap<String, Arc<CompiledMacro>>,
}

/// What [`Registry::define`] changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefineOutcome {
    /// A new name; the scope's stamp moved
    Added,
    /// The name existed with different text
    Replaced,
    /// The name existed with identical text
    Unchanged,
}

/// Definitions by scope name
#[derive(Debug, Default)]
pub struct Registry {
    scopes: FxHashMap<String, Scope>,
}

impl Registry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `compiled` under its own name in `scope`
    pub fn define(&mut self, scope: &str, compiled: CompiledMacro, interner: &Interner) -> DefineOutcome {
        let name = interner.resolve(&compiled.definition().name).to_string();
        let entry = self.scopes.entry(scope.to_string()).or_default();
        let outcome = match entry.macros.get(&name) {
            None => {
                entry.stamp += 1;
                DefineOutcome::Added
            }
            Some(existing)
                if existing.definition().source == compiled.definition().source
                    && existing.definition().krate == compiled.definition().krate =>
            {
                return DefineOutcome::Unchanged;
            }
            Some(_) => DefineOutcome::Replaced,
        };
        debug!(scope, macro_name = %name, ?outcome, stamp = entry.stamp, "registered definition");
        entry.macros.insert(name, Arc::new(compiled));
        outcome
    }

    /// Removes a definition; returns whether it existed
    pub fn remove(&mut self, scope: &str, name: &str) -> bool {
        let Some(entry) = self.scopes.get_mut(scope) else {
            return false;
        };
        let removed = entry.macros.shift_remove(name).is_some();
        if removed {
            entry.stamp += 1;
        }
        removed
    }

    /// Records a structural change in `scope` that is not a definition
    pub fn touch(&mut self, scope: &str) {
        self.scopes.entry(scope.to_string()).or_default().stamp += 1;
    }

    /// Structural stamp of `scope`; zero for a scope never seen
    pub fn stamp(&self, scope: &str) -> u64 {
        self.scopes.get(scope).map_or(0, |entry| entry.stamp)
    }

    /// Resolves a macro path from `scope`
    ///
    /// The last segment names the macro. A path rooted at a crate, such as
    /// `::demo::helper`, also finds definitions in the scope named after
    /// that crate.
    pub fn resolve(&self, scope: &str, path: &str) -> Option<Arc<CompiledMacro>> {
        let name = path.rsplit("::").next().unwrap_or(path);
        let local = self
            .scopes
            .get(scope)
            .and_then(|entry| entry.macros.get(name));
        let rooted = || {
            let krate = path.strip_prefix("::")?.split("::").next()?;
            self.scopes.get(krate)?.macros.get(name)
        };
        local.or_else(rooted).map(Arc::clone)
    }

    /// Names defined in `scope`, in definition order
    pub fn names(&self, scope: &str) -> Vec<String> {
        self.scopes
            .get(scope)
            .map(|entry| entry.macros.keys().cloned().collect())
            .unwrap_or_default()
    }
}
