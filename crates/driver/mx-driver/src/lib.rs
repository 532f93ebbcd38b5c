//! Expansion driver
//!
//! Owns everything that outlives a single expansion: the definition
//! registry, the two cache tiers, the work queue for nested calls and the
//! virtual storage that expansion outputs are materialised into.
//!
//! A request names one call site. The driver resolves the macro in the
//! call's scope, classifies the request against what it did last time
//! ([`CacheClass`]), expands the call and every call found in its output,
//! and writes one storage node per successful expansion.

pub mod cache;
pub mod config;
pub mod error;
pub mod hash;
pub mod queue;
pub mod registry;

pub use cache::{CacheClass, ContentCache};
pub use config::ExpansionConfig;
pub use error::DriverError;
pub use registry::{DefineOutcome, Registry};

use crate::hash::{call_hash, content_key, def_hash, ContentHash};
use crate::queue::{Budget, Job, WorkQueue};
use mx_intern::Interner;
use mx_macro::{
    find_nested, parse_macro_rules, parse_rules, CallContext, CompiledMacro, Expansion, FragmentKind, MacroError,
    NestedCall, RangeMap,
};
use mx_span::Span;
use mx_tt::{lex, SyntaxContext, Token, TokenBuffer};
use mx_vfs::VirtualStorage;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, trace, warn};

/// One macro call in a source unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSite {
    /// Source unit that contains the call
    pub unit: String,
    /// Position of the call among the unit's calls
    pub index: usize,
    /// Scope the macro path is resolved in
    pub scope: String,
    /// Macro path as written
    pub path: String,
    /// Text between the call's delimiters
    pub body: String,
    /// Syntactic position of the call
    pub context: CallContext,
    /// Offset of `body` in the unit
    pub offset: u32,
}

impl CallSite {
    /// Key of this call's record
    pub fn id(&self) -> CallId {
        CallId {
            unit: self.unit.clone(),
            index: self.index,
        }
    }
}

/// Identity of a call site across edits
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CallId {
    /// Source unit
    pub unit: String,
    /// Position among the unit's calls
    pub index: usize,
}

/// Why a nested branch produced no output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BranchFailure {
    /// No definition for the path in the call's scope
    Unresolved {
        /// Path as written
        path: String,
    },
    /// Matching, transcription or a budget failed
    Expansion(MacroError),
}

/// One node of an expansion tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpandedCall {
    /// Storage path of the output; `None` when the branch failed
    pub node: Option<String>,
    /// Macro path as written
    pub macro_path: String,
    /// Nesting depth; the root call is zero
    pub depth: usize,
    /// Index of the call whose output contains this one
    pub parent: Option<usize>,
    /// Rule that matched
    pub rule: Option<usize>,
    /// Rendered output
    pub text: String,
    /// Hygiene context of the identifiers the template introduced
    pub ctx: Option<SyntaxContext>,
    /// Output offsets copied from this call's body
    pub ranges: RangeMap,
    /// Calls found in the output
    pub nested: Vec<NestedCall>,
    /// Names of `macro_rules!` definitions found in the output
    pub definitions: Vec<String>,
    /// Whether the output parses in the call's position
    pub parses_in_context: bool,
    /// Why the branch has no output
    pub error: Option<BranchFailure>,
}

impl ExpandedCall {
    fn failed(job: &Job, error: BranchFailure) -> Self {
        Self {
            node: None,
            macro_path: job.path.clone(),
            depth: job.depth,
            parent: Some(job.parent),
            rule: None,
            text: String::new(),
            ctx: None,
            ranges: RangeMap::new(),
            nested: Vec::new(),
            definitions: Vec::new(),
            parses_in_context: false,
            error: Some(error),
        }
    }
}

/// A root call and every call expanded below it, in queue order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpansionTree {
    /// The root call comes first
    pub calls: Vec<ExpandedCall>,
}

impl ExpansionTree {
    /// The root call
    pub fn root(&self) -> Option<&ExpandedCall> {
        self.calls.first()
    }

    /// Calls directly below `index`
    pub fn children(&self, index: usize) -> impl Iterator<Item = (usize, &ExpandedCall)> {
        self.calls
            .iter()
            .enumerate()
            .filter(move |(_, call)| call.parent == Some(index))
    }
}

/// Answer to one expansion request
#[derive(Debug, Clone, Serialize)]
pub struct ExpansionReport {
    /// Call that was expanded
    pub call: CallId,
    /// How the request was served
    pub class: CacheClass,
    /// Offset of the call body in its unit
    pub offset: u32,
    /// Expansion tree
    pub tree: Arc<ExpansionTree>,
}

impl ExpansionReport {
    /// Rendered output of the root call
    pub fn text(&self) -> &str {
        self.tree.root().map_or("", |root| root.text.as_str())
    }

    /// Root ranges with call-site offsets relative to the whole unit
    pub fn unit_ranges(&self) -> RangeMap {
        self.tree
            .root()
            .map(|root| root.ranges.shifted_source(i64::from(self.offset)))
            .unwrap_or_default()
    }
}

/// What [`Driver::refresh`] found
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Nodes no call owned; they were deleted
    pub removed: Vec<String>,
    /// Calls whose nodes were changed or deleted outside the driver
    pub stale: Vec<CallId>,
}

#[derive(Debug, Clone)]
struct CallRecord {
    scope: String,
    scope_stamp: u64,
    def_hash: ContentHash,
    content_key: ContentHash,
    call_hash: ContentHash,
    tree: Arc<ExpansionTree>,
    /// Materialised nodes with the stamp each had after the last write
    nodes: Vec<(String, u64)>,
    stale: bool,
}

/// Expansion engine state shared by every request
#[derive(Debug)]
pub struct Driver {
    config: ExpansionConfig,
    interner: Interner,
    storage: VirtualStorage,
    registry: RwLock<Registry>,
    cache: ContentCache,
    records: RwLock<FxHashMap<CallId, CallRecord>>,
    cancel: Arc<AtomicBool>,
}

impl Driver {
    /// Creates a driver with its own storage
    pub fn new(config: ExpansionConfig, interner: Interner) -> Self {
        Self::with_storage(config, interner, VirtualStorage::new())
    }

    /// Creates a driver that materialises into `storage`
    pub fn with_storage(config: ExpansionConfig, interner: Interner, storage: VirtualStorage) -> Self {
        Self {
            config,
            interner,
            storage,
            registry: RwLock::new(Registry::new()),
            cache: ContentCache::new(),
            records: RwLock::new(FxHashMap::default()),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Active configuration
    pub const fn config(&self) -> &ExpansionConfig {
        &self.config
    }

    /// Interner for all token text
    pub const fn interner(&self) -> &Interner {
        &self.interner
    }

    /// Storage holding the expansion outputs
    pub const fn storage(&self) -> &VirtualStorage {
        &self.storage
    }

    /// Flag that interrupts [`Driver::expand_all`] when set
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn registry(&self) -> Result<RwLockReadGuard<'_, Registry>, DriverError> {
        self.registry.read().map_err(|_| DriverError::LockPoisoned)
    }

    fn registry_mut(&self) -> Result<RwLockWriteGuard<'_, Registry>, DriverError> {
        self.registry.write().map_err(|_| DriverError::LockPoisoned)
    }

    fn records(&self) -> Result<RwLockReadGuard<'_, FxHashMap<CallId, CallRecord>>, DriverError> {
        self.records.read().map_err(|_| DriverError::LockPoisoned)
    }

    fn records_mut(&self) -> Result<RwLockWriteGuard<'_, FxHashMap<CallId, CallRecord>>, DriverError> {
        self.records.write().map_err(|_| DriverError::LockPoisoned)
    }

    /// Defines a macro from (matcher, template) pairs
    ///
    /// # Errors
    ///
    /// Fails when a rule does not parse or a lock is poisoned.
    pub fn define_rules(
        &self,
        scope: &str,
        name: &str,
        krate: &str,
        rules: &[(&str, &str)],
    ) -> Result<DefineOutcome, DriverError> {
        let definition = parse_rules(name, krate, rules, &self.interner, SyntaxContext::ROOT)?;
        let compiled = CompiledMacro::compile(definition, &self.interner);
        Ok(self.registry_mut()?.define(scope, compiled, &self.interner))
    }

    /// Defines a macro from `macro_rules! name { ... }` text
    ///
    /// # Errors
    ///
    /// Fails when `text` is not a `macro_rules!` definition or a lock is
    /// poisoned.
    pub fn define_macro_rules(&self, scope: &str, krate: &str, text: &str) -> Result<DefineOutcome, DriverError> {
        let definition = parse_macro_rules(text, krate, &self.interner, SyntaxContext::ROOT)?;
        let compiled = CompiledMacro::compile(definition, &self.interner);
        Ok(self.registry_mut()?.define(scope, compiled, &self.interner))
    }

    /// Removes a definition; returns whether it existed
    ///
    /// # Errors
    ///
    /// Fails only when the registry lock is poisoned.
    pub fn remove_definition(&self, scope: &str, name: &str) -> Result<bool, DriverError> {
        Ok(self.registry_mut()?.remove(scope, name))
    }

    /// Reports a declaration change in `scope` that is not a macro definition
    ///
    /// # Errors
    ///
    /// Fails only when the registry lock is poisoned.
    pub fn touch_scope(&self, scope: &str) -> Result<(), DriverError> {
        self.registry_mut()?.touch(scope);
        Ok(())
    }

    /// Storage path of the root output of `id`
    pub fn node_path(&self, id: &CallId) -> String {
        format!("{}/{}/{}.rs", self.config.root(), id.unit, id.index)
    }

    fn nested_node_path(&self, id: &CallId, position: usize) -> String {
        format!("{}/{}/{}/{position}.rs", self.config.root(), id.unit, id.index)
    }

    /// Resolves a macro path from `scope`
    ///
    /// # Errors
    ///
    /// Fails only when the registry lock is poisoned.
    pub fn resolve(&self, scope: &str, path: &str) -> Result<Option<Arc<CompiledMacro>>, DriverError> {
        Ok(self.registry()?.resolve(scope, path))
    }

    /// Tree of the last successful expansion of `id`
    ///
    /// # Errors
    ///
    /// Fails only when the record lock is poisoned.
    pub fn tree(&self, id: &CallId) -> Result<Option<Arc<ExpansionTree>>, DriverError> {
        Ok(self.records()?.get(id).map(|record| Arc::clone(&record.tree)))
    }

    /// Fragment kinds that could be written at `caret` in an unfinished call
    ///
    /// # Errors
    ///
    /// Fails when the macro does not resolve or `body` does not lex.
    pub fn reachable_kinds(
        &self,
        scope: &str,
        path: &str,
        body: &str,
        caret: u32,
    ) -> Result<BTreeSet<FragmentKind>, DriverError> {
        let compiled = self.resolve(scope, path)?.ok_or_else(|| DriverError::UnresolvedMacro {
            path: path.to_string(),
            scope: scope.to_string(),
        })?;
        let input = lex(body, &self.interner, SyntaxContext::ROOT)?;
        Ok(compiled.reachable_kinds(&input, caret, &self.interner))
    }

    /// Expands one call site and everything its output calls
    ///
    /// # Errors
    ///
    /// Fails when the macro cannot be resolved or the root call does not
    /// expand. Previous output of the call is removed in that case. Failures
    /// of nested calls are recorded in the tree instead.
    pub fn expand_call(&self, site: &CallSite) -> Result<ExpansionReport, DriverError> {
        let id = site.id();
        let (compiled, scope_stamp) = {
            let registry = self.registry()?;
            (registry.resolve(&site.scope, &site.path), registry.stamp(&site.scope))
        };
        let Some(compiled) = compiled else {
            self.forget(&id)?;
            return Err(DriverError::UnresolvedMacro {
                path: site.path.clone(),
                scope: site.scope.clone(),
            });
        };

        let definition = compiled.definition();
        let krate = self.interner.resolve(&definition.krate);
        let def_hash = def_hash(&definition.source, krate);
        let content_key = content_key(&definition.source, krate, &site.body, site.context);
        let call_hash = call_hash(&site.path, &site.body, site.context, site.offset);

        let previous = self.records()?.get(&id).cloned();
        let class = match &previous {
            _ if !self.config.cache_enabled => CacheClass::Miss,
            None => CacheClass::Miss,
            Some(record) if record.stale => CacheClass::Miss,
            Some(record) if record.scope != site.scope || record.scope_stamp != scope_stamp => {
                CacheClass::StructureRebind
            }
            Some(record) if record.call_hash == call_hash && record.def_hash == def_hash => CacheClass::ExactHit,
            Some(record) if record.content_key == content_key => CacheClass::CallHit,
            Some(_) => CacheClass::Miss,
        };
        class.mark().hit();
        debug!(unit = %id.unit, index = id.index, macro_path = %site.path, %class, "classified expansion request");

        if matches!(class, CacheClass::ExactHit | CacheClass::CallHit) {
            if let Some(record) = &previous {
                if class == CacheClass::CallHit {
                    if let Some(entry) = self.records_mut()?.get_mut(&id) {
                        entry.call_hash = call_hash;
                    }
                }
                return Ok(ExpansionReport {
                    call: id,
                    class,
                    offset: site.offset,
                    tree: Arc::clone(&record.tree),
                });
            }
        }

        let input = lex(&site.body, &self.interner, SyntaxContext::ROOT)?;
        let compute = || compiled.expand(&input, &self.interner).map(Arc::new);
        let result = if !self.config.cache_enabled {
            compute()
        } else if class == CacheClass::StructureRebind {
            let rebuilt = compute();
            self.cache.replace(content_key, rebuilt.clone());
            rebuilt
        } else {
            self.cache
                .get_or_compute(content_key, compute)
                .ok_or(DriverError::LockPoisoned)?
        };

        let tree = match result
            .map_err(DriverError::from)
            .and_then(|expansion| self.build_tree(site, &id, &compiled, &expansion))
        {
            Ok(tree) => tree,
            Err(error) => {
                self.forget(&id)?;
                self.release(&*self.records()?, content_key);
                return Err(error);
            }
        };
        let nodes = self.materialise(&tree, previous.as_ref())?;
        // Nested definitions may have moved the stamp while the tree was built
        let settled_stamp = self.registry()?.stamp(&site.scope);
        let tree = Arc::new(tree);
        let mut records = self.records_mut()?;
        let replaced = records.insert(
            id.clone(),
            CallRecord {
                scope: site.scope.clone(),
                scope_stamp: settled_stamp,
                def_hash,
                content_key,
                call_hash,
                tree: Arc::clone(&tree),
                nodes,
                stale: false,
            },
        );
        if let Some(old) = replaced.filter(|old| old.content_key != content_key) {
            self.release(&records, old.content_key);
        }
        drop(records);
        Ok(ExpansionReport {
            call: id,
            class,
            offset: site.offset,
            tree,
        })
    }

    /// Expands every site in order, checking for cancellation in between
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Interrupted`] when the cancellation flag was
    /// set; the flag is cleared again. Sites handled before the
    /// interruption keep their records, so a rerun serves them as hits.
    pub fn expand_all(&self, sites: &[CallSite]) -> Result<Vec<Result<ExpansionReport, DriverError>>, DriverError> {
        let mut reports = Vec::with_capacity(sites.len());
        for (processed, site) in sites.iter().enumerate() {
            if self.cancel.swap(false, Ordering::SeqCst) {
                info!(processed, total = sites.len(), "expansion batch interrupted");
                return Err(DriverError::Interrupted { processed });
            }
            reports.push(self.expand_call(site));
        }
        Ok(reports)
    }

    /// Reconciles records with the storage after outside changes
    ///
    /// Nodes under the storage root that no record owns are deleted.
    /// Records whose nodes were deleted or rewritten are marked stale and
    /// re-expand on their next request.
    ///
    /// # Errors
    ///
    /// Fails when the storage cannot be listed or a node cannot be deleted.
    pub fn refresh(&self) -> Result<RefreshReport, DriverError> {
        let mut report = RefreshReport::default();
        let mut records = self.records_mut()?;

        let owned: FxHashSet<&str> = records
            .values()
            .flat_map(|record| record.nodes.iter().map(|(path, _)| path.as_str()))
            .collect();
        for entry in self.storage.files_under(self.config.root())? {
            if !owned.contains(entry.path.as_str()) {
                self.storage.delete(&entry.path)?;
                report.removed.push(entry.path);
            }
        }

        for (id, record) in records.iter_mut() {
            let intact = record
                .nodes
                .iter()
                .all(|(path, stamp)| self.storage.stamp(path).is_ok_and(|current| current == *stamp));
            if !intact && !record.stale {
                record.stale = true;
                report.stale.push(id.clone());
            }
        }
        report.stale.sort();
        info!(removed = report.removed.len(), stale = report.stale.len(), "refreshed expansion storage");
        Ok(report)
    }

    /// Drops the record of `id` and deletes its nodes
    fn forget(&self, id: &CallId) -> Result<(), DriverError> {
        let mut records = self.records_mut()?;
        let Some(record) = records.remove(id) else {
            return Ok(());
        };
        self.release(&records, record.content_key);
        drop(records);
        for (path, _) in &record.nodes {
            if self.storage.exists(path)? {
                self.storage.delete(path)?;
            }
        }
        Ok(())
    }

    /// Evicts the shared result for `key` once no record refers to it
    fn release(&self, records: &FxHashMap<CallId, CallRecord>, key: ContentHash) {
        if records.values().any(|record| record.content_key == key) {
            return;
        }
        if self.cache.remove(key) {
            trace!(%key, "content cache entry released");
        }
    }

    /// Expands the root's output and then every queued nested call
    fn build_tree(
        &self,
        site: &CallSite,
        id: &CallId,
        compiled: &CompiledMacro,
        root: &Expansion,
    ) -> Result<ExpansionTree, DriverError> {
        let mut budget = Budget::new(&self.config);
        budget.enter(0)?;
        budget.produce(root.tokens.len())?;

        let mut root_call = self.finish_call(&site.scope, compiled, site.path.clone(), 0, &site.body, site.context, root)?;
        root_call.node = Some(self.node_path(id));
        let mut queue = WorkQueue::new();
        enqueue(&mut queue, &root_call, root, 0);
        let mut calls = vec![root_call];

        while let Some(job) = queue.pop() {
            let index = calls.len();
            let (mut call, expansion) = self.expand_job(&site.scope, site.context, &job, &mut budget)?;
            if let Some(expansion) = &expansion {
                call.node = Some(self.nested_node_path(id, index));
                enqueue(&mut queue, &call, expansion, index);
            }
            calls.push(call);
        }

        debug!(unit = %id.unit, index = id.index, calls = budget.calls(), tokens = budget.tokens(), "built expansion tree");
        Ok(ExpansionTree { calls })
    }

    fn expand_job(
        &self,
        scope: &str,
        context: CallContext,
        job: &Job,
        budget: &mut Budget,
    ) -> Result<(ExpandedCall, Option<Expansion>), DriverError> {
        let Some(compiled) = self.registry()?.resolve(scope, &job.path) else {
            debug!(scope, macro_path = %job.path, "nested call does not resolve");
            let path = job.path.clone();
            return Ok((ExpandedCall::failed(job, BranchFailure::Unresolved { path }), None));
        };
        let expansion = budget
            .enter(job.depth)
            .and_then(|()| compiled.expand(&job.input, &self.interner))
            .and_then(|expansion| budget.produce(expansion.tokens.len()).map(|()| expansion));
        let expansion = match expansion {
            Ok(expansion) => expansion,
            Err(error) => {
                debug!(macro_path = %job.path, depth = job.depth, %error, "nested branch failed");
                return Ok((ExpandedCall::failed(job, BranchFailure::Expansion(error)), None));
            }
        };
        let mut call = self.finish_call(scope, &compiled, job.path.clone(), job.depth, &job.body_text, context, &expansion)?;
        call.parent = Some(job.parent);
        Ok((call, Some(expansion)))
    }

    /// Describes a successful expansion and registers the definitions in it
    #[allow(clippy::too_many_arguments, reason = "every argument describes a different part of the call")]
    fn finish_call(
        &self,
        scope: &str,
        compiled: &CompiledMacro,
        macro_path: String,
        depth: usize,
        body: &str,
        context: CallContext,
        expansion: &Expansion,
    ) -> Result<ExpandedCall, DriverError> {
        if cfg!(debug_assertions) {
            let mismatches = expansion.range_mismatches(body);
            if !mismatches.is_empty() {
                warn!(%macro_path, ?mismatches, "mapped output differs from the call body");
            }
        }

        let found = find_nested(&expansion.tokens, &expansion.text, &self.interner);
        let krate = self.interner.resolve(&compiled.definition().krate);
        let mut definitions = Vec::new();
        for nested in &found.definitions {
            match parse_macro_rules(&nested.text, krate, &self.interner, expansion.ctx) {
                Ok(definition) => {
                    let compiled = CompiledMacro::compile(definition, &self.interner);
                    self.registry_mut()?.define(scope, compiled, &self.interner);
                    definitions.push(nested.name.clone());
                }
                Err(error) => {
                    warn!(scope, macro_name = %nested.name, %error, "skipping unreadable definition in expansion output");
                }
            }
        }

        Ok(ExpandedCall {
            node: None,
            macro_path,
            depth,
            parent: None,
            rule: Some(expansion.rule),
            text: expansion.text.clone(),
            ctx: Some(expansion.ctx),
            ranges: expansion.ranges.clone(),
            nested: found.calls,
            definitions,
            parses_in_context: context.accepts(&expansion.tokens, &self.interner),
            error: None,
        })
    }

    /// Writes every successful output of `tree`, deleting nodes it no
    /// longer has
    ///
    /// Identical output leaves a node and its stamp untouched.
    fn materialise(&self, tree: &ExpansionTree, previous: Option<&CallRecord>) -> Result<Vec<(String, u64)>, DriverError> {
        let mut nodes = Vec::new();
        for call in &tree.calls {
            let Some(path) = &call.node else {
                continue;
            };
            let outcome = self.storage.write(path, &call.text)?;
            nodes.push((path.clone(), outcome.stamp()));
        }

        let current: FxHashSet<&str> = nodes.iter().map(|(path, _)| path.as_str()).collect();
        for (path, _) in previous.map_or(&[][..], |record| record.nodes.as_slice()) {
            if !current.contains(path.as_str()) && self.storage.exists(path)? {
                self.storage.delete(path)?;
            }
        }
        Ok(nodes)
    }
}

/// Queues the calls found in `expansion`, the output of `tree[index]`
///
/// Body tokens keep their hygiene; their spans are re-based onto the body
/// text.
fn enqueue(queue: &mut WorkQueue, call: &ExpandedCall, expansion: &Expansion, index: usize) {
    for nested in &call.nested {
        let body = expansion.tokens.tokens().get(nested.body.clone()).unwrap_or_default();
        let rebased: Vec<Token> = body
            .iter()
            .map(|token| Token {
                span: Span::new(
                    token.span.start.saturating_sub(nested.offset),
                    token.span.end.saturating_sub(nested.offset),
                ),
                ..*token
            })
            .collect();
        let Ok(input) = TokenBuffer::new(rebased) else {
            warn!(macro_path = %nested.path, "nested call body is not balanced");
            continue;
        };
        queue.push(Job {
            path: nested.path.clone(),
            input,
            body_text: nested.body_text.clone(),
            depth: call.depth + 1,
            parent: index,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;
    use mx_macro::marks::{self, Mark};
    use mx_macro::BudgetKind;
    use std::fmt::Write as _;

    fn driver_with(config: ExpansionConfig) -> Driver {
        Driver::new(config, Interner::new())
    }

    fn driver() -> Driver {
        driver_with(ExpansionConfig::default())
    }

    fn call(unit: &str, path: &str, body: &str, offset: u32) -> CallSite {
        CallSite {
            unit: unit.to_string(),
            index: 0,
            scope: "app".to_string(),
            path: path.to_string(),
            body: body.to_string(),
            context: CallContext::Item,
            offset,
        }
    }

    fn define_make(driver: &Driver, template: &str) -> DefineOutcome {
        driver.define_rules("app", "make", "app", &[("($i:ident)", template)]).unwrap()
    }

    #[test]
    fn test_cache_classification_follows_edits() {
        let driver = driver();
        define_make(&driver, "(fn $i() {})");
        let tracker = marks::track();

        let first = driver.expand_call(&call("main.rs", "make", "aaa", 10)).unwrap();
        assert_eq!(first.class, CacheClass::Miss);
        assert_eq!(first.text(), "fn aaa() {}");

        let again = driver.expand_call(&call("main.rs", "make", "aaa", 10)).unwrap();
        assert_eq!(again.class, CacheClass::ExactHit);
        assert!(Arc::ptr_eq(&first.tree, &again.tree));

        // Text before the call changed, the captured tokens did not
        let moved = driver.expand_call(&call("main.rs", "make", "aaa", 14)).unwrap();
        assert_eq!(moved.class, CacheClass::CallHit);
        assert_eq!(moved.text(), "fn aaa() {}");
        assert_eq!(moved.unit_ranges().map_to_source(3), Some(14));

        let edited = driver.expand_call(&call("main.rs", "make", "aab", 14)).unwrap();
        assert_eq!(edited.class, CacheClass::Miss);
        assert_eq!(edited.text(), "fn aab() {}");
        let node = driver.node_path(&edited.call);
        assert_eq!(node, "/macro_expansions/main.rs/0.rs");
        assert_eq!(driver.storage().read(&node).unwrap(), "fn aab() {}");

        assert_eq!(tracker.hits(Mark::CacheMiss), 2);
        assert_eq!(tracker.hits(Mark::CacheExactHit), 1);
        assert_eq!(tracker.hits(Mark::CacheCallHit), 1);
    }

    #[test]
    fn test_replaced_content_is_evicted() {
        let driver = driver();
        define_make(&driver, "(fn $i() {})");
        for edit in 0..1000 {
            let body = format!("a{edit}");
            assert_eq!(driver.expand_call(&call("main.rs", "make", &body, 0)).unwrap().class, CacheClass::Miss);
        }
        assert_eq!(driver.cache.len(), 1);

        // Content still held by another record stays shared
        driver.expand_call(&call("lib.rs", "make", "a999", 0)).unwrap();
        driver.expand_call(&call("main.rs", "make", "b", 0)).unwrap();
        assert_eq!(driver.cache.len(), 2);

        driver.expand_call(&call("lib.rs", "make", "1", 0)).unwrap_err();
        assert_eq!(driver.cache.len(), 1);
    }

    #[test]
    fn test_request_log_across_edits() {
        let driver = driver();
        define_make(&driver, "(fn $i() {})");
        let mut log = String::new();
        let mut request = |body: &str, offset: u32| {
            let report = driver.expand_call(&call("main.rs", "make", body, offset)).unwrap();
            writeln!(log, "{}: {}", report.class, report.text()).unwrap();
        };
        request("aaa", 10);
        request("aaa", 10);
        request("aaa", 14);
        request("aab", 14);
        driver.touch_scope("app").unwrap();
        request("aab", 14);

        expect![[r#"
            miss: fn aaa() {}
            exact hit: fn aaa() {}
            call hit: fn aaa() {}
            miss: fn aab() {}
            structure rebind: fn aab() {}
        "#]]
        .assert_eq(&log);
    }

    #[test]
    fn test_structure_change_rebinds_only_its_scope() {
        let driver = driver();
        define_make(&driver, "(fn $i() {})");
        let site = call("main.rs", "make", "aaa", 0);
        driver.expand_call(&site).unwrap();

        driver.touch_scope("lib").unwrap();
        assert_eq!(driver.expand_call(&site).unwrap().class, CacheClass::ExactHit);

        let tracker = marks::track();
        driver.touch_scope("app").unwrap();
        let rebound = driver.expand_call(&site).unwrap();
        assert_eq!(rebound.class, CacheClass::StructureRebind);
        assert_eq!(rebound.text(), "fn aaa() {}");
        assert!(tracker.was_hit(Mark::CacheStructureRebind));
        assert_eq!(driver.expand_call(&site).unwrap().class, CacheClass::ExactHit);
    }

    #[test]
    fn test_definition_edit_is_a_miss() {
        let driver = driver();
        assert_eq!(define_make(&driver, "(fn $i() {})"), DefineOutcome::Added);
        let site = call("main.rs", "make", "aaa", 0);
        driver.expand_call(&site).unwrap();

        assert_eq!(define_make(&driver, "(fn $i() -> u8 { 1 })"), DefineOutcome::Replaced);
        let report = driver.expand_call(&site).unwrap();
        assert_eq!(report.class, CacheClass::Miss);
        assert!(report.text().starts_with("fn aaa()"));
        assert!(report.text().contains("u8"));
    }

    #[test]
    fn test_identical_output_keeps_node_stamp() {
        let driver = driver();
        define_make(&driver, "(fn $i() {})");
        let site = call("main.rs", "make", "aaa", 0);
        let report = driver.expand_call(&site).unwrap();
        let node = driver.node_path(&report.call);
        let stamp = driver.storage().stamp(&node).unwrap();

        driver.touch_scope("app").unwrap();
        assert_eq!(driver.expand_call(&site).unwrap().class, CacheClass::StructureRebind);
        assert_eq!(driver.storage().stamp(&node).unwrap(), stamp);
    }

    #[test]
    fn test_shared_content_gets_fresh_hygiene_per_site() {
        let driver = driver();
        define_make(&driver, "(fn $i() { let tmp = 1; })");
        let first = driver.expand_call(&call("a.rs", "make", "x", 0)).unwrap();
        let second = driver.expand_call(&call("b.rs", "make", "x", 0)).unwrap();
        assert_eq!(second.class, CacheClass::Miss);
        assert_eq!(first.text(), second.text());
        let ctx = |report: &ExpansionReport| report.tree.root().and_then(|root| root.ctx);
        assert_ne!(ctx(&first), ctx(&second));
    }

    #[test]
    fn test_disabled_cache_always_misses() {
        let driver = driver_with(ExpansionConfig {
            cache_enabled: false,
            ..ExpansionConfig::default()
        });
        define_make(&driver, "(fn $i() {})");
        let site = call("main.rs", "make", "aaa", 0);
        assert_eq!(driver.expand_call(&site).unwrap().class, CacheClass::Miss);
        assert_eq!(driver.expand_call(&site).unwrap().class, CacheClass::Miss);
    }

    #[test]
    fn test_nested_calls_expand_through_the_queue() {
        let driver = driver();
        driver
            .define_rules("app", "inner", "app", &[("($i:ident)", "(const $i: u8 = 1;)")])
            .unwrap();
        driver
            .define_rules("app", "outer", "app", &[("($i:ident)", "(fn $i() {} inner!($i);)")])
            .unwrap();

        let report = driver.expand_call(&call("main.rs", "outer", "a", 0)).unwrap();
        let tree = &report.tree;
        assert_eq!(tree.calls.len(), 2);
        assert_eq!(report.text(), "fn a() {} inner!(a);");

        let nested = &tree.calls[1];
        assert_eq!(nested.macro_path, "inner");
        assert_eq!((nested.depth, nested.parent), (1, Some(0)));
        assert!(nested.text.starts_with("const a"));
        assert_eq!(tree.children(0).count(), 1);

        let node = nested.node.as_deref().unwrap();
        assert_eq!(node, "/macro_expansions/main.rs/0/1.rs");
        assert_eq!(driver.storage().read(node).unwrap(), nested.text);
    }

    #[test]
    fn test_recursion_budget_cancels_only_the_branch() {
        let driver = driver_with(ExpansionConfig {
            recursion_limit: 3,
            ..ExpansionConfig::default()
        });
        driver
            .define_macro_rules("app", "app", "macro_rules! again { () => { again!() } }")
            .unwrap();

        let report = driver.expand_call(&call("main.rs", "again", "", 0)).unwrap();
        let tree = &report.tree;
        assert_eq!(report.text(), "again!()");
        assert_eq!(tree.calls.len(), 5);
        assert_eq!(tree.calls[3].depth, 3);
        assert!(tree.calls[3].error.is_none());
        assert_eq!(
            tree.calls[4].error,
            Some(BranchFailure::Expansion(MacroError::RecursionLimitExceeded {
                limit: 3,
                kind: BudgetKind::Depth,
            }))
        );
        assert!(tree.calls[4].node.is_none());
    }

    #[test]
    fn test_call_budget_counts_the_whole_tree() {
        let driver = driver_with(ExpansionConfig {
            call_budget: 2,
            ..ExpansionConfig::default()
        });
        driver
            .define_macro_rules("app", "app", "macro_rules! again { () => { again!() } }")
            .unwrap();

        let report = driver.expand_call(&call("main.rs", "again", "", 0)).unwrap();
        assert_eq!(report.tree.calls.len(), 3);
        assert_eq!(
            report.tree.calls[2].error,
            Some(BranchFailure::Expansion(MacroError::RecursionLimitExceeded {
                limit: 2,
                kind: BudgetKind::Calls,
            }))
        );
    }

    #[test]
    fn test_definitions_in_output_are_registered() {
        let driver = driver();
        driver
            .define_macro_rules("app", "app", "macro_rules! maker { () => { macro_rules! made { () => { 1 } } } }")
            .unwrap();
        let site = call("main.rs", "maker", "", 0);

        let report = driver.expand_call(&site).unwrap();
        let root = report.tree.root().unwrap();
        assert_eq!(root.definitions, vec!["made".to_string()]);
        assert!(root.nested.is_empty());
        assert!(driver.resolve("app", "made").unwrap().is_some());
        assert_eq!(driver.expand_call(&site).unwrap().class, CacheClass::ExactHit);

        let mut use_site = call("main.rs", "made", "", 0);
        use_site.index = 1;
        use_site.context = CallContext::Expr;
        let used = driver.expand_call(&use_site).unwrap();
        assert_eq!(used.text(), "1");
        assert!(used.tree.root().unwrap().parses_in_context);
    }

    #[test]
    fn test_unresolved_calls() {
        let driver = driver();
        let error = driver.expand_call(&call("main.rs", "nope", "", 0)).unwrap_err();
        assert!(matches!(error, DriverError::UnresolvedMacro { ref path, .. } if path == "nope"));

        driver.define_rules("app", "outer", "app", &[("()", "(missing!(x);)")]).unwrap();
        let report = driver.expand_call(&call("main.rs", "outer", "", 0)).unwrap();
        assert_eq!(
            report.tree.calls[1].error,
            Some(BranchFailure::Unresolved {
                path: "missing".to_string(),
            })
        );
    }

    #[test]
    fn test_failed_root_removes_previous_output() {
        let driver = driver();
        define_make(&driver, "(fn $i() {})");
        let report = driver.expand_call(&call("main.rs", "make", "aaa", 0)).unwrap();
        let node = driver.node_path(&report.call);
        assert!(driver.storage().exists(&node).unwrap());

        let error = driver.expand_call(&call("main.rs", "make", "1", 0)).unwrap_err();
        assert!(matches!(error, DriverError::Expansion(MacroError::NoMatchingRule { .. })));
        assert!(!driver.storage().exists(&node).unwrap());
        assert!(driver.tree(&report.call).unwrap().is_none());
    }

    #[test]
    fn test_refresh_reconciles_storage() {
        let driver = driver();
        define_make(&driver, "(fn $i() {})");
        let site = call("main.rs", "make", "aaa", 0);
        let report = driver.expand_call(&site).unwrap();
        let node = driver.node_path(&report.call);

        driver.storage().create_file("/macro_expansions/stray.rs", "x").unwrap();
        driver.storage().update_content(&node, "edited").unwrap();
        let refreshed = driver.refresh().unwrap();
        assert_eq!(refreshed.removed, vec!["/macro_expansions/stray.rs".to_string()]);
        assert_eq!(refreshed.stale, vec![site.id()]);

        assert_eq!(driver.expand_call(&site).unwrap().class, CacheClass::Miss);
        assert_eq!(driver.storage().read(&node).unwrap(), "fn aaa() {}");
        assert_eq!(driver.refresh().unwrap(), RefreshReport::default());
    }

    #[test]
    fn test_cancellation_between_sites() {
        let driver = driver();
        define_make(&driver, "(fn $i() {})");
        let sites = [call("a.rs", "make", "x", 0), call("b.rs", "make", "y", 0)];

        let flag = driver.cancellation_flag();
        flag.store(true, Ordering::SeqCst);
        assert!(matches!(driver.expand_all(&sites), Err(DriverError::Interrupted { processed: 0 })));
        assert!(!flag.load(Ordering::SeqCst));

        let reports = driver.expand_all(&sites).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(Result::is_ok));
    }

    #[test]
    fn test_walk_through_driver() {
        let driver = driver();
        driver
            .define_rules("app", "pick", "app", &[("($e:expr)", "$e"), ("($i:ident)", "$i")])
            .unwrap();
        let kinds = driver.reachable_kinds("app", "pick", "x ", 1).unwrap();
        assert_eq!(kinds.into_iter().collect::<Vec<_>>(), vec![FragmentKind::Expr, FragmentKind::Ident]);
    }
}
