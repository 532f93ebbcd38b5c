//! Expansion caches
//!
//! Two layers: the shared content cache maps a content key to the result of
//! matching and transcribing once, and is shared by every call site with
//! the same definition, body and context. Per-call records (kept by the
//! driver) decide how much of that work a repeated request can skip.

use crate::hash::ContentHash;
use mx_macro::hygiene::{fresh_context, restamp};
use mx_macro::{Expansion, MacroError, Mark};
use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::trace;

/// How a request was served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CacheClass {
    /// Nothing relevant changed; the previous result was returned as is
    ExactHit,
    /// The call moved or its site changed, but the definition and captured
    /// text did not; the stored output was reused
    CallHit,
    /// The captured text or the definition changed, or nothing was cached
    Miss,
    /// The scope's structure changed; the record was rebuilt from scratch
    StructureRebind,
}

impl CacheClass {
    /// Observability mark of this class
    pub const fn mark(self) -> Mark {
        match self {
            Self::ExactHit => Mark::CacheExactHit,
            Self::CallHit => Mark::CacheCallHit,
            Self::Miss => Mark::CacheMiss,
            Self::StructureRebind => Mark::CacheStructureRebind,
        }
    }
}

impl fmt::Display for CacheClass {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::ExactHit => "exact hit",
            Self::CallHit => "call hit",
            Self::Miss => "miss",
            Self::StructureRebind => "structure rebind",
        })
    }
}

/// Result stored for one content key
pub type CachedExpansion = Result<Arc<Expansion>, MacroError>;

type Slot = Arc<OnceCell<CachedExpansion>>;

/// Content-addressed expansion results shared across call sites
///
/// Each key owns a cell that exactly one thread initialises; concurrent
/// requests for the same key block on that cell and then share its value.
#[derive(Debug, Default)]
pub struct ContentCache {
    slots: RwLock<FxHashMap<ContentHash, Slot>>,
}

impl ContentCache {
    /// Creates an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: ContentHash) -> Option<Slot> {
        if let Some(slot) = self.slots.read().ok()?.get(&key) {
            return Some(Arc::clone(slot));
        }
        let mut slots = self.slots.write().ok()?;
        Some(Arc::clone(slots.entry(key).or_default()))
    }

    /// Returns the result for `key`, computing it at most once
    ///
    /// A reused successful result is handed out with a fresh hygiene
    /// context so no two call sites share definition-introduced names.
    /// Returns `None` only if the cache lock is poisoned.
    pub fn get_or_compute(&self, key: ContentHash, compute: impl FnOnce() -> CachedExpansion) -> Option<CachedExpansion> {
        let slot = self.slot(key)?;
        let mut computed = false;
        let result = slot.get_or_init(|| {
            computed = true;
            compute()
        });
        if computed {
            trace!(%key, "content cache filled");
            return Some(result.clone());
        }
        trace!(%key, "content cache reused");
        Some(result.as_ref().map(|expansion| Arc::new(restamped(expansion))).map_err(Clone::clone))
    }

    /// Stores `result` under `key`, replacing any previous entry
    pub fn replace(&self, key: ContentHash, result: CachedExpansion) -> bool {
        let Ok(mut slots) = self.slots.write() else {
            return false;
        };
        slots.insert(key, Arc::new(OnceCell::with_value(result)));
        true
    }

    /// Drops the entry for `key`; returns whether one existed
    pub fn remove(&self, key: ContentHash) -> bool {
        self.slots.write().is_ok_and(|mut slots| slots.remove(&key).is_some())
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.slots.read().map_or(0, |slots| slots.len())
    }

    /// Whether the cache holds no keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Copy of `expansion` whose template identifiers use a fresh context
fn restamped(expansion: &Expansion) -> Expansion {
    let mut copy = expansion.clone();
    let ctx = fresh_context();
    restamp(copy.tokens.tokens_mut(), expansion.ctx, ctx);
    copy.ctx = ctx;
    copy
}
