//! Named hit counters for tests
//!
//! Counters are thread-local so tests running in parallel never observe each
//! other's hits.

use std::cell::RefCell;

/// Observable event inside the matcher, transcriber or cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mark {
    /// A matcher literal did not equal the input token
    MatchFailedOnToken,
    /// A rule matched a prefix and left input behind
    MatchFailedOnExtraInput,
    /// A fragment recogniser rejected the input
    MatchFailedOnFragment,
    /// A repetition stopped because no separator followed an iteration
    GroupEndedAtSeparator,
    /// A `+` repetition matched zero iterations
    GroupTooFewElements,
    /// A `?` repetition stopped after its single iteration
    GroupEndedAfterOptional,
    /// A repetition found no input before an iteration
    GroupEndedAtInputStart,
    /// An iteration failed and the group rolled back to the last separator
    GroupEndedAtFailedIteration,
    /// Input ran out right after an iteration
    GroupEndedAfterIteration,
    /// An iteration consumed no tokens
    GroupMatchedEmpty,
    /// A template referenced a metavariable the matcher never binds
    UnboundMetaVarInTemplate,
    /// The cache reused a result for an unchanged call
    CacheExactHit,
    /// The cache reused the output of a call whose captured text is unchanged
    CacheCallHit,
    /// The cache had to match and expand again
    CacheMiss,
    /// A scope's structure changed and its records were rebuilt
    CacheStructureRebind,
}

const MARK_COUNT: usize = Mark::ALL.len();

thread_local! {
    static HITS: RefCell<[usize; MARK_COUNT]> = const { RefCell::new([0; MARK_COUNT]) };
}

impl Mark {
    /// Every mark, in declaration order
    pub const ALL: [Self; 15] = [
        Self::MatchFailedOnToken,
        Self::MatchFailedOnExtraInput,
        Self::MatchFailedOnFragment,
        Self::GroupEndedAtSeparator,
        Self::GroupTooFewElements,
        Self::GroupEndedAfterOptional,
        Self::GroupEndedAtInputStart,
        Self::GroupEndedAtFailedIteration,
        Self::GroupEndedAfterIteration,
        Self::GroupMatchedEmpty,
        Self::UnboundMetaVarInTemplate,
        Self::CacheExactHit,
        Self::CacheCallHit,
        Self::CacheMiss,
        Self::CacheStructureRebind,
    ];

    /// Records one hit on the current thread
    pub fn hit(self) {
        HITS.with(|hits| hits.borrow_mut()[self as usize] += 1);
    }

    /// Hits recorded on the current thread since it started
    pub fn hits(self) -> usize {
        HITS.with(|hits| hits.borrow()[self as usize])
    }
}

/// Snapshot of the counters, used to count hits from a point onwards
#[derive(Debug, Clone)]
pub struct Tracker {
    baseline: [usize; MARK_COUNT],
}

impl Tracker {
    /// Hits of `mark` since the tracker was created
    pub fn hits(&self, mark: Mark) -> usize {
        mark.hits() - self.baseline[mark as usize]
    }

    /// Whether `mark` was hit at least once since the tracker was created
    pub fn was_hit(&self, mark: Mark) -> bool {
        self.hits(mark) > 0
    }
}

/// Starts counting hits on the current thread
pub fn track() -> Tracker {
    Tracker {
        baseline: HITS.with(|hits| *hits.borrow()),
    }
}
