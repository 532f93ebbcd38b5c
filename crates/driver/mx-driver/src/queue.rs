//! Bounded work queue for nested expansion
//!
//! Calls found in an expansion's output are queued, not expanded
//! recursively, so the limits below hold no matter how deep a macro
//! recurses.

use crate::config::ExpansionConfig;
use mx_macro::{BudgetKind, MacroError};
use mx_tt::TokenBuffer;
use std::collections::VecDeque;
use tracing::warn;

/// Limits of one recursive expansion tree
#[derive(Debug, Clone)]
pub struct Budget {
    depth_limit: usize,
    call_limit: usize,
    token_limit: usize,
    calls: usize,
    tokens: usize,
}

impl Budget {
    /// Fresh budget with the limits of `config`
    pub const fn new(config: &ExpansionConfig) -> Self {
        Self {
            depth_limit: config.recursion_limit,
            call_limit: config.call_budget,
            token_limit: config.token_budget,
            calls: 0,
            tokens: 0,
        }
    }

    /// Admits one expansion at nesting `depth`
    ///
    /// The root call has depth zero.
    ///
    /// # Errors
    ///
    /// Fails with [`MacroError::RecursionLimitExceeded`] when `depth` is past the
    /// recursion limit or the call budget is spent.
    pub fn enter(&mut self, depth: usize) -> Result<(), MacroError> {
        if depth > self.depth_limit {
            return Err(exceeded(self.depth_limit, BudgetKind::Depth));
        }
        if self.calls >= self.call_limit {
            return Err(exceeded(self.call_limit, BudgetKind::Calls));
        }
        self.calls += 1;
        Ok(())
    }

    /// Charges `tokens` produced by an admitted expansion
    ///
    /// # Errors
    ///
    /// Fails with [`MacroError::RecursionLimitExceeded`] once the token budget
    /// is spent.
    pub fn produce(&mut self, tokens: usize) -> Result<(), MacroError> {
        let total = self.tokens.saturating_add(tokens);
        if total > self.token_limit {
            return Err(exceeded(self.token_limit, BudgetKind::Tokens));
        }
        self.tokens = total;
        Ok(())
    }

    /// Expansions admitted so far
    pub const fn calls(&self) -> usize {
        self.calls
    }

    /// Tokens charged so far
    pub const fn tokens(&self) -> usize {
        self.tokens
    }
}

fn exceeded(limit: usize, kind: BudgetKind) -> MacroError {
    warn!(limit, ?kind, "expansion branch exceeded its budget");
    MacroError::RecursionLimitExceeded { limit, kind }
}

/// A nested call waiting to be expanded
#[derive(Debug, Clone)]
pub struct Job {
    /// Macro path as written in the parent's output
    pub path: String,
    /// Body tokens, spanned over `body_text`
    pub input: TokenBuffer,
    /// Body text
    pub body_text: String,
    /// Nesting depth; the root call is zero
    pub depth: usize,
    /// Index of the parent in the expansion tree
    pub parent: usize,
}

/// First-in first-out queue of nested calls
#[derive(Debug, Default)]
pub struct WorkQueue {
    jobs: VecDeque<Job>,
}

impl WorkQueue {
    /// Creates an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a job behind all others
    pub fn push(&mut self, job: Job) {
        self.jobs.push_back(job);
    }

    /// Takes the oldest job
    pub fn pop(&mut self) -> Option<Job> {
        self.jobs.pop_front()
    }

    /// Jobs waiting
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether no job is waiting
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
