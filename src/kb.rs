//! Per-context Knowledge Base (§3.4, §4.3).
//!
//! Each context ("note", or the distinguished `kb://global`) owns one `Kb`:
//! an id-indexed assertion table, a head-operator index for candidate
//! retrieval, and a bounded capacity enforced by priority-ordered eviction.

use std::collections::HashMap;

use crate::assertion::Assertion;
use crate::error::KbError;
use crate::ids::AssertionId;
use crate::term::Term;

pub const GLOBAL_CONTEXT: &str = "kb://global";
pub const DEFAULT_GLOBAL_CAPACITY: usize = 64 * 1024;

/// Outcome of a successful [`Kb::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitResult {
    /// A new assertion was added.
    Inserted(AssertionId),
    /// An assertion with equal `kif` was already active; its source tags
    /// were merged and no new id was minted.
    Promoted(AssertionId),
}

/// One context's assertion store.
#[derive(Debug)]
pub struct Kb {
    pub context_id: String,
    pub capacity: usize,
    assertions: HashMap<AssertionId, Assertion>,
    by_head: HashMap<String, Vec<AssertionId>>,
    /// Deduplication index: canonical KIF text of every *active* assertion.
    by_kif: HashMap<String, AssertionId>,
    /// Set by `commit` when it evicts to make room; cleared by `commit` on
    /// each call so callers can observe at most the most recent eviction
    /// (Cognition reads this to emit `AssertionEvicted`/`AssertionState`).
    last_evicted: Option<AssertionId>,
}

impl Kb {
    pub fn new(context_id: impl Into<String>, capacity: usize) -> Self {
        Self {
            context_id: context_id.into(),
            capacity,
            assertions: HashMap::new(),
            by_head: HashMap::new(),
            by_kif: HashMap::new(),
            last_evicted: None,
        }
    }

    /// Take the id evicted by the most recent `commit`, if any.
    pub fn take_last_evicted(&mut self) -> Option<AssertionId> {
        self.last_evicted.take()
    }

    pub fn len(&self) -> usize {
        self.assertions.values().filter(|a| a.is_active).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: AssertionId) -> Option<&Assertion> {
        self.assertions.get(&id)
    }

    pub fn get_mut(&mut self, id: AssertionId) -> Option<&mut Assertion> {
        self.assertions.get_mut(&id)
    }

    /// Commit a freshly built assertion. If an active assertion with the
    /// same canonical `kif` already exists, its source tag is merged in and
    /// its id is returned instead of inserting a duplicate (§4.3).
    ///
    /// `evictable` decides, for a candidate id, whether it may be evicted
    /// (the caller — Cognition — knows whether an id has active dependents
    /// via the TMS, which this module does not own).
    pub fn commit(
        &mut self,
        assertion: Assertion,
        evictable: impl Fn(AssertionId) -> bool,
    ) -> Result<CommitResult, KbError> {
        let kif_text = assertion.kif.to_kif();
        if let Some(&existing_id) = self.by_kif.get(&kif_text) {
            if let Some(existing) = self.assertions.get_mut(&existing_id) {
                if existing.is_active {
                    existing.source_id = format!("{};{}", existing.source_id, assertion.source_id);
                    return Ok(CommitResult::Promoted(existing_id));
                }
            }
        }

        if self.len() >= self.capacity {
            self.evict_one(&evictable)?;
        }

        let id = assertion.id;
        self.index_insert(&assertion);
        self.assertions.insert(id, assertion);
        Ok(CommitResult::Inserted(id))
    }

    fn index_insert(&mut self, assertion: &Assertion) {
        self.by_kif.insert(assertion.kif.to_kif(), assertion.id);
        if let Some(head) = assertion.kif.head_op() {
            self.by_head.entry(head.to_string()).or_default().push(assertion.id);
        }
    }

    /// Evict the lowest-`(priority, -timestamp)` active assertion for which
    /// `evictable` returns true. Errors with `KbFull` if none qualifies.
    fn evict_one(&mut self, evictable: &impl Fn(AssertionId) -> bool) -> Result<AssertionId, KbError> {
        let victim = self
            .assertions
            .values()
            .filter(|a| a.is_active && evictable(a.id))
            .min_by(|a, b| {
                a.priority
                    .partial_cmp(&b.priority)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.timestamp.cmp(&a.timestamp))
            })
            .map(|a| a.id);

        match victim {
            Some(id) => {
                self.deactivate(id);
                Ok(id)
            }
            None => Err(KbError::KbFull {
                context: self.context_id.clone(),
                capacity: self.capacity,
            }),
        }
    }

    /// Mark an assertion inactive and drop it from the dedup/head indices
    /// (it stays in the id table for provenance lookups). Returns whether it
    /// was previously active.
    pub fn deactivate(&mut self, id: AssertionId) -> bool {
        let Some(assertion) = self.assertions.get_mut(&id) else {
            return false;
        };
        if !assertion.is_active {
            return false;
        }
        assertion.is_active = false;
        let kif_text = assertion.kif.to_kif();
        if self.by_kif.get(&kif_text) == Some(&id) {
            self.by_kif.remove(&kif_text);
        }
        if let Some(head) = assertion.kif.head_op() {
            if let Some(bucket) = self.by_head.get_mut(head) {
                bucket.retain(|x| *x != id);
            }
        }
        true
    }

    /// Remove an assertion entirely (used once retraction has fully
    /// resolved and the caller no longer needs provenance for it).
    pub fn remove(&mut self, id: AssertionId) -> Result<Assertion, KbError> {
        self.deactivate(id);
        self.assertions
            .remove(&id)
            .ok_or_else(|| KbError::AssertionNotFound { id: id.to_string() })
    }

    /// Active assertions whose `kif` head is `op`, in priority order.
    pub fn find_by_operator_head(&self, op: &str) -> Vec<&Assertion> {
        let mut out: Vec<&Assertion> = self
            .by_head
            .get(op)
            .into_iter()
            .flatten()
            .filter_map(|id| self.assertions.get(id))
            .filter(|a| a.is_active)
            .collect();
        sort_by_priority(&mut out);
        out
    }

    /// Active assertions whose `kif` could unify with `pattern`: narrowed
    /// via the head index when the pattern has a ground-atom head, else a
    /// full scan. Always returned in priority order (§4.3).
    pub fn find_candidates(&self, pattern: &Term) -> Vec<&Assertion> {
        let mut out: Vec<&Assertion> = match pattern.head_op() {
            Some(op) => self.find_by_operator_head(op),
            None => self.assertions.values().filter(|a| a.is_active).collect(),
        };
        sort_by_priority(&mut out);
        out
    }

    /// All active assertions, in priority order (used for persistence).
    pub fn drain(&self) -> Vec<&Assertion> {
        let mut out: Vec<&Assertion> = self.assertions.values().filter(|a| a.is_active).collect();
        sort_by_priority(&mut out);
        out
    }

    pub fn contains_active_kif(&self, kif: &Term) -> Option<AssertionId> {
        self.by_kif.get(&kif.to_kif()).copied()
    }

    pub fn all_ids(&self) -> Vec<AssertionId> {
        self.assertions.keys().copied().collect()
    }
}

fn sort_by_priority(assertions: &mut [&Assertion]) {
    assertions.sort_by(|a, b| {
        b.priority
            .partial_cmp(&a.priority)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });
}
