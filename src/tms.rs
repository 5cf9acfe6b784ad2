//! Truth Maintenance System: justification tracking and retraction cascades
//! (§3.5, §4.4).
//!
//! Every derived assertion records one or more justification sets (alternative
//! ways it can be entailed). An assertion stays active as long as at least
//! one of its justification sets is fully active. Retracting an assertion
//! cascades depth-first through `justifiees`, cycle-safe via a visited set,
//! and a configurable policy resolves contradictions against explicit
//! negation.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::ids::AssertionId;

/// Resolution policy for `p` / `(not p)` both being active (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContradictionPolicy {
    /// Deactivate the newly recorded assertion, keep the old one.
    PreferOld,
    /// Deactivate the previously active assertion, keep the new one.
    PreferNew,
    /// Deactivate both and record the contradiction.
    FlagBoth,
}

impl Default for ContradictionPolicy {
    fn default() -> Self {
        ContradictionPolicy::PreferOld
    }
}

/// One way a derived assertion can be entailed: a set of parent ids that,
/// together, justify it. An assertion may carry several — any one fully
/// active keeps it active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Justification {
    pub parents: BTreeSet<AssertionId>,
}

impl Justification {
    pub fn new(parents: impl IntoIterator<Item = AssertionId>) -> Self {
        Self { parents: parents.into_iter().collect() }
    }

    pub fn is_input(&self) -> bool {
        self.parents.is_empty()
    }

    fn is_fully_active(&self, active: &impl Fn(AssertionId) -> bool) -> bool {
        self.parents.iter().all(|p| active(*p))
    }
}

/// Outcome of [`Tms::record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Recorded and active.
    Active,
    /// A contradiction with `other` was detected and resolved per policy;
    /// `self_active` reports whether the just-recorded assertion survived.
    Contradiction { other: AssertionId, self_active: bool },
}

/// Outcome of [`Tms::retract`]: every assertion deactivated by the cascade,
/// in the order they were processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetractionResult {
    pub deactivated: Vec<AssertionId>,
}

/// Justification graph over assertion ids.
///
/// `Tms` does not own assertion records (the [`crate::kb::Kb`]s do); it only
/// tracks the `justifiers`/`justifiees` edges and which ids are currently
/// active, via callbacks supplied at call time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tms {
    /// derived id -> its alternative justification sets.
    justifiers: HashMap<AssertionId, Vec<Justification>>,
    /// premise id -> set of derived ids that cite it in some justification.
    justifiees: HashMap<AssertionId, HashSet<AssertionId>>,
    /// unordered contradiction pairs currently flagged (§3.5).
    contradictions: HashSet<(AssertionId, AssertionId)>,
}

impl Tms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `a`'s justification(s). `a` is assumed already active in its
    /// KB; this only wires the graph. Contradiction checking is a separate
    /// step ([`Tms::check_contradiction`]) since it needs a KIF lookup the
    /// TMS itself does not perform.
    pub fn record(&mut self, a: AssertionId, justification: Justification) {
        for &parent in &justification.parents {
            self.justifiees.entry(parent).or_default().insert(a);
        }
        self.justifiers.entry(a).or_default().push(justification);
    }

    pub fn justifiers_of(&self, a: AssertionId) -> &[Justification] {
        self.justifiers.get(&a).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn justifiees_of(&self, a: AssertionId) -> impl Iterator<Item = AssertionId> + '_ {
        self.justifiees.get(&a).into_iter().flatten().copied()
    }

    /// True iff at least one justification set is fully active, or `a` is an
    /// input fact (no justifications at all) — the TMS consistency invariant
    /// (§3.5).
    pub fn has_active_support(&self, a: AssertionId, active: impl Fn(AssertionId) -> bool) -> bool {
        match self.justifiers.get(&a) {
            None => true,
            Some(justifications) => {
                justifications.is_empty()
                    || justifications.iter().any(|j| j.is_fully_active(&active))
            }
        }
    }

    /// True if `a` is cited as a justifier of some other still-active
    /// assertion — used by the KB's eviction policy to forbid evicting a
    /// live dependency, and to forbid evicting a justifier of an active
    /// UNIVERSAL assertion (§9 Open Questions resolution).
    pub fn has_active_dependents(&self, a: AssertionId, active: impl Fn(AssertionId) -> bool) -> bool {
        self.justifiees
            .get(&a)
            .is_some_and(|deps| deps.iter().any(|d| active(*d)))
    }

    /// Check whether `a`'s KIF form contradicts some other active assertion
    /// in the same KB (`a.kif = (not other.kif)` or vice versa), and resolve
    /// per `policy`. `find_negation_partner` is supplied by the caller
    /// (Cognition/Kb) since the TMS has no term-level lookup of its own.
    ///
    /// Returns the other id and which side(s) got deactivated, or `None` if
    /// no contradiction exists.
    pub fn check_contradiction(
        &mut self,
        a: AssertionId,
        partner: Option<AssertionId>,
        policy: ContradictionPolicy,
        mut deactivate: impl FnMut(AssertionId),
    ) -> Option<RecordOutcome> {
        let other = partner?;
        let pair = if a < other { (a, other) } else { (other, a) };
        self.contradictions.insert(pair);

        let self_active = match policy {
            ContradictionPolicy::PreferOld => {
                deactivate(a);
                false
            }
            ContradictionPolicy::PreferNew => {
                deactivate(other);
                true
            }
            ContradictionPolicy::FlagBoth => {
                deactivate(a);
                deactivate(other);
                false
            }
        };
        Some(RecordOutcome::Contradiction { other, self_active })
    }

    pub fn contradictions(&self) -> impl Iterator<Item = &(AssertionId, AssertionId)> {
        self.contradictions.iter()
    }

    /// Depth-first, cycle-safe retraction cascade starting at `root`.
    ///
    /// `root` is deactivated unconditionally (the direct retraction target);
    /// each `x` in `justifiees*(root)` is then deactivated iff none of its
    /// remaining justification sets is still fully active, using `active` to
    /// query current state as the cascade proceeds (callers must update
    /// their own active-set as `deactivate` is invoked, or pass a closure
    /// that reflects it live).
    pub fn retract(
        &mut self,
        root: AssertionId,
        mut active: impl FnMut(AssertionId) -> bool,
        mut deactivate: impl FnMut(AssertionId),
    ) -> RetractionResult {
        let mut result = RetractionResult::default();
        let mut visited: HashSet<AssertionId> = HashSet::new();
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            if visited.contains(&id) {
                continue;
            }
            visited.insert(id);
            deactivate(id);
            result.deactivated.push(id);

            for dependent in self.justifiees_of(id).collect::<Vec<_>>() {
                if visited.contains(&dependent) {
                    continue;
                }
                let still_supported = self
                    .justifiers
                    .get(&dependent)
                    .map(|js| js.iter().any(|j| j.is_fully_active(&active)))
                    .unwrap_or(true);
                if !still_supported {
                    stack.push(dependent);
                }
            }
        }

        result
    }

    /// Drop every edge mentioning `id` — used once an assertion is fully
    /// purged (e.g. evicted and no longer needed for provenance).
    pub fn forget(&mut self, id: AssertionId) {
        self.justifiers.remove(&id);
        if let Some(deps) = self.justifiees.remove(&id) {
            for d in deps {
                if let Some(js) = self.justifiers.get_mut(&d) {
                    for j in js.iter_mut() {
                        j.parents.remove(&id);
                    }
                }
            }
        }
        for js in self.justifiers.values_mut() {
            for j in js.iter_mut() {
                j.parents.remove(&id);
            }
        }
    }
}
