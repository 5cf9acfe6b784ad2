//! The [`Assertion`] record (§3.2) — a single belief recorded in a knowledge
//! base, with the provenance the TMS needs to retract it consistently.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::AssertionId;
use crate::term::Term;

/// Default decay applied to priority on each derivation step (§4.6).
pub const DERIVED_DECAY: f64 = 0.95;

/// Classification of an assertion's logical shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssertionType {
    /// A fully ground fact.
    Ground,
    /// A universally quantified assertion, instantiated on demand (§4.6.3).
    Universal,
    /// An assertion introduced to witness an existential (existential
    /// witness constant, minted by [`crate::skolem::skolemize_input`]).
    Skolemized,
    /// A `(not ...)` form.
    Negation,
}

/// A belief recorded in a context's knowledge base, with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assertion {
    pub id: AssertionId,
    pub kif: Term,
    pub priority: f64,
    /// Monotonic tick, not wall-clock time — see [`crate::cognition::Cognition::next_tick`].
    pub timestamp: u64,
    pub source_id: String,
    pub source_note_id: Option<String>,
    pub justification_ids: BTreeSet<AssertionId>,
    pub kind: AssertionType,
    pub quantified_vars: Vec<String>,
    pub derivation_depth: u32,
    pub is_active: bool,
    pub kb: String,
}

impl Assertion {
    /// Build an input-fact assertion: no justifications, depth 0. An
    /// `(exists (vars) body)` form is skolemized first (§3.2) — the stored
    /// `kif` is `body` with each quantified variable replaced by a fresh
    /// witness constant, classified [`AssertionType::Skolemized`].
    pub fn input(
        id: AssertionId,
        kif: Term,
        priority: f64,
        timestamp: u64,
        source_id: impl Into<String>,
        source_note_id: Option<String>,
        kb: impl Into<String>,
    ) -> Self {
        let (kif, was_existential) = crate::skolem::skolemize_input(kif);
        let kind = if was_existential { AssertionType::Skolemized } else { classify(&kif) };
        let quantified_vars = if kind == AssertionType::Universal {
            quantifier_vars(&kif)
        } else {
            Vec::new()
        };
        Self {
            id,
            kif,
            priority,
            timestamp,
            source_id: source_id.into(),
            source_note_id,
            justification_ids: BTreeSet::new(),
            kind,
            quantified_vars,
            derivation_depth: 0,
            is_active: true,
            kb: kb.into(),
        }
    }

    /// Build a derived assertion from one justification (parent set), with
    /// priority and depth computed per §4.6.
    pub fn derived(
        id: AssertionId,
        kif: Term,
        timestamp: u64,
        source_id: impl Into<String>,
        source_note_id: Option<String>,
        kb: impl Into<String>,
        parents: &[&Assertion],
    ) -> Self {
        let kind = classify(&kif);
        let quantified_vars = if kind == AssertionType::Universal {
            quantifier_vars(&kif)
        } else {
            Vec::new()
        };
        let min_parent_priority = parents
            .iter()
            .map(|p| p.priority)
            .fold(f64::INFINITY, f64::min);
        let priority = if parents.is_empty() {
            1.0
        } else {
            DERIVED_DECAY * min_parent_priority
        };
        let max_parent_depth = parents.iter().map(|p| p.derivation_depth).max().unwrap_or(0);
        Self {
            id,
            kif,
            priority,
            timestamp,
            source_id: source_id.into(),
            source_note_id,
            justification_ids: parents.iter().map(|p| p.id).collect(),
            kind,
            quantified_vars,
            derivation_depth: if parents.is_empty() { 0 } else { 1 + max_parent_depth },
            is_active: true,
            kb: kb.into(),
        }
    }
}

/// Determine an assertion's [`AssertionType`] from its KIF form alone.
fn classify(kif: &Term) -> AssertionType {
    if kif.head_op() == Some(crate::term::OP_FORALL) {
        AssertionType::Universal
    } else if kif.head_op() == Some(crate::term::OP_NOT) {
        AssertionType::Negation
    } else {
        AssertionType::Ground
    }
}

/// Extract the quantified variable names from `(forall (?v1 ?v2 ...) body)`.
fn quantifier_vars(kif: &Term) -> Vec<String> {
    match kif.children() {
        [_op, Term::Lst(vars), _body] => vars
            .iter()
            .filter_map(|v| match v {
                Term::Var(name) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::IdAllocator;

    fn id(n: u64) -> AssertionId {
        AssertionId::new(n).unwrap()
    }

    #[test]
    fn input_assertion_has_depth_zero_and_no_justifications() {
        let kif = Term::parse_kif("(instance rex Dog)").unwrap();
        let a = Assertion::input(id(1), kif, 1.0, 0, "user:test", None, "kb://global");
        assert_eq!(a.derivation_depth, 0);
        assert!(a.justification_ids.is_empty());
        assert!(a.is_active);
        assert_eq!(a.kind, AssertionType::Ground);
    }

    #[test]
    fn derived_assertion_depth_is_one_plus_max_parent() {
        let kif = Term::parse_kif("(instance rex Dog)").unwrap();
        let parent1 = Assertion::input(id(1), kif.clone(), 1.0, 0, "user:test", None, "kb://global");
        let kif2 = Term::parse_kif("(attribute rex Canine)").unwrap();
        let parent2 = Assertion::derived(
            id(2),
            kif2,
            1,
            "reasoner:fc",
            None,
            "kb://global",
            &[&parent1],
        );
        assert_eq!(parent2.derivation_depth, 1);
        assert_eq!(parent2.priority, DERIVED_DECAY * parent1.priority);
        assert_eq!(parent2.justification_ids, BTreeSet::from([id(1)]));
    }

    #[test]
    fn derived_assertion_priority_uses_min_of_parents() {
        let kif1 = Term::parse_kif("(p a)").unwrap();
        let kif2 = Term::parse_kif("(q b)").unwrap();
        let mut p1 = Assertion::input(id(1), kif1, 0.8, 0, "u", None, "kb://global");
        let p2 = Assertion::input(id(2), kif2, 0.5, 0, "u", None, "kb://global");
        p1.priority = 0.8;
        let derived = Assertion::derived(
            id(3),
            Term::parse_kif("(r a b)").unwrap(),
            1,
            "reasoner:fc",
            None,
            "kb://global",
            &[&p1, &p2],
        );
        assert!((derived.priority - DERIVED_DECAY * 0.5).abs() < 1e-12);
    }

    #[test]
    fn universal_assertion_extracts_quantified_vars() {
        let kif = Term::parse_kif("(forall (?x ?y) (likes ?x ?y))").unwrap();
        let a = Assertion::input(id(1), kif, 1.0, 0, "user:test", None, "kb://global");
        assert_eq!(a.kind, AssertionType::Universal);
        assert_eq!(a.quantified_vars, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn existential_input_is_skolemized_and_classified() {
        let kif = Term::parse_kif("(exists (?x) (instance ?x Dog))").unwrap();
        let a = Assertion::input(id(1), kif, 1.0, 0, "user:test", None, "kb://global");
        assert_eq!(a.kind, AssertionType::Skolemized);
        assert!(a.kif.to_kif().starts_with("(instance skolem-"));
        assert!(a.kif.is_ground());
    }

    #[test]
    fn negation_is_classified() {
        let kif = Term::parse_kif("(not (raining))").unwrap();
        let a = Assertion::input(id(1), kif, 1.0, 0, "user:test", None, "kb://global");
        assert_eq!(a.kind, AssertionType::Negation);
    }

    #[test]
    fn allocator_feeds_assertion_ids() {
        let alloc: IdAllocator<AssertionId> = IdAllocator::new();
        let a1 = alloc.next_id();
        let a2 = alloc.next_id();
        assert_ne!(a1, a2);
    }
}
