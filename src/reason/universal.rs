//! Universal Instantiation (§4.6.3): specializes `(forall (vars...) body)`
//! assertions against ground facts as they arrive.
//!
//! Only the `body = (=> ante cons)` shape drives a new derivation: `ante` is
//! unified against an incoming ground fact and, on success, the substituted
//! `cons` is asserted, justified by both the universal and the triggering
//! fact. A plain-relation body (`(forall (?x) (mortal ?x))` with no `=>`)
//! unifying against a ground fact confirms consistency but yields nothing
//! new to derive — the universal already states it — so that shape is
//! tracked (for retraction bookkeeping) but never fires.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::assertion::{Assertion, AssertionType};
use crate::cognition::Cognition;
use crate::event::Event;
use crate::term::{Term, OP_IMPLIES};
use crate::unify::{subst, unify};

pub struct UniversalInstantiator {
    /// context -> active universal assertions seen so far.
    universals: Mutex<HashMap<String, Vec<Assertion>>>,
}

impl UniversalInstantiator {
    pub fn new() -> Self {
        Self { universals: Mutex::new(HashMap::new()) }
    }

    pub fn on_event(&self, cog: &Arc<Cognition>, event: &Event) {
        match event {
            Event::Asserted { context, assertion } if assertion.kind == AssertionType::Universal => {
                self.universals.lock().unwrap().entry(context.clone()).or_default().push(assertion.clone());
                self.instantiate_against_existing(cog, context, assertion);
            }
            Event::Asserted { context, assertion } => {
                self.instantiate_new_fact(cog, context, assertion);
            }
            Event::AssertionState { context, assertion_id, is_active: false } => {
                if let Some(list) = self.universals.lock().unwrap().get_mut(context) {
                    list.retain(|u| u.id != *assertion_id);
                }
            }
            _ => {}
        }
    }

    fn instantiate_new_fact(&self, cog: &Arc<Cognition>, context: &str, fact: &Assertion) {
        let universals: Vec<Assertion> = self.universals.lock().unwrap().get(context).cloned().unwrap_or_default();
        for u in &universals {
            try_instantiate(cog, context, u, fact);
        }
    }

    /// When a `forall` arrives after some of its instances already exist,
    /// try it against every active fact whose head matches its antecedent.
    fn instantiate_against_existing(&self, cog: &Arc<Cognition>, context: &str, u: &Assertion) {
        let Some((_op, ante, _cons)) = implication_body(u) else { return };
        for fact in cog.find_candidates(context, ante) {
            try_instantiate(cog, context, u, &fact);
        }
    }
}

impl Default for UniversalInstantiator {
    fn default() -> Self {
        Self::new()
    }
}

/// If `u`'s body is `(=> ante cons)`, return its pieces.
fn implication_body(u: &Assertion) -> Option<(&str, &Term, &Term)> {
    let [_forall, _vars, body] = u.kif.children() else { return None };
    let [op, ante, cons] = body.children() else { return None };
    match op {
        Term::Atom(name) if name.as_str() == OP_IMPLIES => Some((name.as_str(), ante, cons)),
        _ => None,
    }
}

fn try_instantiate(cog: &Arc<Cognition>, context: &str, u: &Assertion, fact: &Assertion) {
    let Some((_op, ante, cons)) = implication_body(u) else { return };
    if let Some(theta) = unify(ante, &fact.kif) {
        let consequent = subst(cons, &theta);
        cog.fire_derivation(context, consequent, &format!("universal:{}", u.id), &[u.clone(), fact.clone()]);
    }
}
