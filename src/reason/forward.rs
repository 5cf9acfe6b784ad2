//! Forward Chaining (§4.6.1): fires `(=> ante cons)` rules against newly
//! asserted facts.
//!
//! Plain (non-conjunctive) antecedents are matched straight off
//! `RuleStore`'s head index via `Cognition::rules_matching_head`. Conjunctive
//! antecedents (`(=> (and a b c) cons)`) need a fact to satisfy each conjunct
//! before the rule can fire; this module keeps its own small index of those
//! rules and, on each new fact, tries it against every conjunct position,
//! completing the remaining conjuncts against the context's existing
//! assertions — a partial-match table in miniature, not a full RETE network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::assertion::Assertion;
use crate::cognition::Cognition;
use crate::event::Event;
use crate::ids::RuleId;
use crate::rule::{Rule, RuleKind};
use crate::term::{Term, OP_AND};
use crate::unify::{subst, unify, Substitution};

pub struct ForwardChainer {
    conjunctive: Mutex<HashMap<RuleId, Rule>>,
    rename_counter: AtomicU64,
}

impl ForwardChainer {
    pub fn new() -> Self {
        Self { conjunctive: Mutex::new(HashMap::new()), rename_counter: AtomicU64::new(0) }
    }

    pub fn on_event(&self, cog: &Arc<Cognition>, event: &Event) {
        match event {
            Event::RuleAdded { rule } if rule.kind == RuleKind::Implication => {
                if rule.antecedent.head_op() == Some(OP_AND) {
                    self.conjunctive.lock().unwrap().insert(rule.id, rule.clone());
                }
            }
            Event::RuleRemoved { rule_id } => {
                self.conjunctive.lock().unwrap().remove(rule_id);
            }
            Event::Asserted { context, assertion } => {
                self.fire_plain(cog, context, assertion);
                self.fire_conjunctive(cog, context, assertion);
            }
            _ => {}
        }
    }

    fn next_counter(&self) -> u64 {
        self.rename_counter.fetch_add(1_000, Ordering::Relaxed)
    }

    fn fire_plain(&self, cog: &Arc<Cognition>, context: &str, assertion: &Assertion) {
        let Some(op) = assertion.kif.head_op() else { return };
        for rule in cog.rules_matching_head(op) {
            if rule.kind != RuleKind::Implication || rule.antecedent.head_op() == Some(OP_AND) {
                continue;
            }
            let mut counter = self.next_counter();
            let (ante, cons) = rule.fresh_instance(&mut counter);
            if let Some(theta) = unify(&ante, &assertion.kif) {
                let consequent = subst(&cons, &theta);
                cog.fire_derivation(context, consequent, &format!("rule:{}", rule.id), &[assertion.clone()]);
            }
        }
    }

    fn fire_conjunctive(&self, cog: &Arc<Cognition>, context: &str, assertion: &Assertion) {
        let rules: Vec<Rule> = self.conjunctive.lock().unwrap().values().cloned().collect();
        for rule in rules {
            let mut counter = self.next_counter();
            let (ante, cons) = rule.fresh_instance(&mut counter);
            let fresh_conjuncts = &ante.children()[1..];
            // A given fact may satisfy more than one conjunct position, so
            // every position is tried, not just the first match.
            for (i, conjunct) in fresh_conjuncts.iter().enumerate() {
                let Some(theta0) = unify(conjunct, &assertion.kif) else { continue };
                if let Some((theta, contributors)) =
                    complete_match(cog, context, fresh_conjuncts, i, theta0, vec![assertion.clone()])
                {
                    let consequent = subst(&cons, &theta);
                    cog.fire_derivation(context, consequent, &format!("rule:{}", rule.id), &contributors);
                }
            }
        }
    }
}

impl Default for ForwardChainer {
    fn default() -> Self {
        Self::new()
    }
}

/// Backtracking completion of the conjuncts other than `skip` (already
/// matched by the triggering fact), against whatever else is active in
/// `context`. Returns the merged substitution and every assertion that
/// contributed to the match, in conjunct order.
fn complete_match(
    cog: &Arc<Cognition>,
    context: &str,
    conjuncts: &[Term],
    skip: usize,
    theta: Substitution,
    contributors: Vec<Assertion>,
) -> Option<(Substitution, Vec<Assertion>)> {
    go(cog, context, conjuncts, 0, skip, theta, contributors)
}

fn go(
    cog: &Arc<Cognition>,
    context: &str,
    conjuncts: &[Term],
    idx: usize,
    skip: usize,
    theta: Substitution,
    contributors: Vec<Assertion>,
) -> Option<(Substitution, Vec<Assertion>)> {
    if idx == conjuncts.len() {
        return Some((theta, contributors));
    }
    if idx == skip {
        return go(cog, context, conjuncts, idx + 1, skip, theta, contributors);
    }
    let pattern = subst(&conjuncts[idx], &theta);
    for candidate in cog.find_candidates(context, &pattern) {
        let Some(theta_delta) = unify(&pattern, &candidate.kif) else { continue };
        let mut merged = theta.clone();
        for (k, v) in theta_delta.iter() {
            merged.insert(k.clone(), v.clone());
        }
        let mut next_contributors = contributors.clone();
        next_contributors.push(candidate);
        if let Some(result) = go(cog, context, conjuncts, idx + 1, skip, merged, next_contributors) {
            return Some(result);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::config::EngineConfig;
    use crate::kb::GLOBAL_CONTEXT;

    #[test]
    fn conjunctive_antecedent_fires_once_both_conjuncts_are_present() {
        let bus = Arc::new(EventBus::start());
        let cog = Cognition::new(EngineConfig::default(), bus);
        cog.add_rule(
            Term::parse_kif("(=> (and (parent ?x ?y) (parent ?y ?z)) (grandparent ?x ?z))").unwrap(),
            1.0,
            None,
        )
        .unwrap();
        cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(parent Alice Bob)").unwrap(), "u", None)
            .unwrap();
        cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(parent Bob Carol)").unwrap(), "u", None)
            .unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        loop {
            let found = cog
                .find_candidates(GLOBAL_CONTEXT, &Term::parse_kif("(grandparent Alice Carol)").unwrap())
                .iter()
                .any(|a| a.kif.to_kif() == "(grandparent Alice Carol)");
            if found || std::time::Instant::now() > deadline {
                assert!(found, "grandparent fact was never derived");
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }
}
