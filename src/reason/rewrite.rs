//! Rewrite Rule Reasoner (§4.6.2): applies `(= lhs rhs)` rules leftmost-
//! outermost, one rewrite per incoming event.
//!
//! Each `Asserted` event is tried against the whole `kif` term first
//! (outermost); if nothing there matches, its children are tried left to
//! right, recursively. The first successful rewrite produces one derived
//! assertion and the pass stops — a subsequent `Asserted` event for that
//! derived assertion drives the next rewrite step, so a chain of n rewrites
//! takes n trips through the bus rather than normalizing in one call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cognition::Cognition;
use crate::event::Event;
use crate::rule::Rule;
use crate::term::Term;
use crate::unify::{rename_with, subst, unify};

pub struct RewriteReasoner {
    rename_counter: AtomicU64,
}

impl RewriteReasoner {
    pub fn new() -> Self {
        Self { rename_counter: AtomicU64::new(0) }
    }

    pub fn on_event(&self, cog: &Arc<Cognition>, event: &Event) {
        let Event::Asserted { context, assertion } = event else { return };
        let rules = cog.rewrite_rules();
        if rules.is_empty() {
            return;
        }
        let mut counter = self.rename_counter.fetch_add(1_000, Ordering::Relaxed);
        if let Some(rewritten) = leftmost_outermost(&assertion.kif, &rules, &mut counter) {
            if rewritten != assertion.kif {
                cog.fire_derivation(context, rewritten, "reasoner:rewrite", &[assertion.clone()]);
            }
        }
    }
}

impl Default for RewriteReasoner {
    fn default() -> Self {
        Self::new()
    }
}

/// Try every rewrite rule against `term` itself before descending into its
/// children left to right. Returns the rewritten whole term on the first
/// match found anywhere, or `None` if no rule applies.
fn leftmost_outermost(term: &Term, rules: &[Rule], counter: &mut u64) -> Option<Term> {
    for rule in rules {
        let mut mapping = std::collections::HashMap::new();
        let lhs = rename_with(&rule.antecedent, counter, &mut mapping);
        if let Some(theta) = unify(&lhs, term) {
            let rhs = rename_with(&rule.consequent, counter, &mut mapping);
            return Some(subst(&rhs, &theta));
        }
    }
    if let Term::Lst(children) = term {
        for (i, child) in children.iter().enumerate() {
            if let Some(rewritten_child) = leftmost_outermost(child, rules, counter) {
                let mut new_children = children.clone();
                new_children[i] = rewritten_child;
                return Some(Term::Lst(new_children));
            }
        }
    }
    None
}
