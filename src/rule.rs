//! The [`Rule`] record and [`RuleStore`] (§3.3, §4.5).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::RuleError;
use crate::ids::{IdAllocator, RuleId};
use crate::term::{Term, OP_EQ, OP_IFF, OP_IMPLIES};
use crate::unify::rename;

/// Default priority assigned to a freshly registered rule.
pub const DEFAULT_RULE_PRIORITY: f64 = 1.0;

/// What kind of inference a rule drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleKind {
    /// `(=> ante cons)` — forward-chaining implication.
    Implication,
    /// `(= lhs rhs)` — a rewrite rule, driven by the rewrite reasoner.
    Rewrite,
}

/// A stored rule: `(=> ante cons)`, or `(= lhs rhs)`.
///
/// `<=>` is not represented directly — [`Rule::from_term`] expands it into
/// two `Implication` rules at parse time (§9 Open Questions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub form: Term,
    pub antecedent: Term,
    pub consequent: Term,
    pub priority: f64,
    pub source_note_id: Option<String>,
    pub kind: RuleKind,
}

impl Rule {
    /// Parse one or two rules out of a single KIF form, per §3.3's three
    /// recognized shapes. `<=>` yields two implications.
    pub fn from_term(
        form: Term,
        priority: f64,
        source_note_id: Option<String>,
        alloc: &IdAllocator<RuleId>,
    ) -> Result<Vec<Rule>, RuleError> {
        let Term::Lst(children) = &form else {
            return Err(RuleError::BadForm { form: form.to_kif() });
        };
        match children.as_slice() {
            [Term::Atom(op), ante, cons] if op == OP_IMPLIES => {
                let rule = Rule::validated(
                    alloc.next_id(),
                    form.clone(),
                    ante.clone(),
                    cons.clone(),
                    priority,
                    source_note_id,
                    RuleKind::Implication,
                )?;
                Ok(vec![rule])
            }
            [Term::Atom(op), ante, cons] if op == OP_IFF => {
                let forward = Rule::validated(
                    alloc.next_id(),
                    Term::list([Term::atom(OP_IMPLIES), ante.clone(), cons.clone()]),
                    ante.clone(),
                    cons.clone(),
                    priority,
                    source_note_id.clone(),
                    RuleKind::Implication,
                )?;
                let backward = Rule::validated(
                    alloc.next_id(),
                    Term::list([Term::atom(OP_IMPLIES), cons.clone(), ante.clone()]),
                    cons.clone(),
                    ante.clone(),
                    priority,
                    source_note_id,
                    RuleKind::Implication,
                )?;
                Ok(vec![forward, backward])
            }
            [Term::Atom(op), lhs, rhs] if op == OP_EQ => {
                let rule = Rule::validated(
                    alloc.next_id(),
                    form.clone(),
                    lhs.clone(),
                    rhs.clone(),
                    priority,
                    source_note_id,
                    RuleKind::Rewrite,
                )?;
                Ok(vec![rule])
            }
            _ => Err(RuleError::BadForm { form: form.to_kif() }),
        }
    }

    fn validated(
        id: RuleId,
        form: Term,
        antecedent: Term,
        consequent: Term,
        priority: f64,
        source_note_id: Option<String>,
        kind: RuleKind,
    ) -> Result<Rule, RuleError> {
        let ante_vars = antecedent.free_vars();
        for var in consequent.free_vars() {
            if !ante_vars.contains(&var) {
                return Err(RuleError::RuleMalformed { var });
            }
        }
        // α-rename to a stable internal form so every stored rule owns a
        // disjoint variable namespace from every other.
        let mut counter = 0;
        let mut mapping = HashMap::new();
        let antecedent = crate::unify::rename_with(&antecedent, &mut counter, &mut mapping);
        let consequent = crate::unify::rename_with(&consequent, &mut counter, &mut mapping);
        Ok(Rule {
            id,
            form,
            antecedent,
            consequent,
            priority,
            source_note_id,
            kind,
        })
    }

    /// Head operator of the antecedent, used for indexing. `None` when the
    /// antecedent is headed by a variable (must match any head).
    pub fn antecedent_head(&self) -> Option<&str> {
        self.antecedent.head_op()
    }

    pub fn antecedent_head_is_var(&self) -> bool {
        match &self.antecedent {
            Term::Lst(children) => matches!(children.first(), Some(Term::Var(_))),
            Term::Var(_) => true,
            _ => false,
        }
    }

    /// α-rename this rule's antecedent/consequent pair to fresh variables for
    /// one firing, preventing cross-firing capture (§4.2).
    pub fn fresh_instance(&self, counter: &mut u64) -> (Term, Term) {
        let mut mapping = HashMap::new();
        let ante = crate::unify::rename_with(&self.antecedent, counter, &mut mapping);
        let cons = crate::unify::rename_with(&self.consequent, counter, &mut mapping);
        (ante, cons)
    }
}

/// Indexed store of [`Rule`]s, keyed by antecedent head operator for fast
/// candidate retrieval (§4.5).
#[derive(Debug, Default)]
pub struct RuleStore {
    rules: HashMap<RuleId, Rule>,
    by_head: HashMap<String, Vec<RuleId>>,
    var_headed: Vec<RuleId>,
    alloc: IdAllocator<RuleId>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocator(&self) -> &IdAllocator<RuleId> {
        &self.alloc
    }

    /// Register a rule form, expanding `<=>` into two rules. Returns the ids
    /// assigned.
    pub fn add_rule(
        &mut self,
        form: Term,
        priority: f64,
        source_note_id: Option<String>,
    ) -> Result<Vec<RuleId>, RuleError> {
        let rules = Rule::from_term(form, priority, source_note_id, &self.alloc)?;
        let mut ids = Vec::with_capacity(rules.len());
        for rule in rules {
            ids.push(rule.id);
            self.index(rule);
        }
        Ok(ids)
    }

    fn index(&mut self, rule: Rule) {
        let id = rule.id;
        if rule.antecedent_head_is_var() {
            self.var_headed.push(id);
        } else if let Some(head) = rule.antecedent_head() {
            self.by_head.entry(head.to_string()).or_default().push(id);
        }
        self.rules.insert(id, rule);
    }

    pub fn remove_rule(&mut self, id: RuleId) -> Result<Rule, RuleError> {
        let rule = self
            .rules
            .remove(&id)
            .ok_or(RuleError::NotFound { id: id.to_string() })?;
        if let Some(head) = rule.antecedent_head() {
            if let Some(bucket) = self.by_head.get_mut(head) {
                bucket.retain(|r| *r != id);
            }
        }
        self.var_headed.retain(|r| *r != id);
        Ok(rule)
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(&id)
    }

    /// Rules whose antecedent head is `op`, or is variable-headed (matches
    /// any head), ordered `(priority desc, id asc)` (§9 tie-break).
    pub fn rules_matching_head(&self, op: &str) -> Vec<&Rule> {
        let mut out: Vec<&Rule> = self
            .by_head
            .get(op)
            .into_iter()
            .flatten()
            .chain(self.var_headed.iter())
            .filter_map(|id| self.rules.get(id))
            .collect();
        out.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    pub fn rewrite_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values().filter(|r| r.kind == RuleKind::Rewrite)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }
}
