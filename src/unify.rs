//! First-order unification and capture-avoiding substitution (§4.2).
//!
//! Unification runs over an explicit work stack rather than recursion so
//! deeply nested terms don't blow the call stack. Bindings accumulate into a
//! [`Substitution`], which is then applied wherever the caller needs a
//! concrete instantiated term.

use std::collections::HashMap;

use crate::term::Term;

/// A set of variable → term bindings produced by a successful unification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitution {
    bindings: HashMap<String, Term>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, var: &str) -> Option<&Term> {
        self.bindings.get(var)
    }

    pub fn insert(&mut self, var: impl Into<String>, term: Term) {
        self.bindings.insert(var.into(), term);
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Term)> {
        self.bindings.iter()
    }

    /// Follow variable-to-variable chains to the final binding, if any.
    fn resolve<'a>(&'a self, mut term: &'a Term) -> &'a Term {
        let mut seen = 0;
        while let Term::Var(name) = term {
            match self.bindings.get(name) {
                Some(next) if seen < self.bindings.len() => {
                    term = next;
                    seen += 1;
                }
                _ => break,
            }
        }
        term
    }
}

/// Attempt to unify `pattern` against `instance`, returning the most general
/// unifier on success.
///
/// Two identical terms succeed with no binding. A variable on either side is
/// bound to the other after an occurs-check; a variable never binds to
/// itself. Two lists unify iff their arities match and every child pair
/// unifies under the bindings accumulated so far.
pub fn unify(pattern: &Term, instance: &Term) -> Option<Substitution> {
    let mut subst = Substitution::new();
    let mut stack = vec![(pattern.clone(), instance.clone())];

    while let Some((p, i)) = stack.pop() {
        let p = subst.resolve(&p).clone();
        let i = subst.resolve(&i).clone();

        match (&p, &i) {
            (a, b) if a == b => continue,

            (Term::Var(name), other) => {
                if occurs(name, other, &subst) {
                    return None;
                }
                subst.insert(name.clone(), other.clone());
            }
            (other, Term::Var(name)) => {
                if occurs(name, other, &subst) {
                    return None;
                }
                subst.insert(name.clone(), other.clone());
            }

            (Term::Atom(a), Term::Atom(b)) => {
                if a != b {
                    return None;
                }
            }

            (Term::Lst(lhs), Term::Lst(rhs)) => {
                if lhs.len() != rhs.len() {
                    return None;
                }
                for (l, r) in lhs.iter().zip(rhs.iter()) {
                    stack.push((l.clone(), r.clone()));
                }
            }

            _ => return None,
        }
    }

    Some(subst)
}

/// True if `var` occurs free in `term` once all current bindings are
/// resolved — i.e. binding `var` to `term` would create a cyclic structure.
fn occurs(var: &str, term: &Term, subst: &Substitution) -> bool {
    let term = subst.resolve(term);
    match term {
        Term::Var(name) => name == var,
        Term::Atom(_) => false,
        Term::Lst(children) => children.iter().any(|c| occurs(var, c, subst)),
    }
}

/// Apply a substitution, returning `term` unchanged (no clone of interior
/// structure) when it contains none of the substitution's variables.
pub fn subst(term: &Term, theta: &Substitution) -> Term {
    if theta.is_empty() {
        return term.clone();
    }
    match term {
        Term::Atom(_) => term.clone(),
        Term::Var(name) => match theta.get(name) {
            Some(bound) => subst(bound, theta),
            None => term.clone(),
        },
        Term::Lst(children) => {
            Term::Lst(children.iter().map(|c| subst(c, theta)).collect())
        }
    }
}

/// α-rename every variable in `term` to a fresh name derived from `counter`,
/// so two firings of the same rule never share a variable.
///
/// Returns the renamed term and the mapping used, so callers can apply the
/// same renaming to a companion term (e.g. a rule's consequent alongside its
/// antecedent).
pub fn rename(term: &Term, counter: &mut u64) -> (Term, HashMap<String, String>) {
    let mut mapping = HashMap::new();
    let renamed = rename_with(term, counter, &mut mapping);
    (renamed, mapping)
}

/// Rename `term` using (and extending) an existing variable mapping, so
/// multiple terms from the same rule share fresh names for shared variables.
pub fn rename_with(term: &Term, counter: &mut u64, mapping: &mut HashMap<String, String>) -> Term {
    match term {
        Term::Atom(_) => term.clone(),
        Term::Var(name) => {
            let fresh = mapping.entry(name.clone()).or_insert_with(|| {
                *counter += 1;
                format!("{name}__{counter}")
            });
            Term::Var(fresh.clone())
        }
        Term::Lst(children) => Term::Lst(
            children.iter().map(|c| rename_with(c, counter, mapping)).collect(),
        ),
    }
}
