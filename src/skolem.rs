//! Skolemization (§3.2): witness constants for existentially quantified
//! input, the one `exists`-handling the engine does — no function-arity
//! Skolemization over already-bound variables, just a fresh nullary
//! constant per quantified variable, substituted through the body.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::term::{Term, OP_EXISTS};
use crate::unify::{subst, Substitution};

/// If `kif` is `(exists (v1 v2 ...) body)`, replace each `vi` with a fresh
/// `skolem-N` constant throughout `body` and return `(body', true)`.
/// Any other shape is returned unchanged with `false`.
pub fn skolemize(kif: &Term, counter: &AtomicU64) -> (Term, bool) {
    let children = kif.children();
    let (Some(op), [Term::Lst(vars), body]) = (kif.head_op(), children.get(1..).unwrap_or(&[])) else {
        return (kif.clone(), false);
    };
    if op != OP_EXISTS || children.len() != 3 {
        return (kif.clone(), false);
    }

    let mut theta = Substitution::new();
    for v in vars {
        if let Term::Var(name) = v {
            let n = counter.fetch_add(1, Ordering::Relaxed);
            theta.insert(name.clone(), Term::atom(format!("skolem-{n}")));
        }
    }
    (subst(body, &theta), true)
}

static SKOLEM_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Skolemize `kif` using the process-wide counter, for the input path
/// (§4.8 `addInput`). Returns `kif` unchanged when it is not an `exists`
/// form.
pub fn skolemize_input(kif: Term) -> (Term, bool) {
    let (body, was_existential) = skolemize(&kif, &SKOLEM_COUNTER);
    if was_existential {
        (body, true)
    } else {
        (kif, false)
    }
}
