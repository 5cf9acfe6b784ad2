//! Rich diagnostic error types for the noetic cognitive engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so callers know exactly
//! what went wrong and how to recover. Parsing and validation errors surface to
//! the immediate caller; reasoner runtime errors deactivate only the current
//! firing; only `InternalInvariantViolated` halts the engine.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the engine.
#[derive(Debug, Error, Diagnostic)]
pub enum NoeticError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Unify(#[from] UnifyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Kb(#[from] KbError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Note(#[from] NoteError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] crate::llm::LlmError),
}

pub type NoeticResult<T> = std::result::Result<T, NoeticError>;

// ---------------------------------------------------------------------------
// Parse errors (§4.1)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
#[error("parse error at {line}:{col}: {reason}")]
#[diagnostic(
    code(noetic::parse::malformed),
    help("Check for unbalanced parens, an unterminated string, or EOF inside an expression.")
)]
pub struct ParseError {
    pub line: usize,
    pub col: usize,
    pub reason: String,
}

impl ParseError {
    pub fn new(line: usize, col: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            col,
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Unification errors (§4.2) — unify() itself returns Option, these are for
// the handful of caller-facing validation failures around it.
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum UnifyError {
    #[error("occurs check failed: {var} occurs in {term}")]
    #[diagnostic(
        code(noetic::unify::occurs_check),
        help("A variable cannot be bound to a term that contains itself; the pattern is cyclic.")
    )]
    OccursCheck { var: String, term: String },

    #[error("arity mismatch: {left} has {left_arity} children, {right} has {right_arity}")]
    #[diagnostic(
        code(noetic::unify::arity_mismatch),
        help("Two list terms can only unify when they have the same number of children.")
    )]
    ArityMismatch {
        left: String,
        left_arity: usize,
        right: String,
        right_arity: usize,
    },
}

// ---------------------------------------------------------------------------
// Rule errors (§3.3, §4.5)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RuleError {
    #[error("rule malformed: variable {var} appears in the consequent but not the antecedent")]
    #[diagnostic(
        code(noetic::rule::malformed),
        help(
            "Every free variable in a rule's consequent must also appear in its \
             antecedent, or the consequent would be under-determined when the rule fires."
        )
    )]
    RuleMalformed { var: String },

    #[error("rule form is not `(=> ante cons)`, `(<=> ante cons)`, or `(= lhs rhs)`: {form}")]
    #[diagnostic(
        code(noetic::rule::bad_form),
        help("Rules must be one of the three recognized shapes.")
    )]
    BadForm { form: String },

    #[error("rule not found: {id}")]
    #[diagnostic(code(noetic::rule::not_found))]
    NotFound { id: String },
}

// ---------------------------------------------------------------------------
// Knowledge base errors (§3.4, §4.3, §4.4)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum KbError {
    #[error("knowledge base \"{context}\" is full (capacity {capacity}) and no assertion is evictable")]
    #[diagnostic(
        code(noetic::kb::full),
        help(
            "Every active assertion in this context either has active dependents or \
             is pinned above the eviction threshold. Raise the capacity, retract \
             something manually, or commit into a different context."
        )
    )]
    KbFull { context: String, capacity: usize },

    #[error("context \"{context}\" does not exist")]
    #[diagnostic(
        code(noetic::kb::no_such_context),
        help("Contexts are created lazily on first commit; check the context id for typos.")
    )]
    NoSuchContext { context: String },

    #[error("assertion not found: {id}")]
    #[diagnostic(code(noetic::kb::assertion_not_found))]
    AssertionNotFound { id: String },

    #[error("cycle detected while expanding goal {goal}")]
    #[diagnostic(
        code(noetic::kb::cycle_detected),
        help("The backward-chaining proof revisited a goal already on its own stack; this branch fails, others continue.")
    )]
    CycleDetected { goal: String },
}

// ---------------------------------------------------------------------------
// Query errors (§4.7, §7)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum QueryError {
    #[error("query {id} timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(noetic::query::timeout),
        help("Increase `queryTimeoutMs`, narrow the query pattern, or lower `reasoningDepthLimit`.")
    )]
    Timeout { id: String, timeout_ms: u64 },

    #[error("query {id} was cancelled")]
    #[diagnostic(code(noetic::query::cancelled))]
    Cancelled { id: String },

    #[error("no answer received for query {id}: bus shut down before a response arrived")]
    #[diagnostic(code(noetic::query::no_responder))]
    NoResponder { id: String },
}

// ---------------------------------------------------------------------------
// Engine-level errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("invalid configuration: {message}")]
    #[diagnostic(code(noetic::engine::invalid_config))]
    InvalidConfig { message: String },

    #[error("failed to read or write state snapshot at {path}: {message}")]
    #[diagnostic(
        code(noetic::engine::persistence),
        help("Check that the snapshot file exists, is valid JSON, and matches the current schema version.")
    )]
    Persistence { path: String, message: String },

    #[error("internal invariant violated: {detail}")]
    #[diagnostic(
        code(noetic::engine::invariant_violated),
        help(
            "This is a bug in the engine, not in caller input. The dispatch thread \
             has been paused; inspect the SystemStatus event for detail and restart \
             the process once the underlying issue is understood."
        )
    )]
    InternalInvariantViolated { detail: String },
}

// ---------------------------------------------------------------------------
// Note errors (§4.9, secondary)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum NoteError {
    #[error("note not found: {id}")]
    #[diagnostic(code(noetic::note::not_found))]
    NotFound { id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_converts_to_noetic_error() {
        let err = ParseError::new(1, 4, "unbalanced parens");
        let wrapped: NoeticError = err.into();
        assert!(matches!(wrapped, NoeticError::Parse(_)));
    }

    #[test]
    fn rule_error_converts_to_noetic_error() {
        let err = RuleError::RuleMalformed { var: "?x".into() };
        let wrapped: NoeticError = err.into();
        assert!(matches!(wrapped, NoeticError::Rule(RuleError::RuleMalformed { .. })));
    }

    #[test]
    fn kb_full_message_mentions_context() {
        let err = KbError::KbFull {
            context: "kb://global".into(),
            capacity: 64,
        };
        let msg = format!("{err}");
        assert!(msg.contains("kb://global"));
        assert!(msg.contains("64"));
    }

    #[test]
    fn query_timeout_message_is_descriptive() {
        let err = QueryError::Timeout {
            id: "q1".into(),
            timeout_ms: 60_000,
        };
        let msg = format!("{err}");
        assert!(msg.contains("q1"));
        assert!(msg.contains("60000"));
    }
}
