//! Bus-level event envelope (§3.6, §6.2).
//!
//! `Event` is the one wire type every subscriber sees. It is tagged with an
//! `eventType` discriminant so the JSON envelope round-trips exactly:
//! `parse(serialize(e)) == e` for every variant, which is why every field
//! here derives `Serialize`/`Deserialize` rather than relying on reflection.

use serde::{Deserialize, Serialize};

use crate::assertion::Assertion;
use crate::ids::{AssertionId, RuleId};
use crate::rule::Rule;
use crate::term::Term;

/// How a retraction target is identified (§6.3 `retract`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum RetractTarget {
    ById(AssertionId),
    ByKif(String),
    ByNote(String),
}

/// The three query shapes the backward chainer answers (§4.6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryType {
    AskBindings,
    AskTrueFalse,
    AchieveGoal,
}

/// Terminal status of a query (§4.6.4, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryStatus {
    Success,
    Failure,
    Timeout,
    Error,
}

/// A query submitted to the bus (§4.7).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub id: String,
    pub query_type: QueryType,
    pub pattern: Term,
    pub target_kb_id: Option<String>,
}

/// A coalesced answer to a [`QueryRequest`] (§4.7).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub query_id: String,
    pub status: QueryStatus,
    /// One binding map per distinct solution; empty for `AskTrueFalse`
    /// (status alone carries the answer) and for a failed `AskBindings`.
    pub bindings: Vec<Vec<(String, Term)>>,
}

impl Answer {
    pub fn success(query_id: impl Into<String>, bindings: Vec<Vec<(String, Term)>>) -> Self {
        Self { query_id: query_id.into(), status: QueryStatus::Success, bindings }
    }

    pub fn failure(query_id: impl Into<String>) -> Self {
        Self { query_id: query_id.into(), status: QueryStatus::Failure, bindings: Vec::new() }
    }

    pub fn timeout(query_id: impl Into<String>) -> Self {
        Self { query_id: query_id.into(), status: QueryStatus::Timeout, bindings: Vec::new() }
    }

    pub fn error(query_id: impl Into<String>) -> Self {
        Self { query_id: query_id.into(), status: QueryStatus::Error, bindings: Vec::new() }
    }
}

/// Status reported alongside a [`Event::TaskUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Started,
    Completed,
    Error,
}

/// Why an assertion's active state flipped (§3.2 lifecycle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetractReason {
    Explicit,
    Cascade,
    Eviction,
    Contradiction,
}

/// The full set of events carried on the bus (§3.6).
///
/// Tagged by `eventType` so the JSON envelope (§6.2) is stable across
/// versions: adding a variant never changes how an existing one serializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum Event {
    Asserted { context: String, assertion: Assertion },
    Retracted { context: String, assertion_id: AssertionId, reason: RetractReason },
    AssertionEvicted { context: String, assertion_id: AssertionId },
    AssertionState { context: String, assertion_id: AssertionId, is_active: bool },
    RuleAdded { rule: Rule },
    RuleRemoved { rule_id: RuleId },
    ExternalInput { context: String, kif: String, source_id: String },
    RetractionRequest { context: String, target: RetractTarget, reason: String },
    ContradictionDetected { context: String, a: AssertionId, b: AssertionId },
    Query(QueryRequest),
    Answer(Answer),
    TaskUpdate { tool: String, status: TaskStatus, detail: Option<String> },
    SystemStatus { status: String, detail: Option<String> },
    DialogueRequest { dialogue_id: String, prompt: String },
    DialogueResponse { dialogue_id: String, response: Term },
}

impl Event {
    /// The context this event pertains to, if any (most events are scoped
    /// to one KB; bus-wide events like `SystemStatus` are not).
    pub fn context(&self) -> Option<&str> {
        match self {
            Event::Asserted { context, .. }
            | Event::Retracted { context, .. }
            | Event::AssertionEvicted { context, .. }
            | Event::AssertionState { context, .. }
            | Event::ExternalInput { context, .. }
            | Event::RetractionRequest { context, .. }
            | Event::ContradictionDetected { context, .. } => Some(context),
            _ => None,
        }
    }

    /// The `eventType` discriminant, matching the JSON envelope's tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::Asserted { .. } => "Asserted",
            Event::Retracted { .. } => "Retracted",
            Event::AssertionEvicted { .. } => "AssertionEvicted",
            Event::AssertionState { .. } => "AssertionState",
            Event::RuleAdded { .. } => "RuleAdded",
            Event::RuleRemoved { .. } => "RuleRemoved",
            Event::ExternalInput { .. } => "ExternalInput",
            Event::RetractionRequest { .. } => "RetractionRequest",
            Event::ContradictionDetected { .. } => "ContradictionDetected",
            Event::Query(_) => "Query",
            Event::Answer(_) => "Answer",
            Event::TaskUpdate { .. } => "TaskUpdate",
            Event::SystemStatus { .. } => "SystemStatus",
            Event::DialogueRequest { .. } => "DialogueRequest",
            Event::DialogueResponse { .. } => "DialogueResponse",
        }
    }
}
