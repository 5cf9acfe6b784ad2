//! Tool Invocation (§4.11, secondary): pattern-triggered dispatch to named
//! tool handlers, reported on the bus as `TaskUpdate` events.
//!
//! [`TriggerRegistry`] is itself a bus subscriber, wired the same way the
//! four reasoner strategies are (`on_event` per [`crate::event::Event`]):
//! every `Asserted` fact is unified against each registered trigger pattern;
//! a match records a [`ToolInvocation`] and runs the handler from a small
//! built-in [`ToolTable`]. The core engine only matches triggers — a tool's
//! own business logic is a collaborator surface (§6.3 `runTool`), and the
//! handful here exist to exercise the interface end to end rather than to
//! imitate the teacher's much larger skill catalog.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::cognition::Cognition;
use crate::event::{Event, TaskStatus};
use crate::ids::AssertionId;
use crate::term::Term;
use crate::unify::unify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolStatus {
    Pending,
    Completed,
    Failed,
}

/// A recorded run of a tool, triggered by a matching assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub tool_name: String,
    pub parameters: Vec<(String, Term)>,
    pub triggering_assertion_id: AssertionId,
    pub status: ToolStatus,
    pub result: Option<String>,
}

struct Trigger {
    pattern: Term,
    tool_name: String,
}

/// Unifies incoming assertions against registered trigger patterns and
/// dispatches to [`ToolTable`] on a match.
pub struct TriggerRegistry {
    triggers: Mutex<Vec<Trigger>>,
    invocations: Mutex<Vec<ToolInvocation>>,
    counter: AtomicU64,
    table: ToolTable,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self {
            triggers: Mutex::new(Vec::new()),
            invocations: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
            table: ToolTable::with_builtins(),
        }
    }

    pub fn register(&self, pattern: Term, tool_name: impl Into<String>) {
        self.triggers.lock().unwrap().push(Trigger { pattern, tool_name: tool_name.into() });
    }

    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn on_event(&self, cog: &Arc<Cognition>, event: &Event) {
        let Event::Asserted { context, assertion } = event else { return };
        let triggers = self.triggers.lock().unwrap();
        for trigger in triggers.iter() {
            let Some(theta) = unify(&trigger.pattern, &assertion.kif) else { continue };
            let vars = trigger.pattern.free_vars();
            let bindings: Vec<(String, Term)> =
                vars.iter().filter_map(|v| theta.get(v).map(|t| (v.clone(), t.clone()))).collect();

            let id = format!("tool-{}", self.counter.fetch_add(1, Ordering::Relaxed));
            cog.bus().publish(Event::TaskUpdate { tool: trigger.tool_name.clone(), status: TaskStatus::Started, detail: None });

            let outcome = self.table.invoke(cog, context, &trigger.tool_name, &bindings);
            let (status, detail) = match &outcome {
                Ok(result) => (ToolStatus::Completed, result.clone()),
                Err(message) => (ToolStatus::Failed, message.clone()),
            };
            self.invocations.lock().unwrap().push(ToolInvocation {
                id,
                tool_name: trigger.tool_name.clone(),
                parameters: bindings,
                triggering_assertion_id: assertion.id,
                status,
                result: outcome.ok(),
            });
            cog.bus().publish(Event::TaskUpdate {
                tool: trigger.tool_name.clone(),
                status: if status == ToolStatus::Completed { TaskStatus::Completed } else { TaskStatus::Error },
                detail: Some(detail),
            });
        }
    }
}

impl Default for TriggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A handful of illustrative built-in tools, resolved by name.
pub struct ToolTable;

impl ToolTable {
    pub fn with_builtins() -> Self {
        Self
    }

    /// Run `tool_name` with `bindings` — either captured from a trigger
    /// match, or supplied directly by a client's `runTool` request (§6.3).
    /// Returns a human-readable result, or an error message.
    pub fn invoke(&self, cog: &Arc<Cognition>, context: &str, tool_name: &str, bindings: &[(String, Term)]) -> Result<String, String> {
        match tool_name {
            "assert_kif" => {
                let Some((_, term)) = bindings.iter().find(|(k, _)| k == "kif") else {
                    return Err("assert_kif requires a ?kif binding".to_string());
                };
                cog.add_input(context, term.clone(), "tool:assert_kif", None)
                    .map(|id| format!("asserted as {id}"))
                    .map_err(|e| e.to_string())
            }
            "ask_user" => {
                let prompt = bindings
                    .iter()
                    .find(|(k, _)| k == "prompt")
                    .map(|(_, t)| t.to_kif())
                    .unwrap_or_else(|| "(unspecified)".to_string());
                cog.bus().publish(Event::DialogueRequest { dialogue_id: format!("tool-dlg-{}", context), prompt: prompt.clone() });
                Ok(format!("dialogue requested: {prompt}"))
            }
            "noteSummary" => {
                let Some((_, note_id)) = bindings.iter().find(|(k, _)| k == "noteId") else {
                    return Err("noteSummary requires a ?noteId binding".to_string());
                };
                let id = note_id.to_kif();
                match cog.note_get(id.trim_matches('"')) {
                    Some(note) => Ok(format!("{}: {} active assertions", note.title, cog.context_len(&note.id))),
                    None => Err(format!("no such note: {id}")),
                }
            }
            other => Err(format!("unknown tool: {other}")),
        }
    }
}
