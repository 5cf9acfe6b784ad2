//! Client abstraction for talking to a noetic engine (§6.3).
//!
//! [`NoeticClient`] wraps either a local `Arc<Cognition>` or an HTTP
//! connection to a `noetic-server` instance, so a CLI or embedding
//! application can issue the same five calls (`assertKif`, `query`,
//! `retract`, `runTool`, `dialogueResponse`) regardless of which process the
//! engine actually runs in. The local variant calls straight into
//! [`crate::cognition::Cognition`] and [`crate::query::query_sync`]; the
//! remote variant POSTs the matching JSON body to the endpoints §4.12
//! exposes.

use std::sync::Arc;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cognition::Cognition;
use crate::event::{Answer, Event, QueryType, RetractReason, RetractTarget};
use crate::ids::AssertionId;
use crate::query::query_sync;
use crate::term::Term;
use crate::tools::ToolTable;

#[derive(Debug, Error, Diagnostic)]
pub enum ClientError {
    #[error("malformed request: {message}")]
    #[diagnostic(code(noetic::client::request))]
    Request { message: String },

    #[error("server returned an error response: {message}")]
    #[diagnostic(code(noetic::client::response))]
    Response { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] crate::error::NoeticError),
}

/// Talks to a noetic engine, in-process or over HTTP.
pub enum NoeticClient {
    Local(Arc<Cognition>),
    Remote { base_url: String, http: ureq::Agent },
}

impl NoeticClient {
    pub fn local(cognition: Arc<Cognition>) -> Self {
        NoeticClient::Local(cognition)
    }

    pub fn remote(base_url: impl Into<String>) -> Self {
        NoeticClient::Remote { base_url: base_url.into(), http: ureq::Agent::new() }
    }

    /// §6.3 `assertKif`: parse and commit a KIF term as an input fact.
    pub fn assert_kif(&self, kb: &str, kif: &str, source_note_id: Option<String>) -> Result<AssertionId, ClientError> {
        match self {
            NoeticClient::Local(cog) => {
                let term = Term::parse_kif(kif).map_err(|e| ClientError::Request { message: e.to_string() })?;
                cog.add_input(kb, term, "client:assertKif", source_note_id).map_err(|e| e.into())
            }
            NoeticClient::Remote { base_url, http } => {
                let body = serde_json::json!({ "kb": kb, "kif": kif, "sourceNoteId": source_note_id });
                let resp: AssertKifResponse = post(http, base_url, "/kif", body)?;
                Ok(resp.assertion_id)
            }
        }
    }

    /// §6.3 `query`: block on a proof result (AskBindings/AskTrueFalse/AchieveGoal).
    pub fn query(&self, query_type: QueryType, pattern: &str, target_kb_id: Option<String>) -> Result<Answer, ClientError> {
        match self {
            NoeticClient::Local(cog) => {
                let term = Term::parse_kif(pattern).map_err(|e| ClientError::Request { message: e.to_string() })?;
                Ok(query_sync(cog, query_type, term, target_kb_id))
            }
            NoeticClient::Remote { base_url, http } => {
                let body = serde_json::json!({ "queryType": query_type, "pattern": pattern, "targetKbId": target_kb_id });
                post(http, base_url, "/query", body)
            }
        }
    }

    /// §6.3 `retract`: drop an assertion (and its cascade) by id, kif text, or note.
    pub fn retract(&self, kb: &str, target: RetractTarget) -> Result<(), ClientError> {
        match self {
            NoeticClient::Local(cog) => {
                cog.retract(kb, target, RetractReason::Explicit);
                Ok(())
            }
            NoeticClient::Remote { base_url, http } => {
                let body = serde_json::json!({ "kb": kb, "target": target });
                let _: RetractResponse = post(http, base_url, "/retract", body)?;
                Ok(())
            }
        }
    }

    /// §6.3 `runTool`: invoke a registered tool directly with explicit
    /// parameters, bypassing trigger-pattern matching.
    pub fn run_tool(&self, kb: &str, tool_name: &str, parameters: Vec<(String, String)>) -> Result<String, ClientError> {
        match self {
            NoeticClient::Local(cog) => {
                let bindings: Vec<(String, Term)> = parameters
                    .into_iter()
                    .map(|(k, v)| (k, Term::parse_kif(&v).unwrap_or_else(|_| Term::atom(v))))
                    .collect();
                ToolTable::with_builtins()
                    .invoke(cog, kb, tool_name, &bindings)
                    .map_err(|message| ClientError::Response { message })
            }
            NoeticClient::Remote { base_url, http } => {
                let body = serde_json::json!({ "kb": kb, "parameters": parameters });
                let resp: RunToolResponse = post(http, base_url, &format!("/tools/{tool_name}"), body)?;
                Ok(resp.result)
            }
        }
    }

    /// §6.3 `dialogueResponse`: resume a suspended backward-chaining proof
    /// that hit `(ask-user ...)`.
    pub fn dialogue_response(&self, dialogue_id: &str, response: &str) -> Result<(), ClientError> {
        match self {
            NoeticClient::Local(cog) => {
                let term = Term::parse_kif(response).map_err(|e| ClientError::Request { message: e.to_string() })?;
                cog.bus().publish(Event::DialogueResponse { dialogue_id: dialogue_id.to_string(), response: term });
                Ok(())
            }
            NoeticClient::Remote { base_url, http } => {
                let body = serde_json::json!({ "response": response });
                let _: RetractResponse = post(http, base_url, &format!("/dialogue/{dialogue_id}"), body)?;
                Ok(())
            }
        }
    }
}

#[derive(Deserialize)]
struct AssertKifResponse {
    assertion_id: AssertionId,
}

#[derive(Deserialize)]
struct RetractResponse {}

#[derive(Deserialize)]
struct RunToolResponse {
    result: String,
}

fn post<T: for<'de> Deserialize<'de>>(
    http: &ureq::Agent,
    base_url: &str,
    path: &str,
    body: serde_json::Value,
) -> Result<T, ClientError> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), path);
    let resp = http.post(&url).send_json(body).map_err(|e| ClientError::Response { message: e.to_string() })?;
    resp.into_json().map_err(|e| ClientError::Response { message: e.to_string() })
}

// ---------------------------------------------------------------------------
// Server discovery (§4.12): a pid file under the runtime dir records which
// process, port, and bind address to reach.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub pid: u32,
    pub port: u16,
    pub bind: String,
}

impl ServerInfo {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.bind, self.port)
    }
}

pub fn write_pid_file(path: &std::path::Path, info: &ServerInfo) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string(info).unwrap_or_default())
}

pub fn remove_pid_file(path: &std::path::Path) {
    let _ = std::fs::remove_file(path);
}

/// Read a pid file and confirm the server answers a health check before
/// returning it; a stale file (process gone, port closed) is cleaned up and
/// treated as "no server running" rather than surfaced as an error.
pub fn discover_server(path: &std::path::Path) -> Option<ServerInfo> {
    let content = std::fs::read_to_string(path).ok()?;
    let info: ServerInfo = serde_json::from_str(&content).ok()?;
    let agent = ureq::AgentBuilder::new().timeout(std::time::Duration::from_millis(300)).build();
    match agent.get(&format!("{}/health", info.base_url())).call() {
        Ok(_) => Some(info),
        Err(_) => {
            remove_pid_file(path);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::config::EngineConfig;
    use crate::kb::GLOBAL_CONTEXT;

    fn new_client() -> NoeticClient {
        let bus = Arc::new(EventBus::start());
        let cog = Cognition::new(EngineConfig::default(), bus);
        NoeticClient::local(cog)
    }

    #[test]
    fn local_assert_and_query_round_trip() {
        let client = new_client();
        client.assert_kif(GLOBAL_CONTEXT, "(instance rex Dog)", None).unwrap();
        let answer = client.query(QueryType::AskTrueFalse, "(instance rex Dog)", None).unwrap();
        assert_eq!(answer.status, crate::event::QueryStatus::Success);
    }

    #[test]
    fn local_retract_removes_the_fact() {
        let client = new_client();
        let id = client.assert_kif(GLOBAL_CONTEXT, "(p a)", None).unwrap();
        client.retract(GLOBAL_CONTEXT, RetractTarget::ById(id)).unwrap();
        let answer = client.query(QueryType::AskTrueFalse, "(p a)", None).unwrap();
        assert_eq!(answer.status, crate::event::QueryStatus::Failure);
    }

    #[test]
    fn local_run_tool_invokes_the_builtin_table() {
        let client = new_client();
        let result = client
            .run_tool(GLOBAL_CONTEXT, "assert_kif", vec![("kif".to_string(), "(instance rex Dog)".to_string())])
            .unwrap();
        assert!(result.starts_with("asserted as"));
    }

    #[test]
    fn discover_server_returns_none_without_a_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noetic-server.pid");
        assert!(discover_server(&path).is_none());
    }
}
