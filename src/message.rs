//! Client Message Protocol wire types (§6.3).
//!
//! A [`ClientRequest`] is the decoded body of one client call — whether it
//! arrived over the `noetic-server` WebSocket/HTTP transport or was built
//! in-process by an embedding application. [`ClientResponse`] is what comes
//! back. Both are tagged by `type` so a JSON body round-trips exactly, the
//! same discipline [`crate::event::Event`] uses for the bus envelope.

use serde::{Deserialize, Serialize};

use crate::event::{Answer, QueryType, RetractTarget};
use crate::ids::AssertionId;

/// One inbound call (§6.3: `assertKif`, `query`, `retract`, `runTool`,
/// `dialogueResponse`). `id` is the caller's correlation id, echoed back on
/// the matching [`ClientResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientRequest {
    AssertKif {
        id: String,
        #[serde(default)]
        kb: Option<String>,
        kif: String,
        #[serde(default)]
        source_note_id: Option<String>,
    },
    Query {
        id: String,
        query_type: QueryType,
        pattern: String,
        #[serde(default)]
        target_kb_id: Option<String>,
    },
    Retract {
        id: String,
        #[serde(default)]
        kb: Option<String>,
        target: RetractTarget,
    },
    RunTool {
        id: String,
        tool_name: String,
        #[serde(default)]
        kb: Option<String>,
        parameters: Vec<(String, String)>,
    },
    DialogueResponse {
        id: String,
        dialogue_id: String,
        response: String,
    },
}

impl ClientRequest {
    pub fn id(&self) -> &str {
        match self {
            ClientRequest::AssertKif { id, .. }
            | ClientRequest::Query { id, .. }
            | ClientRequest::Retract { id, .. }
            | ClientRequest::RunTool { id, .. }
            | ClientRequest::DialogueResponse { id, .. } => id,
        }
    }
}

/// Reply to one [`ClientRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientResponse {
    Asserted { id: String, assertion_id: AssertionId },
    Answered { id: String, answer: Answer },
    Retracted { id: String },
    ToolRan { id: String, result: String },
    DialogueAcknowledged { id: String },
    Error { id: String, message: String },
}

impl ClientResponse {
    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        ClientResponse::Error { id: id.into(), message: message.into() }
    }
}
