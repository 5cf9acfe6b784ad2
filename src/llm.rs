//! LLM Call-out (§4.10, secondary): a thin, swappable client used only at
//! two call sites — best-effort free text → KIF translation, and answering
//! `(ask-user prompt)` subgoals when no human client is attached.
//!
//! The production implementation speaks to an Ollama-style completion
//! endpoint over blocking HTTP, mirroring the teacher's own client (same
//! crate, same "one POST, parse the JSON body" shape). A failure here
//! degrades to [`LlmError::Unavailable`] and never reaches into the KB or
//! TMS — per §7's propagation policy, a collaborator's failure deactivates
//! nothing.

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    #[error("LLM backend unavailable: {reason}")]
    #[diagnostic(
        code(noetic::llm::unavailable),
        help("Check the configured base URL and model name, or fall back to manual KIF entry.")
    )]
    Unavailable { reason: String },

    #[error("LLM returned a response that could not be parsed: {reason}")]
    #[diagnostic(code(noetic::llm::bad_response))]
    BadResponse { reason: String },
}

/// Abstraction over a completion backend, so tests never need a live server.
pub trait LlmClient: Send + Sync {
    /// Ask the model to translate free natural-language text into a single
    /// KIF assertion. The caller still runs it through [`crate::term::Term::parse_kif`]
    /// and treats a parse failure the same as any other malformed input.
    fn translate_to_kif(&self, prompt: &str) -> Result<String, LlmError>;

    /// Answer an `(ask-user "...")` dialogue prompt on a human's behalf.
    fn answer_prompt(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Blocking HTTP client against an Ollama-compatible `/api/generate` endpoint.
pub struct HttpLlmClient {
    base_url: String,
    model: String,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl HttpLlmClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), model: model.into(), agent: ureq::Agent::new() }
    }

    fn generate(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "system": system,
            "prompt": prompt,
            "stream": false,
        });
        let resp = self
            .agent
            .post(&url)
            .send_json(body)
            .map_err(|e| LlmError::Unavailable { reason: e.to_string() })?;
        let parsed: GenerateResponse = resp
            .into_json()
            .map_err(|e| LlmError::BadResponse { reason: e.to_string() })?;
        Ok(parsed.response.trim().to_string())
    }
}

impl LlmClient for HttpLlmClient {
    fn translate_to_kif(&self, prompt: &str) -> Result<String, LlmError> {
        self.generate(
            "Translate the user's statement into a single KIF s-expression. Reply with only the expression.",
            prompt,
        )
    }

    fn answer_prompt(&self, prompt: &str) -> Result<String, LlmError> {
        self.generate("Answer the question concisely, as a single KIF atom or term.", prompt)
    }
}

/// Canned-response test double. Matches prompts by substring, falling back
/// to a default answer when nothing matches.
pub struct ScriptedLlmClient {
    responses: Vec<(String, String)>,
    default: String,
}

impl ScriptedLlmClient {
    pub fn new(default: impl Into<String>) -> Self {
        Self { responses: Vec::new(), default: default.into() }
    }

    pub fn with_response(mut self, matches: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.push((matches.into(), response.into()));
        self
    }

    fn lookup(&self, prompt: &str) -> String {
        self.responses
            .iter()
            .find(|(m, _)| prompt.contains(m.as_str()))
            .map(|(_, r)| r.clone())
            .unwrap_or_else(|| self.default.clone())
    }
}

impl LlmClient for ScriptedLlmClient {
    fn translate_to_kif(&self, prompt: &str) -> Result<String, LlmError> {
        Ok(self.lookup(prompt))
    }

    fn answer_prompt(&self, prompt: &str) -> Result<String, LlmError> {
        Ok(self.lookup(prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_client_matches_by_substring() {
        let client = ScriptedLlmClient::new("(unknown)").with_response("favorite color", "Blue");
        assert_eq!(client.answer_prompt("what is your favorite color?").unwrap(), "Blue");
        assert_eq!(client.translate_to_kif("random text").unwrap(), "(unknown)");
    }
}
