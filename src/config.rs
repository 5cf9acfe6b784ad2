//! Engine configuration (§6.5), loadable from TOML with environment overrides.

use std::path::Path;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tms::ContradictionPolicy;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file: {path}")]
    #[diagnostic(code(noetic::config::read), help("Check that the file exists and is readable."))]
    Read { path: String, #[source] source: std::io::Error },

    #[error("failed to parse config file: {path}")]
    #[diagnostic(code(noetic::config::parse), help("Check the TOML syntax against the documented §6.5 options."))]
    Parse { path: String, message: String },

    #[error("failed to write config file: {path}")]
    #[diagnostic(code(noetic::config::write))]
    Write { path: String, #[source] source: std::io::Error },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

fn default_global_kb_capacity() -> usize {
    64 * 1024
}
fn default_note_kb_capacity() -> usize {
    4096
}
fn default_reasoning_depth_limit() -> u32 {
    4
}
fn default_broadcast_input_assertions() -> bool {
    false
}
fn default_contradiction_policy() -> ContradictionPolicy {
    ContradictionPolicy::PreferOld
}
fn default_query_timeout_ms() -> u64 {
    60_000
}
fn default_pin_inputs() -> bool {
    false
}
fn default_dialogue_timeout_ms() -> u64 {
    30_000
}
fn default_llm_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_llm_model() -> String {
    "llama3".to_string()
}

/// Recognized engine options (§6.5). Every field has a documented default so
/// a bare `EngineConfig::default()` matches the spec's defaults exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default = "default_global_kb_capacity")]
    pub global_kb_capacity: usize,

    /// Capacity for lazily-created per-note contexts (smaller than global;
    /// not itself a §6.5 option but needed to size §3.4's "smaller per-note
    /// contexts allowed").
    #[serde(default = "default_note_kb_capacity")]
    pub note_kb_capacity: usize,

    #[serde(default = "default_reasoning_depth_limit")]
    pub reasoning_depth_limit: u32,

    #[serde(default = "default_broadcast_input_assertions")]
    pub broadcast_input_assertions: bool,

    #[serde(default = "default_contradiction_policy")]
    pub contradiction_policy: ContradictionPolicy,

    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Whether input facts (empty `justificationIds`) are exempt from
    /// eviction regardless of priority. Off by default: capacity eviction
    /// is governed purely by `(priority, -timestamp)` (§4.3, §8 scenario
    /// S5), with this flag available as an opt-in stronger guarantee for
    /// embedders who want manually-asserted facts to never be silently
    /// dropped.
    #[serde(default = "default_pin_inputs")]
    pub pin_inputs: bool,

    /// Whether to attach an [`crate::llm::HttpLlmClient`] at startup (§4.10).
    /// Off by default — the engine never depends on an LLM being reachable.
    #[serde(default)]
    pub llm_enabled: bool,

    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// How long a suspended `(ask-user ...)` proof waits for a human
    /// `DialogueResponse` before asking the LLM instead (§4.10).
    #[serde(default = "default_dialogue_timeout_ms")]
    pub dialogue_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            global_kb_capacity: default_global_kb_capacity(),
            note_kb_capacity: default_note_kb_capacity(),
            reasoning_depth_limit: default_reasoning_depth_limit(),
            broadcast_input_assertions: default_broadcast_input_assertions(),
            contradiction_policy: default_contradiction_policy(),
            query_timeout_ms: default_query_timeout_ms(),
            pin_inputs: default_pin_inputs(),
            llm_enabled: false,
            llm_base_url: default_llm_base_url(),
            llm_model: default_llm_model(),
            dialogue_timeout_ms: default_dialogue_timeout_ms(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}
