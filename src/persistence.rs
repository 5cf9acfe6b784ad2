//! Persistence (§6.4): a JSON snapshot of notes, active assertions, and
//! rules, plus the configuration that produced them.
//!
//! `save` walks every active context via [`Cognition::drain_context`] rather
//! than the TMS justification graph — reload re-asserts each fact as an
//! input with its original priority and source (`restore_input`) and each
//! rule via `add_rule`, which rebuilds the derivation graph by replaying
//! the reasoners rather than deserializing it. This is weaker than bit-exact
//! restoration of justification ids, but it satisfies the load/save
//! round-trip the spec calls for: the same beliefs, at the same priorities,
//! reachable from the same sources. `schemaVersion` lets `load` refuse a
//! snapshot from an incompatible format instead of silently misreading it.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cognition::Cognition;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::kb::GLOBAL_CONTEXT;
use crate::notes::Note;
use crate::rule::Rule;
use crate::term::Term;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AssertionRecord {
    context: String,
    kif: String,
    priority: f64,
    source_id: String,
    source_note_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RuleRecord {
    form: String,
    priority: f64,
    source_note_id: Option<String>,
}

/// The on-disk snapshot shape (§6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: u32,
    pub configuration: EngineConfig,
    notes: Vec<Note>,
    assertions: Vec<AssertionRecord>,
    rules: Vec<RuleRecord>,
}

/// Capture every note, active assertion, and rule in `cognition` into a
/// [`Snapshot`] and write it as JSON to `path`.
pub fn save(cognition: &Arc<Cognition>, path: &Path) -> Result<(), EngineError> {
    let mut assertions = Vec::new();
    let mut contexts = cognition.active_contexts();
    if !contexts.iter().any(|c| c == GLOBAL_CONTEXT) {
        contexts.push(GLOBAL_CONTEXT.to_string());
    }
    for context in contexts {
        for assertion in cognition.drain_context(&context) {
            // Derived assertions are re-derived by the reasoners once their
            // parent inputs are replayed; only persist what has no
            // justifications of its own (§4.3's notion of an input).
            if !assertion.justification_ids.is_empty() {
                continue;
            }
            assertions.push(AssertionRecord {
                context: context.clone(),
                kif: assertion.kif.to_kif(),
                priority: assertion.priority,
                source_id: assertion.source_id.clone(),
                source_note_id: assertion.source_note_id.clone(),
            });
        }
    }

    let rules = cognition
        .all_rules()
        .into_iter()
        .map(|r| RuleRecord { form: r.form.to_kif(), priority: r.priority, source_note_id: r.source_note_id.clone() })
        .collect();

    let snapshot = Snapshot {
        schema_version: SCHEMA_VERSION,
        configuration: cognition.config().clone(),
        notes: cognition.note_list(),
        assertions,
        rules,
    };

    let json = serde_json::to_string_pretty(&snapshot).map_err(|e| EngineError::Persistence {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| EngineError::Persistence {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    }
    std::fs::write(path, json).map_err(|e| EngineError::Persistence { path: path.display().to_string(), message: e.to_string() })
}

/// Read `path` and replay it into `cognition`: notes first (so their
/// contexts are registered before assertions sourced from them), then
/// input facts, then rules (so forward/universal reasoners can fire
/// against the facts already present).
pub fn load(path: &Path, cognition: &Arc<Cognition>) -> Result<(), EngineError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Persistence { path: path.display().to_string(), message: e.to_string() })?;
    let snapshot: Snapshot = serde_json::from_str(&content)
        .map_err(|e| EngineError::Persistence { path: path.display().to_string(), message: e.to_string() })?;

    if snapshot.schema_version != SCHEMA_VERSION {
        return Err(EngineError::Persistence {
            path: path.display().to_string(),
            message: format!(
                "snapshot schema version {} is not supported (expected {})",
                snapshot.schema_version, SCHEMA_VERSION
            ),
        });
    }

    for note in snapshot.notes {
        cognition.note_restore(note);
    }

    for record in snapshot.assertions {
        let kif = Term::parse_kif(&record.kif)
            .map_err(|e| EngineError::Persistence { path: path.display().to_string(), message: e.to_string() })?;
        cognition
            .restore_input(&record.context, kif, record.priority, &record.source_id, record.source_note_id)
            .map_err(|e| EngineError::Persistence { path: path.display().to_string(), message: e.to_string() })?;
    }

    for record in snapshot.rules {
        let form = Term::parse_kif(&record.form)
            .map_err(|e| EngineError::Persistence { path: path.display().to_string(), message: e.to_string() })?;
        cognition
            .add_rule(form, record.priority, record.source_note_id)
            .map_err(|e| EngineError::Persistence { path: path.display().to_string(), message: e.to_string() })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;

    fn new_cognition() -> Arc<Cognition> {
        let bus = Arc::new(EventBus::start());
        Cognition::new(EngineConfig::default(), bus)
    }

    #[test]
    fn facts_and_rules_survive_a_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let cog = new_cognition();
        cog.add_rule(Term::parse_kif("(=> (instance ?x Dog) (mammal ?x))").unwrap(), 1.0, None).unwrap();
        cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(instance rex Dog)").unwrap(), "user:test", None).unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while std::time::Instant::now() < deadline && cog.context_len(GLOBAL_CONTEXT) < 2 {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        save(&cog, &path).unwrap();

        let bus2 = Arc::new(EventBus::start());
        let cog2 = Cognition::new(EngineConfig::default(), bus2);
        load(&path, &cog2).unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while std::time::Instant::now() < deadline && cog2.context_len(GLOBAL_CONTEXT) < 2 {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(cog2
            .find_candidates(GLOBAL_CONTEXT, &Term::parse_kif("(mammal rex)").unwrap())
            .iter()
            .any(|a| a.kif.to_kif() == "(mammal rex)"));
        assert_eq!(cog2.all_rules().len(), 1);
    }

    #[test]
    fn notes_survive_a_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let cog = new_cognition();
        let note = cog.note_create("Groceries");
        cog.note_set_text(&note.id, "(need milk)").unwrap();
        save(&cog, &path).unwrap();

        let bus2 = Arc::new(EventBus::start());
        let cog2 = Cognition::new(EngineConfig::default(), bus2);
        load(&path, &cog2).unwrap();

        let restored = cog2.note_get(&note.id).unwrap();
        assert_eq!(restored.title, "Groceries");
        assert_eq!(restored.text, "(need milk)");
    }

    #[test]
    fn load_rejects_an_incompatible_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, r#"{"schema_version":999,"configuration":{},"notes":[],"assertions":[],"rules":[]}"#).unwrap();

        let cog = new_cognition();
        assert!(load(&path, &cog).is_err());
    }
}
