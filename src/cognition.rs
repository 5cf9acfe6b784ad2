//! The Cognition facade (§4.8): owns every context's knowledge base, the
//! shared rule store and TMS, and the event bus every reasoner listens on.
//!
//! All mutation happens on the bus's single dispatch thread (§5) — the
//! `Mutex`/`DashMap` fields here exist for `Send + Sync`, not for genuine
//! contention, since only that one thread ever calls a method that mutates
//! state. Where both a `Kb` and the `Tms` are touched in the same operation,
//! lock order is always `Kb` before `Tms`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::assertion::Assertion;
use crate::bus::EventBus;
use crate::config::EngineConfig;
use crate::error::{KbError, NoeticError, NoteError, RuleError};
use crate::event::{Event, RetractReason, RetractTarget};
use crate::ids::{AssertionId, IdAllocator, RuleId};
use crate::kb::{CommitResult, Kb, GLOBAL_CONTEXT};
use crate::llm::LlmClient;
use crate::notes::Note;
use crate::reason::backward::BackwardChainer;
use crate::reason::forward::ForwardChainer;
use crate::reason::rewrite::RewriteReasoner;
use crate::reason::universal::UniversalInstantiator;
use crate::rule::{Rule, RuleStore};
use crate::term::Term;
use crate::tms::{Justification, Tms};
use crate::tools::{ToolInvocation, TriggerRegistry};

/// Process-wide cognition state: contexts, rules, TMS, and the bus wiring
/// the four reasoner strategies listen on (§4.8).
pub struct Cognition {
    contexts: DashMap<String, Mutex<Kb>>,
    rules: Mutex<RuleStore>,
    tms: Mutex<Tms>,
    /// Cross-context activity snapshot, kept in lockstep with each `Kb`'s own
    /// `is_active` flag by every method here that flips it. Lets
    /// `has_active_dependents` checks avoid reaching across context locks
    /// when a justification spans more than one context.
    active_index: DashMap<AssertionId, bool>,
    id_alloc: IdAllocator<AssertionId>,
    clock: AtomicU64,
    config: EngineConfig,
    bus: Arc<EventBus>,
    notes: DashMap<String, Note>,
    note_counter: AtomicU64,
    triggers: TriggerRegistry,
    /// §4.10: set via [`Self::set_llm_client`]. `None` until an embedder
    /// attaches one — the engine never requires an LLM to function.
    llm: Mutex<Option<(Arc<dyn LlmClient>, u64)>>,
}

impl Cognition {
    /// Build the facade and wire the four reasoner strategies onto `bus`.
    /// Returned as an `Arc` since subscriber closures must outlive this call.
    pub fn new(config: EngineConfig, bus: Arc<EventBus>) -> Arc<Self> {
        let this = Arc::new(Self {
            contexts: DashMap::new(),
            rules: Mutex::new(RuleStore::new()),
            tms: Mutex::new(Tms::new()),
            active_index: DashMap::new(),
            id_alloc: IdAllocator::new(),
            clock: AtomicU64::new(0),
            config,
            bus,
            notes: DashMap::new(),
            note_counter: AtomicU64::new(0),
            triggers: TriggerRegistry::new(),
            llm: Mutex::new(None),
        });
        this.wire();
        this
    }

    fn wire(self: &Arc<Self>) {
        let forward = ForwardChainer::new();
        let rewrite = RewriteReasoner::new();
        let universal = UniversalInstantiator::new();
        let backward = BackwardChainer::new();

        let cog = Arc::clone(self);
        self.bus.subscribe(Box::new(move |event| forward.on_event(&cog, event)));
        let cog = Arc::clone(self);
        self.bus.subscribe(Box::new(move |event| rewrite.on_event(&cog, event)));
        let cog = Arc::clone(self);
        self.bus.subscribe(Box::new(move |event| universal.on_event(&cog, event)));
        let cog = Arc::clone(self);
        self.bus.subscribe(Box::new(move |event| backward.on_event(&cog, event)));
        let cog = Arc::clone(self);
        self.bus.subscribe(Box::new(move |event| cog.on_retraction_request(event)));
        let cog = Arc::clone(self);
        self.bus.subscribe(Box::new(move |event| cog.triggers.on_event(&cog, event)));
    }

    /// Register a trigger pattern (§4.11): any future `Asserted` fact whose
    /// `kif` unifies with `pattern` runs `tool_name` via the built-in
    /// [`crate::tools::ToolTable`].
    pub fn register_trigger(&self, pattern: Term, tool_name: impl Into<String>) {
        self.triggers.register(pattern, tool_name);
    }

    /// Every tool run recorded so far, whether trigger-fired or invoked
    /// directly through [`crate::client::NoeticClient::run_tool`].
    pub fn tool_invocations(&self) -> Vec<ToolInvocation> {
        self.triggers.invocations()
    }

    /// Attach an LLM collaborator (§4.10). `dialogue_timeout_ms` bounds how
    /// long a suspended `(ask-user ...)` proof waits for a human
    /// `DialogueResponse` before the backward chainer asks the LLM instead.
    pub fn set_llm_client(&self, client: Arc<dyn LlmClient>, dialogue_timeout_ms: u64) {
        *self.llm.lock().unwrap() = Some((client, dialogue_timeout_ms));
    }

    pub fn llm_client(&self) -> Option<(Arc<dyn LlmClient>, u64)> {
        self.llm.lock().unwrap().clone()
    }

    /// §4.10 call site (a): best-effort translation of free natural-language
    /// text into a KIF assertion, committed as an input fact sourced
    /// `"llm:translate"`. Requires [`Self::set_llm_client`] to have been
    /// called first.
    pub fn assert_natural_language(&self, context: &str, text: &str, source_note_id: Option<String>) -> Result<AssertionId, NoeticError> {
        let Some((client, _)) = self.llm_client() else {
            return Err(NoeticError::Llm(crate::llm::LlmError::Unavailable { reason: "no LLM client attached".into() }));
        };
        let kif_text = client.translate_to_kif(text)?;
        let kif = Term::parse_kif(&kif_text)?;
        self.add_input(context, kif, "llm:translate", source_note_id).map_err(Into::into)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn next_tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn capacity_for(&self, context: &str) -> usize {
        if context == GLOBAL_CONTEXT {
            self.config.global_kb_capacity
        } else {
            self.config.note_kb_capacity
        }
    }

    fn with_kb<R>(&self, context: &str, f: impl FnOnce(&mut Kb) -> R) -> R {
        let capacity = self.capacity_for(context);
        let entry = self
            .contexts
            .entry(context.to_string())
            .or_insert_with(|| Mutex::new(Kb::new(context.to_string(), capacity)));
        let mut kb = entry.lock().unwrap();
        f(&mut kb)
    }

    pub fn active_contexts(&self) -> Vec<String> {
        self.contexts.iter().map(|e| e.key().clone()).collect()
    }

    pub fn context_len(&self, context: &str) -> usize {
        self.with_kb(context, |kb| kb.len())
    }

    pub fn get_assertion(&self, context: &str, id: AssertionId) -> Option<Assertion> {
        self.with_kb(context, |kb| kb.get(id).cloned())
    }

    pub fn is_active(&self, id: AssertionId) -> bool {
        self.active_index.get(&id).map(|v| *v).unwrap_or(false)
    }

    /// Active assertions in `context` whose `kif` could unify with `pattern`,
    /// plus the same from `kb://global` when `context` is itself a note (§3.4:
    /// global assertions are visible from every note context).
    pub fn find_candidates(&self, context: &str, pattern: &Term) -> Vec<Assertion> {
        let mut out = self.with_kb(context, |kb| {
            kb.find_candidates(pattern).into_iter().cloned().collect::<Vec<_>>()
        });
        if context != GLOBAL_CONTEXT {
            out.extend(self.with_kb(GLOBAL_CONTEXT, |kb| {
                kb.find_candidates(pattern).into_iter().cloned().collect::<Vec<_>>()
            }));
        }
        out
    }

    /// Every active assertion in `context`, priority-ordered (§6.4 snapshot
    /// source: persistence walks this per active context, not the TMS graph).
    pub fn drain_context(&self, context: &str) -> Vec<Assertion> {
        self.with_kb(context, |kb| kb.drain().into_iter().cloned().collect())
    }

    pub fn rules_matching_head(&self, op: &str) -> Vec<Rule> {
        self.rules.lock().unwrap().rules_matching_head(op).into_iter().cloned().collect()
    }

    pub fn rewrite_rules(&self) -> Vec<Rule> {
        self.rules.lock().unwrap().rewrite_rules().cloned().collect()
    }

    pub fn all_rules(&self) -> Vec<Rule> {
        self.rules.lock().unwrap().iter().cloned().collect()
    }

    pub fn add_rule(&self, form: Term, priority: f64, source_note_id: Option<String>) -> Result<Vec<RuleId>, RuleError> {
        let ids = self.rules.lock().unwrap().add_rule(form, priority, source_note_id)?;
        for id in &ids {
            if let Some(rule) = self.rules.lock().unwrap().get(*id).cloned() {
                self.bus.publish(Event::RuleAdded { rule });
            }
        }
        Ok(ids)
    }

    pub fn remove_rule(&self, id: RuleId) -> Result<(), RuleError> {
        self.rules.lock().unwrap().remove_rule(id)?;
        self.bus.publish(Event::RuleRemoved { rule_id: id });
        Ok(())
    }

    /// Assert an input fact (§4.8 `addInput`): mints an id, commits it, and
    /// publishes `Asserted`. Priority defaults to 1.0 (§3.2).
    pub fn add_input(
        &self,
        context: &str,
        kif: Term,
        source_id: &str,
        source_note_id: Option<String>,
    ) -> Result<AssertionId, KbError> {
        self.restore_input(context, kif, 1.0, source_id, source_note_id)
    }

    /// As [`Self::add_input`], but with an explicit priority (§6.4
    /// persistence reload: restored facts keep the priority they were
    /// snapshotted with rather than resetting to the input default).
    pub fn restore_input(
        &self,
        context: &str,
        kif: Term,
        priority: f64,
        source_id: &str,
        source_note_id: Option<String>,
    ) -> Result<AssertionId, KbError> {
        let id = self.id_alloc.next_id();
        let ts = self.next_tick();
        let assertion = Assertion::input(id, kif, priority, ts, source_id, source_note_id, context);
        self.commit_and_record(context, assertion, Justification::new([])).ok_or(KbError::KbFull {
            context: context.to_string(),
            capacity: self.capacity_for(context),
        })
    }

    /// Fire a derivation (§4.6): build a derived [`Assertion`] from `parents`,
    /// enforce the depth limit, and commit+record it. Returns `None` when the
    /// derivation is dropped — beyond the depth limit, or the context is full
    /// and nothing is evictable.
    pub fn fire_derivation(
        &self,
        context: &str,
        consequent: Term,
        source_id: &str,
        parents: &[Assertion],
    ) -> Option<AssertionId> {
        let depth = parents.iter().map(|p| p.derivation_depth).max().map(|d| d + 1).unwrap_or(0);
        if depth > self.config.reasoning_depth_limit {
            debug!(context, depth, "derivation dropped: beyond reasoning_depth_limit");
            return None;
        }
        let id = self.id_alloc.next_id();
        let ts = self.next_tick();
        let parent_refs: Vec<&Assertion> = parents.iter().collect();
        let assertion = Assertion::derived(id, consequent, ts, source_id, None, context, &parent_refs);
        let justification = Justification::new(parents.iter().map(|p| p.id));
        self.commit_and_record(context, assertion, justification)
    }

    /// Commit `assertion` into `context`'s KB and record `justification` in
    /// the TMS, handling dedup-by-kif, capacity eviction, and contradiction
    /// checking. Returns the id actually carrying the assertion's meaning
    /// (which is the pre-existing id when this was a duplicate).
    fn commit_and_record(&self, context: &str, assertion: Assertion, justification: Justification) -> Option<AssertionId> {
        let kif = assertion.kif.clone();

        // Dedup (§4.3): an identical active kif already exists. Enlarge its
        // justification set if this is a new way to derive it; never insert
        // a second assertion record for the same canonical kif.
        if let Some(existing_id) = self.with_kb(context, |kb| kb.contains_active_kif(&kif)) {
            let mut tms = self.tms.lock().unwrap();
            let already = tms.justifiers_of(existing_id).iter().any(|j| j.parents == justification.parents);
            if !already {
                tms.record(existing_id, justification);
            }
            return Some(existing_id);
        }

        let (result, evicted) = self.with_kb(context, |kb| {
            let result = kb.commit(assertion, |candidate| self.is_evictable(candidate));
            (result, kb.take_last_evicted())
        });

        if let Some(victim) = evicted {
            self.active_index.insert(victim, false);
            self.bus.publish(Event::AssertionEvicted { context: context.to_string(), assertion_id: victim });
            self.bus
                .publish(Event::AssertionState { context: context.to_string(), assertion_id: victim, is_active: false });
        }

        let id = match result {
            Ok(CommitResult::Inserted(id)) => id,
            Ok(CommitResult::Promoted(id)) => id,
            Err(_) => {
                warn!(context, "commit dropped: context full, nothing evictable");
                self.bus.publish(Event::SystemStatus {
                    status: "kb_full".into(),
                    detail: Some(format!("context {context} is at capacity")),
                });
                return None;
            }
        };

        self.active_index.insert(id, true);
        self.tms.lock().unwrap().record(id, justification);

        let partner = self.with_kb(context, |kb| find_negation_partner(kb, &kif));
        if let Some(other) = partner {
            let policy = self.config.contradiction_policy;
            let mut deactivated = Vec::new();
            self.tms
                .lock()
                .unwrap()
                .check_contradiction(id, Some(other), policy, |victim| deactivated.push(victim));
            for victim in &deactivated {
                self.with_kb(context, |kb| kb.deactivate(*victim));
                self.active_index.insert(*victim, false);
            }
            if !deactivated.is_empty() {
                self.bus.publish(Event::ContradictionDetected { context: context.to_string(), a: id, b: other });
                for victim in deactivated {
                    self.bus
                        .publish(Event::AssertionState { context: context.to_string(), assertion_id: victim, is_active: false });
                }
            }
        }

        if self.is_active(id) {
            if let Some(published) = self.with_kb(context, |kb| kb.get(id).cloned()) {
                self.bus.publish(Event::Asserted { context: context.to_string(), assertion: published });
            }
        }

        Some(id)
    }

    /// A candidate may be evicted unless `pinInputs` protects it as an input
    /// (off by default, §6.5) or some still-active assertion depends on it.
    fn is_evictable(&self, candidate: AssertionId) -> bool {
        let tms = self.tms.lock().unwrap();
        if self.config.pin_inputs && tms.justifiers_of(candidate).iter().any(|j| j.is_input()) {
            return false;
        }
        !tms.has_active_dependents(candidate, |x| self.is_active(x))
    }

    /// Retract per §4.4/§6.3: resolve `target` to one or more root ids,
    /// cascade each through the TMS, and publish `Retracted` for every id the
    /// cascade deactivates.
    pub fn retract(&self, context: &str, target: RetractTarget, reason: RetractReason) {
        for root in self.resolve_retract_targets(context, &target) {
            let active_index = &self.active_index;
            let result = self.tms.lock().unwrap().retract(
                root,
                |x| active_index.get(&x).map(|v| *v).unwrap_or(false),
                |x| {
                    active_index.insert(x, false);
                },
            );
            for id in &result.deactivated {
                self.with_kb(context, |kb| kb.deactivate(*id));
            }
            for id in result.deactivated {
                self.bus
                    .publish(Event::Retracted { context: context.to_string(), assertion_id: id, reason: reason.clone() });
                self.bus
                    .publish(Event::AssertionState { context: context.to_string(), assertion_id: id, is_active: false });
            }
        }
    }

    fn resolve_retract_targets(&self, context: &str, target: &RetractTarget) -> Vec<AssertionId> {
        match target {
            RetractTarget::ById(id) => vec![*id],
            RetractTarget::ByKif(kif_text) => match Term::parse_kif(kif_text) {
                Ok(kif) => self.with_kb(context, |kb| kb.contains_active_kif(&kif)).into_iter().collect(),
                Err(_) => Vec::new(),
            },
            RetractTarget::ByNote(note_id) => self.with_kb(context, |kb| {
                kb.all_ids()
                    .into_iter()
                    .filter(|id| {
                        kb.get(*id)
                            .map(|a| a.source_note_id.as_deref() == Some(note_id.as_str()))
                            .unwrap_or(false)
                    })
                    .collect()
            }),
        }
    }

    fn on_retraction_request(&self, event: &Event) {
        if let Event::RetractionRequest { context, target, .. } = event {
            self.retract(context, target.clone(), RetractReason::Explicit);
        }
    }

    // -----------------------------------------------------------------
    // Notes facade (§4.9)
    // -----------------------------------------------------------------

    fn now_wall(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    /// Create a note record. Its context (same id) is minted lazily on the
    /// first assertion sourced from it, not here.
    pub fn note_create(&self, title: impl Into<String>) -> Note {
        let n = self.note_counter.fetch_add(1, Ordering::Relaxed);
        let id = format!("note-{n}");
        let note = Note::new(id.clone(), title, self.now_wall());
        self.notes.insert(id, note.clone());
        note
    }

    /// Reinsert a note exactly as snapshotted (§6.4 persistence reload),
    /// bumping the id counter so newly-created notes never collide with it.
    pub fn note_restore(&self, note: Note) {
        if let Some(n) = note.id.strip_prefix("note-").and_then(|s| s.parse::<u64>().ok()) {
            let mut current = self.note_counter.load(Ordering::Relaxed);
            while n + 1 > current {
                match self.note_counter.compare_exchange(current, n + 1, Ordering::Relaxed, Ordering::Relaxed) {
                    Ok(_) => break,
                    Err(observed) => current = observed,
                }
            }
        }
        self.notes.insert(note.id.clone(), note);
    }

    pub fn note_get(&self, id: &str) -> Option<Note> {
        self.notes.get(id).map(|n| n.clone())
    }

    pub fn note_list(&self) -> Vec<Note> {
        self.notes.iter().map(|e| e.value().clone()).collect()
    }

    pub fn note_rename(&self, id: &str, title: impl Into<String>) -> Result<Note, NoteError> {
        self.update_note(id, |n| n.title = title.into())
    }

    pub fn note_set_text(&self, id: &str, text: impl Into<String>) -> Result<Note, NoteError> {
        self.update_note(id, |n| n.text = text.into())
    }

    pub fn note_set_status(&self, id: &str, status: crate::notes::NoteStatus) -> Result<Note, NoteError> {
        self.update_note(id, |n| n.status = status)
    }

    fn update_note(&self, id: &str, f: impl FnOnce(&mut Note)) -> Result<Note, NoteError> {
        let now = self.now_wall();
        let mut entry = self.notes.get_mut(id).ok_or_else(|| NoteError::NotFound { id: id.to_string() })?;
        f(&mut entry);
        entry.updated_at = now;
        Ok(entry.clone())
    }

    /// Delete a note: retract everything sourced from it (§4.4 `BY_NOTE`)
    /// and drop the record. The context's `Kb` entry, if any, is left in
    /// place (now empty) rather than removed from `contexts`.
    pub fn note_delete(&self, id: &str) -> Result<(), NoteError> {
        if self.notes.remove(id).is_none() {
            return Err(NoteError::NotFound { id: id.to_string() });
        }
        self.retract(GLOBAL_CONTEXT, RetractTarget::ByNote(id.to_string()), RetractReason::Explicit);
        for context in self.active_contexts() {
            self.retract(&context, RetractTarget::ByNote(id.to_string()), RetractReason::Explicit);
        }
        Ok(())
    }
}

fn find_negation_partner(kb: &Kb, kif: &Term) -> Option<AssertionId> {
    match kif.negation_of() {
        Some(inner) => kb.contains_active_kif(inner),
        None => kb.contains_active_kif(&kif.negate()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_cognition() -> Arc<Cognition> {
        let bus = Arc::new(EventBus::start());
        Cognition::new(EngineConfig::default(), bus)
    }

    #[test]
    fn add_input_publishes_asserted_and_is_retrievable() {
        let cog = new_cognition();
        let id = cog
            .add_input(GLOBAL_CONTEXT, Term::parse_kif("(instance rex Dog)").unwrap(), "user:test", None)
            .unwrap();
        assert!(cog.is_active(id));
        assert_eq!(cog.context_len(GLOBAL_CONTEXT), 1);
    }

    #[test]
    fn duplicate_input_is_deduped_not_inserted_twice() {
        let cog = new_cognition();
        let id1 = cog
            .add_input(GLOBAL_CONTEXT, Term::parse_kif("(p a)").unwrap(), "user:1", None)
            .unwrap();
        let id2 = cog
            .add_input(GLOBAL_CONTEXT, Term::parse_kif("(p a)").unwrap(), "user:2", None)
            .unwrap();
        assert_eq!(id1, id2);
        assert_eq!(cog.context_len(GLOBAL_CONTEXT), 1);
    }

    #[test]
    fn forward_chaining_fires_through_the_bus() {
        let cog = new_cognition();
        cog.add_rule(
            Term::parse_kif("(=> (instance ?x Dog) (attribute ?x Canine))").unwrap(),
            1.0,
            None,
        )
        .unwrap();
        cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(instance rex Dog)").unwrap(), "user:test", None)
            .unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while std::time::Instant::now() < deadline {
            if cog.context_len(GLOBAL_CONTEXT) >= 2 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(cog
            .find_candidates(GLOBAL_CONTEXT, &Term::parse_kif("(attribute rex Canine)").unwrap())
            .iter()
            .any(|a| a.kif.to_kif() == "(attribute rex Canine)"));
    }

    #[test]
    fn retracting_an_input_cascades_to_its_derivation() {
        let cog = new_cognition();
        cog.add_rule(Term::parse_kif("(=> (p ?x) (q ?x))").unwrap(), 1.0, None).unwrap();
        let input_id = cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(p a)").unwrap(), "user:test", None).unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while std::time::Instant::now() < deadline {
            if cog.context_len(GLOBAL_CONTEXT) >= 2 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        cog.retract(GLOBAL_CONTEXT, RetractTarget::ById(input_id), RetractReason::Explicit);

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while std::time::Instant::now() < deadline {
            if cog.context_len(GLOBAL_CONTEXT) == 0 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(cog.context_len(GLOBAL_CONTEXT), 0);
    }

    #[test]
    fn note_lifecycle_create_edit_delete() {
        let cog = new_cognition();
        let note = cog.note_create("Groceries");
        assert_eq!(note.title, "Groceries");

        cog.note_set_text(&note.id, "(need milk)").unwrap();
        assert_eq!(cog.note_get(&note.id).unwrap().text, "(need milk)");

        cog.add_input(&note.id, Term::parse_kif("(need milk)").unwrap(), "user:test", Some(note.id.clone())).unwrap();
        assert_eq!(cog.context_len(&note.id), 1);

        cog.note_delete(&note.id).unwrap();
        assert!(cog.note_get(&note.id).is_none());
        assert_eq!(cog.context_len(&note.id), 0);
    }

    #[test]
    fn renaming_a_missing_note_errors() {
        let cog = new_cognition();
        assert!(cog.note_rename("note-404", "x").is_err());
    }
}
