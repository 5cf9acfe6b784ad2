//! Backward Chaining (§4.6.4): goal-driven proof search answering bus
//! `Query` events.
//!
//! A goal is proved by trying, in order: a direct match against active
//! assertions, then every stored `(=> ante cons)` rule whose consequent
//! unifies with the goal (recursing on its antecedent). `(and ...)` goals
//! prove each conjunct left to right, threading bindings forward. The proof
//! stack carries every goal on the current branch so a repeated goal fails
//! that branch instead of looping (`KbError::CycleDetected`'s semantics,
//! applied silently — other branches still get a chance), and recursion
//! stops at `reasoningDepthLimit` the same as forward derivation.
//!
//! `(ask-user "...")` suspends rather than fails: the branch parks, a
//! `DialogueRequest` is published, and the original query is retried in full
//! once a matching `DialogueResponse` arrives, with the answer asserted as a
//! fact so the retry can use it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::cognition::Cognition;
use crate::event::{Answer, Event, QueryRequest, QueryType};
use crate::kb::GLOBAL_CONTEXT;
use crate::rule::RuleKind;
use crate::term::{Term, OP_AND, OP_ASK_USER};
use crate::unify::{subst, unify, Substitution};

pub struct BackwardChainer {
    pending_dialogues: Mutex<HashMap<String, QueryRequest>>,
    counter: AtomicU64,
}

impl BackwardChainer {
    pub fn new() -> Self {
        Self { pending_dialogues: Mutex::new(HashMap::new()), counter: AtomicU64::new(0) }
    }

    pub fn on_event(&self, cog: &Arc<Cognition>, event: &Event) {
        match event {
            Event::Query(request) => self.answer(cog, request.clone()),
            Event::DialogueResponse { dialogue_id, response } => self.resume_after_dialogue(cog, dialogue_id, response),
            _ => {}
        }
    }

    fn answer(&self, cog: &Arc<Cognition>, request: QueryRequest) {
        let context = request.target_kb_id.clone().unwrap_or_else(|| GLOBAL_CONTEXT.to_string());
        let mut stack = Vec::new();
        let mut counter = self.counter.fetch_add(1_000, Ordering::Relaxed);
        let mut dialogues = Vec::new();
        let results = prove(cog, &context, &request.pattern, 0, &mut stack, &mut counter, &mut dialogues);

        if results.is_empty() && !dialogues.is_empty() {
            let prompt = dialogues.remove(0);
            let dialogue_id = format!("dlg-{}", self.counter.fetch_add(1, Ordering::Relaxed));
            self.pending_dialogues.lock().unwrap().insert(dialogue_id.clone(), request.clone());
            cog.bus().publish(Event::DialogueRequest { dialogue_id: dialogue_id.clone(), prompt: prompt.clone() });
            self.spawn_llm_fallback(cog, dialogue_id, prompt);
            return;
        }

        let answer = match request.query_type {
            QueryType::AskBindings => {
                if results.is_empty() {
                    Answer::failure(request.id.clone())
                } else {
                    let vars = request.pattern.free_vars();
                    let bindings = results
                        .iter()
                        .map(|theta| {
                            vars.iter()
                                .filter_map(|v| theta.get(v).map(|t| (v.clone(), t.clone())))
                                .collect()
                        })
                        .collect();
                    Answer::success(request.id.clone(), bindings)
                }
            }
            QueryType::AskTrueFalse | QueryType::AchieveGoal => {
                if results.is_empty() {
                    Answer::failure(request.id.clone())
                } else {
                    Answer::success(request.id.clone(), Vec::new())
                }
            }
        };
        cog.bus().publish(Event::Answer(answer));
    }

    fn resume_after_dialogue(&self, cog: &Arc<Cognition>, dialogue_id: &str, response: &Term) {
        let Some(original) = self.pending_dialogues.lock().unwrap().remove(dialogue_id) else { return };
        let context = original.target_kb_id.clone().unwrap_or_else(|| GLOBAL_CONTEXT.to_string());
        let _ = cog.add_input(&context, response.clone(), "dialogue:response", None);
        self.answer(cog, original);
    }

    /// §4.10 call site (b): if an LLM client is attached, answer `prompt` on
    /// a human's behalf once `dialogue_timeout_ms` passes without a human
    /// `DialogueResponse`. A no-op if the dialogue was already resumed, or
    /// if no client is attached.
    fn spawn_llm_fallback(&self, cog: &Arc<Cognition>, dialogue_id: String, prompt: String) {
        let Some((client, timeout_ms)) = cog.llm_client() else { return };
        let cog = Arc::clone(cog);
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(timeout_ms));
            let response = match client.answer_prompt(&prompt) {
                Ok(text) => Term::parse_kif(&text).unwrap_or_else(|_| Term::atom(text)),
                Err(_) => return,
            };
            cog.bus().publish(Event::DialogueResponse { dialogue_id, response });
        });
    }
}

impl Default for BackwardChainer {
    fn default() -> Self {
        Self::new()
    }
}

/// Prove `goal`, returning every distinct substitution that satisfies it.
/// `dialogues` accumulates any `(ask-user "...")` prompts hit along the way
/// so the caller can suspend and ask, rather than silently fail.
fn prove(
    cog: &Arc<Cognition>,
    context: &str,
    goal: &Term,
    depth: u32,
    stack: &mut Vec<Term>,
    counter: &mut u64,
    dialogues: &mut Vec<String>,
) -> Vec<Substitution> {
    if depth > cog.config().reasoning_depth_limit {
        return Vec::new();
    }
    if stack.contains(goal) {
        return Vec::new();
    }

    if goal.head_op() == Some(OP_ASK_USER) {
        dialogues.push(goal.children().last().map(|t| t.to_kif()).unwrap_or_default());
        return Vec::new();
    }

    if goal.head_op() == Some(OP_AND) {
        return prove_conjunction(cog, context, &goal.children()[1..], depth, stack, counter, dialogues);
    }

    stack.push(goal.clone());
    let mut results = Vec::new();

    for candidate in cog.find_candidates(context, goal) {
        if let Some(theta) = unify(goal, &candidate.kif) {
            results.push(theta);
        }
    }

    for rule in cog.all_rules() {
        if rule.kind != RuleKind::Implication {
            continue;
        }
        let (ante, cons) = rule.fresh_instance(counter);
        let Some(theta_head) = unify(&cons, goal) else { continue };
        let sub_goal = subst(&ante, &theta_head);
        for sub_theta in prove(cog, context, &sub_goal, depth + 1, stack, counter, dialogues) {
            let mut merged = theta_head.clone();
            for (k, v) in sub_theta.iter() {
                merged.insert(k.clone(), v.clone());
            }
            results.push(merged);
        }
    }

    stack.pop();
    results
}

fn prove_conjunction(
    cog: &Arc<Cognition>,
    context: &str,
    conjuncts: &[Term],
    depth: u32,
    stack: &mut Vec<Term>,
    counter: &mut u64,
    dialogues: &mut Vec<String>,
) -> Vec<Substitution> {
    let Some((first, rest)) = conjuncts.split_first() else {
        return vec![Substitution::new()];
    };
    let mut out = Vec::new();
    for theta1 in prove(cog, context, first, depth, stack, counter, dialogues) {
        let rest_subst: Vec<Term> = rest.iter().map(|g| subst(g, &theta1)).collect();
        for theta2 in prove_conjunction(cog, context, &rest_subst, depth, stack, counter, dialogues) {
            let mut merged = theta1.clone();
            for (k, v) in theta2.iter() {
                merged.insert(k.clone(), v.clone());
            }
            out.push(merged);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::config::EngineConfig;

    fn new_cognition() -> Arc<Cognition> {
        let bus = Arc::new(EventBus::start());
        Cognition::new(EngineConfig::default(), bus)
    }

    fn wait_for_answer(bus: &EventBus, query_id: &str) -> Answer {
        let (tx, rx) = std::sync::mpsc::channel();
        let target = query_id.to_string();
        bus.subscribe(Box::new(move |event| {
            if let Event::Answer(answer) = event {
                if answer.query_id == target {
                    let _ = tx.send(answer.clone());
                }
            }
        }));
        rx.recv_timeout(std::time::Duration::from_secs(2)).expect("no answer within timeout")
    }

    #[test]
    fn proves_goal_directly_from_a_ground_fact() {
        let cog = new_cognition();
        cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(instance rex Dog)").unwrap(), "user:test", None)
            .unwrap();
        let request = QueryRequest {
            id: "q1".into(),
            query_type: QueryType::AskTrueFalse,
            pattern: Term::parse_kif("(instance rex Dog)").unwrap(),
            target_kb_id: None,
        };
        cog.bus().publish(Event::Query(request));
        let answer = wait_for_answer(cog.bus(), "q1");
        assert_eq!(answer.status, crate::event::QueryStatus::Success);
    }

    #[test]
    fn proves_goal_through_a_backward_rule() {
        let cog = new_cognition();
        cog.add_rule(Term::parse_kif("(=> (instance ?x Dog) (mammal ?x))").unwrap(), 1.0, None).unwrap();
        cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(instance rex Dog)").unwrap(), "user:test", None)
            .unwrap();
        let request = QueryRequest {
            id: "q2".into(),
            query_type: QueryType::AskBindings,
            pattern: Term::parse_kif("(mammal ?who)").unwrap(),
            target_kb_id: None,
        };
        cog.bus().publish(Event::Query(request));
        let answer = wait_for_answer(cog.bus(), "q2");
        assert_eq!(answer.status, crate::event::QueryStatus::Success);
        assert_eq!(answer.bindings.len(), 1);
        assert_eq!(answer.bindings[0], vec![("who".to_string(), Term::atom("rex"))]);
    }

    #[test]
    fn unprovable_goal_fails() {
        let cog = new_cognition();
        let request = QueryRequest {
            id: "q3".into(),
            query_type: QueryType::AskTrueFalse,
            pattern: Term::parse_kif("(instance rex Cat)").unwrap(),
            target_kb_id: None,
        };
        cog.bus().publish(Event::Query(request));
        let answer = wait_for_answer(cog.bus(), "q3");
        assert_eq!(answer.status, crate::event::QueryStatus::Failure);
    }

    #[test]
    fn ask_user_suspends_and_resumes_on_dialogue_response() {
        let cog = new_cognition();
        cog.add_rule(
            Term::parse_kif("(=> (ask-user ?c \"favorite color?\") (color Alice ?c))").unwrap(),
            1.0,
            None,
        )
        .unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        cog.bus().subscribe(Box::new(move |event| {
            if let Event::DialogueRequest { dialogue_id, .. } = event {
                let _ = tx.send(dialogue_id.clone());
            }
        }));

        let request = QueryRequest {
            id: "q4".into(),
            query_type: QueryType::AskBindings,
            pattern: Term::parse_kif("(color Alice ?c)").unwrap(),
            target_kb_id: None,
        };
        cog.bus().publish(Event::Query(request));
        let dialogue_id = rx.recv_timeout(std::time::Duration::from_secs(2)).expect("no dialogue request");

        cog.bus().publish(Event::DialogueResponse {
            dialogue_id,
            response: Term::parse_kif("(color Alice Blue)").unwrap(),
        });
        let answer = wait_for_answer(cog.bus(), "q4");
        assert_eq!(answer.status, crate::event::QueryStatus::Success);
    }

    #[test]
    fn ask_user_falls_back_to_the_llm_after_the_dialogue_timeout() {
        let cog = new_cognition();
        cog.set_llm_client(
            Arc::new(crate::llm::ScriptedLlmClient::new("Green").with_response("favorite color", "Blue")),
            20,
        );
        cog.add_rule(
            Term::parse_kif("(=> (ask-user ?c \"favorite color?\") (color Bob ?c))").unwrap(),
            1.0,
            None,
        )
        .unwrap();

        let request = QueryRequest {
            id: "q5".into(),
            query_type: QueryType::AskBindings,
            pattern: Term::parse_kif("(color Bob ?c)").unwrap(),
            target_kb_id: None,
        };
        cog.bus().publish(Event::Query(request));
        let answer = wait_for_answer(cog.bus(), "q5");
        assert_eq!(answer.status, crate::event::QueryStatus::Success);
        assert_eq!(answer.bindings[0], vec![("c".to_string(), Term::atom("Blue"))]);
    }
}
