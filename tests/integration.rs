//! End-to-end scenarios exercising the bus, the four reasoner strategies, the
//! TMS, and the client surface together, the way a real caller would use
//! them rather than any single module in isolation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use noetic::bus::EventBus;
use noetic::client::NoeticClient;
use noetic::cognition::Cognition;
use noetic::config::EngineConfig;
use noetic::event::{Event, QueryType, RetractTarget};
use noetic::kb::GLOBAL_CONTEXT;
use noetic::term::Term;
use noetic::tms::ContradictionPolicy;

fn new_cognition() -> Arc<Cognition> {
    let bus = Arc::new(EventBus::start());
    Cognition::new(EngineConfig::default(), bus)
}

fn poll<F: Fn() -> bool>(deadline: Duration, pred: F) -> bool {
    let until = Instant::now() + deadline;
    loop {
        if pred() {
            return true;
        }
        if Instant::now() >= until {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// S1: Peano-style addition reduces to normal form through successive
/// rewrite events (one rewrite per event, so the reduction takes several
/// bus round-trips to settle).
#[test]
fn s1_peano_addition_reduces_to_normal_form() {
    let cog = new_cognition();
    cog.add_rule(Term::parse_kif("(= (add 0 ?n) ?n)").unwrap(), 1.0, None).unwrap();
    cog.add_rule(Term::parse_kif("(= (add (s ?m) ?n) (s (add ?m ?n)))").unwrap(), 1.0, None).unwrap();
    cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(add (s (s 0)) (s 0))").unwrap(), "user:test", None).unwrap();

    let target = Term::parse_kif("(s (s (s 0)))").unwrap();
    let found = poll(Duration::from_secs(3), || {
        cog.find_candidates(GLOBAL_CONTEXT, &target).iter().any(|a| a.kif.to_kif() == target.to_kif())
    });
    assert!(found, "Peano sum never reduced to normal form");
}

/// S2: a matching input fires a forward-chaining rule, producing a derived
/// assertion justified by the input, at depth 1.
#[test]
fn s2_forward_chain_derives_with_justification_and_depth() {
    let cog = new_cognition();
    cog.add_rule(Term::parse_kif("(=> (instance ?x Dog) (attribute ?x Canine))").unwrap(), 1.0, None).unwrap();
    let rex_id = cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(instance rex Dog)").unwrap(), "user:test", None).unwrap();

    let derived_kif = Term::parse_kif("(attribute rex Canine)").unwrap();
    let found = poll(Duration::from_secs(2), || {
        cog.find_candidates(GLOBAL_CONTEXT, &derived_kif).iter().any(|a| a.kif.to_kif() == derived_kif.to_kif())
    });
    assert!(found, "forward chain never derived (attribute rex Canine)");

    let derived = cog
        .find_candidates(GLOBAL_CONTEXT, &derived_kif)
        .into_iter()
        .find(|a| a.kif.to_kif() == derived_kif.to_kif())
        .unwrap();
    assert_eq!(derived.derivation_depth, 1);
    assert!(derived.justification_ids.contains(&rex_id));
}

/// S3: retracting the input that justified a forward-chained derivation
/// cascades through the TMS and deactivates the derived fact.
#[test]
fn s3_retraction_cascades_to_derived_facts() {
    let cog = new_cognition();
    cog.add_rule(Term::parse_kif("(=> (instance ?x Dog) (attribute ?x Canine))").unwrap(), 1.0, None).unwrap();
    cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(instance rex Dog)").unwrap(), "user:test", None).unwrap();

    let derived_kif = Term::parse_kif("(attribute rex Canine)").unwrap();
    assert!(poll(Duration::from_secs(2), || {
        cog.find_candidates(GLOBAL_CONTEXT, &derived_kif).iter().any(|a| a.kif.to_kif() == derived_kif.to_kif())
    }));

    let (tx, rx) = std::sync::mpsc::channel();
    cog.bus().subscribe(Box::new(move |event| {
        if let Event::Retracted { assertion_id, .. } = event {
            let _ = tx.send(*assertion_id);
        }
    }));

    cog.retract(GLOBAL_CONTEXT, RetractTarget::ByKif("(instance rex Dog)".to_string()), noetic::event::RetractReason::Explicit);

    rx.recv_timeout(Duration::from_secs(2)).expect("no Retracted event for the cascaded derived fact");
    assert!(!cog
        .find_candidates(GLOBAL_CONTEXT, &derived_kif)
        .iter()
        .any(|a| a.kif.to_kif() == derived_kif.to_kif() && a.is_active));
}

/// S4: asserting a fact and its negation triggers contradiction detection;
/// under the default `prefer_old` policy the original stays active and the
/// negation is deactivated.
#[test]
fn s4_contradiction_prefers_old_by_default() {
    let cog = new_cognition();
    assert_eq!(cog.config().contradiction_policy, ContradictionPolicy::PreferOld);

    cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(raining)").unwrap(), "user:test", None).unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    cog.bus().subscribe(Box::new(move |event| {
        if let Event::ContradictionDetected { .. } = event {
            let _ = tx.send(());
        }
    }));

    cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(not (raining))").unwrap(), "user:test", None).unwrap();
    rx.recv_timeout(Duration::from_secs(2)).expect("no ContradictionDetected event");

    assert!(poll(Duration::from_secs(1), || {
        let raining = cog.find_candidates(GLOBAL_CONTEXT, &Term::parse_kif("(raining)").unwrap());
        let not_raining = cog.find_candidates(GLOBAL_CONTEXT, &Term::parse_kif("(not (raining))").unwrap());
        raining.iter().any(|a| a.is_active) && not_raining.iter().all(|a| !a.is_active)
    }));
}

/// S5: once a context hits capacity, committing another input evicts the
/// lowest-`(priority, -timestamp)` candidate — the oldest when priorities
/// tie — rather than rejecting the new fact.
#[test]
fn s5_capacity_eviction_picks_the_oldest_equal_priority_assertion() {
    let config = EngineConfig { global_kb_capacity: 3, ..EngineConfig::default() };
    let bus = Arc::new(EventBus::start());
    let cog = Cognition::new(config, bus);

    let (tx, rx) = std::sync::mpsc::channel();
    cog.bus().subscribe(Box::new(move |event| {
        if let Event::AssertionEvicted { assertion_id, .. } = event {
            let _ = tx.send(*assertion_id);
        }
    }));

    let a = cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(p a)").unwrap(), "user:test", None).unwrap();
    cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(p b)").unwrap(), "user:test", None).unwrap();
    cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(p c)").unwrap(), "user:test", None).unwrap();
    cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(p d)").unwrap(), "user:test", None).unwrap();

    let evicted = rx.recv_timeout(Duration::from_secs(2)).expect("no AssertionEvicted event");
    assert_eq!(evicted, a, "the earliest-timestamped equal-priority assertion should be evicted first");
    assert_eq!(cog.context_len(GLOBAL_CONTEXT), 3);
}

/// S6: a query that can only be proved through `(ask-user ...)` suspends,
/// publishing a `DialogueRequest`; answering it resumes the proof.
#[test]
fn s6_dialogue_suspends_and_resumes_a_query() {
    let cog = new_cognition();
    cog.add_rule(Term::parse_kif("(=> (ask-user ?c \"color?\") (color alice ?c))").unwrap(), 1.0, None).unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    cog.bus().subscribe(Box::new(move |event| {
        if let Event::DialogueRequest { dialogue_id, .. } = event {
            let _ = tx.send(dialogue_id.clone());
        }
    }));

    let client = NoeticClient::local(Arc::clone(&cog));
    let bus_clone = Arc::clone(cog.bus());
    let query_thread = std::thread::spawn(move || client.query(QueryType::AskBindings, "(color alice ?c)", None));

    let dialogue_id = rx.recv_timeout(Duration::from_secs(2)).expect("no DialogueRequest published");
    bus_clone.publish(Event::DialogueResponse {
        dialogue_id,
        response: Term::parse_kif("(color alice blue)").unwrap(),
    });

    let answer = query_thread.join().unwrap().unwrap();
    assert_eq!(answer.status, noetic::event::QueryStatus::Success);
    assert_eq!(answer.bindings[0], vec![("c".to_string(), Term::atom("blue"))]);
}

/// A full client-facing round trip: assert through [`NoeticClient`], query
/// it back, then retract and confirm the query now fails.
#[test]
fn client_assert_query_retract_round_trip() {
    let cog = new_cognition();
    let client = NoeticClient::local(Arc::clone(&cog));

    let id = client.assert_kif(GLOBAL_CONTEXT, "(instance luna Cat)", None).unwrap();
    let answer = client.query(QueryType::AskTrueFalse, "(instance luna Cat)", None).unwrap();
    assert_eq!(answer.status, noetic::event::QueryStatus::Success);

    client.retract(GLOBAL_CONTEXT, RetractTarget::ById(id)).unwrap();
    let answer = client.query(QueryType::AskTrueFalse, "(instance luna Cat)", None).unwrap();
    assert_eq!(answer.status, noetic::event::QueryStatus::Failure);
}

/// Universal instantiation fires against a fact asserted after the `forall`,
/// and again against one asserted before it registers.
#[test]
fn universal_instantiation_fires_regardless_of_assertion_order() {
    let cog = new_cognition();
    cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(instance fido Dog)").unwrap(), "user:test", None).unwrap();
    cog.add_input(
        GLOBAL_CONTEXT,
        Term::parse_kif("(forall (?x) (=> (instance ?x Dog) (mortal ?x)))").unwrap(),
        "user:test",
        None,
    )
    .unwrap();
    cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(instance rex Dog)").unwrap(), "user:test", None).unwrap();

    let fido_mortal = Term::parse_kif("(mortal fido)").unwrap();
    let rex_mortal = Term::parse_kif("(mortal rex)").unwrap();
    assert!(poll(Duration::from_secs(2), || {
        cog.find_candidates(GLOBAL_CONTEXT, &fido_mortal).iter().any(|a| a.is_active)
    }));
    assert!(poll(Duration::from_secs(2), || {
        cog.find_candidates(GLOBAL_CONTEXT, &rex_mortal).iter().any(|a| a.is_active)
    }));
}

/// Tool invocation (§4.11): a registered trigger fires automatically off a
/// matching `Asserted` event, recording a [`noetic::tools::ToolInvocation`].
#[test]
fn registered_trigger_fires_a_tool_on_matching_assertion() {
    let cog = new_cognition();
    cog.register_trigger(Term::parse_kif("(please-log ?msg)").unwrap(), "assert_kif");
    cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(please-log (noted it))").unwrap(), "user:test", None).unwrap();

    assert!(poll(Duration::from_secs(2), || !cog.tool_invocations().is_empty()));
    let invocations = cog.tool_invocations();
    assert_eq!(invocations[0].tool_name, "assert_kif");
}
