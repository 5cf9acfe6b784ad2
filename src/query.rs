//! Query Engine (§4.7): a synchronous façade over the async bus.
//!
//! `query_sync` publishes a [`QueryRequest`] and blocks on a one-shot
//! channel fed by a temporary subscriber that watches for the matching
//! `Answer` (`answer.query_id == request.id`). A request that gets no answer
//! within `queryTimeoutMs` (§6.5) resolves to `Answer::timeout`, matching the
//! "cancellation & timeouts" behavior of §5: the proof tree already running
//! on the dispatch thread is not interrupted, only abandoned by the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use crate::cognition::Cognition;
use crate::event::{Answer, Event, QueryRequest, QueryType};
use crate::term::Term;

static QUERY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Mint a query id unique within this process (`q-<n>`).
pub fn next_query_id() -> String {
    format!("q-{}", QUERY_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Publish `pattern` as a query of the given type and block for its answer,
/// or until `cognition`'s configured `query_timeout_ms` elapses.
pub fn query_sync(cognition: &Arc<Cognition>, query_type: QueryType, pattern: Term, target_kb_id: Option<String>) -> Answer {
    let id = next_query_id();
    let request = QueryRequest { id: id.clone(), query_type, pattern, target_kb_id };
    query_sync_with(cognition, request)
}

/// As [`query_sync`], but the caller supplies the full request (e.g. to
/// reuse an id from a client protocol message).
pub fn query_sync_with(cognition: &Arc<Cognition>, request: QueryRequest) -> Answer {
    let (tx, rx) = mpsc::channel();
    let wanted = request.id.clone();
    cognition.bus().subscribe(Box::new(move |event| {
        if let Event::Answer(answer) = event {
            if answer.query_id == wanted {
                let _ = tx.send(answer.clone());
            }
        }
    }));

    let timeout = Duration::from_millis(cognition.config().query_timeout_ms);
    let query_id = request.id.clone();
    cognition.bus().publish(Event::Query(request));

    match rx.recv_timeout(timeout) {
        Ok(answer) => answer,
        Err(_) => Answer::timeout(query_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::config::EngineConfig;
    use crate::event::QueryStatus;
    use crate::kb::GLOBAL_CONTEXT;

    fn new_cognition() -> Arc<Cognition> {
        let bus = Arc::new(EventBus::start());
        Cognition::new(EngineConfig::default(), bus)
    }

    #[test]
    fn query_sync_resolves_against_a_ground_fact() {
        let cog = new_cognition();
        cog.add_input(GLOBAL_CONTEXT, Term::parse_kif("(instance rex Dog)").unwrap(), "user:test", None)
            .unwrap();
        let answer = query_sync(
            &cog,
            QueryType::AskTrueFalse,
            Term::parse_kif("(instance rex Dog)").unwrap(),
            None,
        );
        assert_eq!(answer.status, QueryStatus::Success);
    }

    #[test]
    fn query_sync_times_out_when_nothing_answers() {
        let mut config = EngineConfig::default();
        config.query_timeout_ms = 50;
        let bus = Arc::new(EventBus::start());
        let cog = Cognition::new(config, bus);
        // No LLM client is attached and nothing ever publishes a
        // DialogueResponse, so this goal's proof suspends forever on the
        // `ask-user` subgoal instead of answering within the window.
        cog.add_rule(
            Term::parse_kif("(=> (ask-user ?c \"favorite color?\") (color alice ?c))").unwrap(),
            1.0,
            None,
        )
        .unwrap();
        let answer = query_sync(&cog, QueryType::AskBindings, Term::parse_kif("(color alice ?c)").unwrap(), None);
        assert_eq!(answer.status, QueryStatus::Timeout);
    }
}
