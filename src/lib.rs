// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # noetic
//!
//! A symbolic cognitive engine: KIF term representation, a per-context
//! knowledge base with truth maintenance, and four pluggable reasoning
//! strategies dispatched off one process-wide event bus.
//!
//! ## Architecture
//!
//! - **Term model** (`term`): KIF parsing/serialization, structurally hashed
//! - **Unification** (`unify`): first-order unification with occurs-check
//! - **Knowledge base** (`kb`): per-context, head-indexed, capacity-bounded
//! - **Truth maintenance** (`tms`): justification graph, retraction cascade
//! - **Rules** (`rule`): `=>`, `<=>`, `=` forms, head-indexed store
//! - **Reasoners** (`reason`): forward chaining, rewriting, universal
//!   instantiation, backward chaining — each a bus subscriber
//! - **Cognition** (`cognition`): the facade tying contexts, rules, TMS, and
//!   the bus together
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use noetic::bus::EventBus;
//! use noetic::cognition::Cognition;
//! use noetic::config::EngineConfig;
//! use noetic::kb::GLOBAL_CONTEXT;
//! use noetic::term::Term;
//!
//! let bus = Arc::new(EventBus::start());
//! let cognition = Cognition::new(EngineConfig::default(), bus);
//! cognition
//!     .add_input(GLOBAL_CONTEXT, Term::parse_kif("(instance rex Dog)").unwrap(), "user:demo", None)
//!     .unwrap();
//! ```

pub mod assertion;
pub mod bus;
pub mod client;
pub mod cognition;
pub mod config;
pub mod error;
pub mod event;
pub mod ids;
pub mod kb;
pub mod llm;
pub mod message;
pub mod notes;
pub mod paths;
pub mod persistence;
pub mod query;
pub mod reason;
pub mod rule;
pub mod skolem;
pub mod term;
pub mod tms;
pub mod tools;
pub mod unify;
