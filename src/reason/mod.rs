//! The four reasoner strategies (§4.6). Each is a bus subscriber wired by
//! [`crate::cognition::Cognition::new`]; none owns a `Kb` or the `Tms`
//! directly — all of them act through [`crate::cognition::Cognition`]'s
//! public methods so dedup, eviction, and contradiction handling stay in one
//! place.

pub mod backward;
pub mod forward;
pub mod rewrite;
pub mod universal;
