//! Opaque, niche-optimized identifiers for assertions and rules.
//!
//! Callers see ids as opaque strings (`"a42"`, `"r7"`); internally each is a
//! `NonZeroU64` so `Option<AssertionId>` costs nothing extra and maps keyed by
//! id hash fast. The allocators are atomic counters, safe to share across the
//! dispatch thread and any reasoner that mints new ids.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(into = "String", try_from = "String")]
        #[repr(transparent)]
        pub struct $name(NonZeroU64);

        impl $name {
            pub fn new(raw: u64) -> Option<Self> {
                NonZeroU64::new(raw).map(Self)
            }

            pub fn get(self) -> u64 {
                self.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.to_string()
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.strip_prefix($prefix)
                    .and_then(|rest| rest.parse::<u64>().ok())
                    .and_then(Self::new)
                    .ok_or_else(|| format!("not a valid {} id: {s:?}", stringify!($name)))
            }
        }
    };
}

opaque_id!(AssertionId, "a");
opaque_id!(RuleId, "r");

/// Thread-safe, monotonically increasing id allocator.
#[derive(Debug)]
pub struct IdAllocator<T> {
    next: AtomicU64,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> IdAllocator<T> {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1), _marker: std::marker::PhantomData }
    }

    pub fn starting_from(start: u64) -> Self {
        Self { next: AtomicU64::new(start.max(1)), _marker: std::marker::PhantomData }
    }

    pub fn peek_next(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl IdAllocator<AssertionId> {
    pub fn next_id(&self) -> AssertionId {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        AssertionId::new(raw).expect("allocator counter started at 1 and only increments")
    }
}

impl IdAllocator<RuleId> {
    pub fn next_id(&self) -> RuleId {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        RuleId::new(raw).expect("allocator counter started at 1 and only increments")
    }
}

impl<T> Default for IdAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assertion_id_niche_optimization() {
        assert_eq!(
            std::mem::size_of::<Option<AssertionId>>(),
            std::mem::size_of::<AssertionId>()
        );
    }

    #[test]
    fn assertion_id_display_and_parse_round_trip() {
        let id = AssertionId::new(42).unwrap();
        assert_eq!(id.to_string(), "a42");
        assert_eq!(AssertionId::try_from("a42".to_string()).unwrap(), id);
    }

    #[test]
    fn rule_id_display_and_parse_round_trip() {
        let id = RuleId::new(7).unwrap();
        assert_eq!(id.to_string(), "r7");
        assert_eq!(RuleId::try_from("r7".to_string()).unwrap(), id);
    }

    #[test]
    fn rejects_wrong_prefix() {
        assert!(AssertionId::try_from("r42".to_string()).is_err());
        assert!(RuleId::try_from("a7".to_string()).is_err());
        assert!(AssertionId::try_from("a0".to_string()).is_err());
        assert!(AssertionId::try_from("anope".to_string()).is_err());
    }

    #[test]
    fn allocator_produces_sequential_ids() {
        let alloc: IdAllocator<AssertionId> = IdAllocator::new();
        assert_eq!(alloc.next_id().get(), 1);
        assert_eq!(alloc.next_id().get(), 2);
    }

    #[test]
    fn allocator_starting_from_resumes() {
        let alloc: IdAllocator<RuleId> = IdAllocator::starting_from(100);
        assert_eq!(alloc.next_id().get(), 100);
        assert_eq!(alloc.next_id().get(), 101);
    }
}
