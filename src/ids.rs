//! Process-unique identities for parameters, clauses, chains and contexts.
//!
//! Identity here is by allocation, never by structure: two parameters with the
//! same name and type are still different symbols.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

macro_rules! identity {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            pub(crate) fn fresh() -> Self {
                Self(next_id())
            }

            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

identity!(
    /// Identity of a bound lambda parameter.
    ParamId,
    "param"
);
identity!(
    /// Identity of a clause inside a query model. Clones receive fresh ids.
    ClauseId,
    "clause"
);
identity!(
    /// Identity of one [`QueryChain`](crate::QueryChain) arena.
    ChainId,
    "chain"
);
identity!(
    /// Identity of one [`ClauseGenerationContext`](crate::ClauseGenerationContext).
    ContextId,
    "context"
);
