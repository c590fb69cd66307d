//! # Factory Configuration
//!
//! Limits and verification switches for the normalizing factory. The
//! configuration travels inside the [`EvalContext`](crate::eval::EvalContext)
//! so that every factory built from the same context behaves identically.

use serde::{Deserialize, Serialize};

/// Maximum depth of nested constructor calls before normalization stops.
///
/// A rule cycle (A rewrites to B, B rewrites back to A) would otherwise run
/// forever. Past this depth no further rules are applied, and the expression
/// built so far is interned as-is.
pub const MAX_CONSTRUCTOR_STACK_DEPTH: usize = 10_000;

/// Configuration knobs for the factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryConfig {
    /// Upper bound on the constructor depth counter.
    pub max_constructor_depth: usize,
    /// Verification mode. Invariant violations panic instead of being
    /// reported to the error reporter.
    pub verify_invariants: bool,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            max_constructor_depth: MAX_CONSTRUCTOR_STACK_DEPTH,
            verify_invariants: cfg!(debug_assertions),
        }
    }
}

impl FactoryConfig {
    /// Test configuration: every invariant violation is fatal.
    pub fn verification() -> Self {
        Self {
            verify_invariants: true,
            ..Self::default()
        }
    }

    /// Release configuration: a depth-guard trip is reported and construction
    /// continues with the partially normalized tree.
    pub fn production() -> Self {
        Self {
            verify_invariants: false,
            ..Self::default()
        }
    }
}
