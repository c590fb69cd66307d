//! # Builtin Function Properties
//!
//! The properties provider needs to know how volatile each builtin function
//! is before it can classify a `Function` expression. That knowledge is
//! injected once, when the host builds its [`EvalContext`](crate::eval::EvalContext),
//! through the [`BuiltinLookup`] trait. There is no global registry.

use crate::properties::Volatility;
use std::collections::HashMap;

/// Properties of a builtin function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionProperties {
    pub volatility: Volatility,
}

/// Resolves a builtin function name to its properties.
pub trait BuiltinLookup: Send + Sync {
    fn properties(&self, name: &str) -> Option<FunctionProperties>;
}

/// A fixed table of builtin properties.
#[derive(Debug, Clone, Default)]
pub struct BuiltinRegistry {
    functions: HashMap<String, FunctionProperties>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The builtins understood by [`DefaultEvaluator`](crate::eval::DefaultEvaluator).
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("abs", Volatility::Immutable);
        registry.register("lower", Volatility::Leakproof);
        registry.register("upper", Volatility::Leakproof);
        registry.register("length", Volatility::Leakproof);
        registry.register("now", Volatility::Stable);
        registry.register("random", Volatility::Volatile);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, volatility: Volatility) {
        self.functions.insert(name.into(), FunctionProperties { volatility });
    }
}

impl BuiltinLookup for BuiltinRegistry {
    fn properties(&self, name: &str) -> Option<FunctionProperties> {
        self.functions.get(name).copied()
    }
}
