//! # Built-in Normalization Rules
//!
//! This crate provides the default set of normalization rules for the normx
//! factory. Every rule rewrites a candidate into a simpler or more canonical
//! equivalent before it is interned; none of them keeps the original.
//!
//! ## Filter Rules
//!
//! - **`EliminateSelect`**: a Select with no filters is its input.
//! - **`SimplifyTrueFilters`**: drops filter items that are always true.
//! - **`FoldFalseFilters`**: a filter list containing a false or NULL item
//!   collapses to a single false item, which makes the Select provably empty.
//!
//! ## Scalar Rules
//!
//! - **`CommuteConstEq`**: moves a constant to the right side of `=`.
//! - **`FoldEqConsts`**: evaluates `=` between two constants of the same type.
//! - **`SimplifySingletonIn`**: `x IN (v)` becomes `x = v`.
//! - **`SimplifyEmptyIn`**: `x IN ()` is false.
//! - **`FoldFunction`**: evaluates a builtin call with constant arguments, as
//!   far as the factory's folding control permits.
//!
//! Every rule honors the factory's disabled-rule set: a disabled rule never
//! matches.

pub mod comparison;
pub mod filters;
pub mod functions;
pub mod membership;

use normx_core::factory::Factory;
use normx_core::rule::{RuleName, RuleRegistry};

/// Whether the caller left `rule` enabled.
pub(crate) fn enabled(f: &Factory, rule: RuleName) -> bool {
    !f.disabled_rules().contains(&rule)
}

/// Create a rule registry with all built-in rules.
pub fn default_rule_registry() -> RuleRegistry {
    let mut registry = RuleRegistry::new();

    registry.add_rule(Box::new(filters::EliminateSelect));
    registry.add_rule(Box::new(filters::SimplifyTrueFilters));
    registry.add_rule(Box::new(filters::FoldFalseFilters));

    registry.add_rule(Box::new(comparison::CommuteConstEq));
    registry.add_rule(Box::new(comparison::FoldEqConsts));

    registry.add_rule(Box::new(membership::SimplifySingletonIn));
    registry.add_rule(Box::new(membership::SimplifyEmptyIn));

    registry.add_rule(Box::new(functions::FoldFunction));

    registry
}

#[cfg(test)]
pub(crate) mod testing {
    use normx_core::eval::{DefaultEvaluator, EvalContext};
    use normx_core::factory::Factory;
    use normx_core::rule::{NormRule, RuleRegistry};
    use std::sync::Arc;

    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// A factory running only the given rules.
    pub fn factory_with(rules: Vec<Box<dyn NormRule>>) -> Factory {
        init_tracing();
        let mut registry = RuleRegistry::new();
        for rule in rules {
            registry.add_rule(rule);
        }
        let ctx = EvalContext::new(Arc::new(DefaultEvaluator::new(vec![]).with_statement_date(19000)));
        Factory::new(Arc::new(ctx), Arc::new(registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_contents() {
        let registry = default_rule_registry();
        assert_eq!(registry.len(), 8);
        assert!(registry.names().contains(&RuleName::new("FoldFunction")));
    }
}
