//! # Evaluation Context
//!
//! The [`EvalContext`] bundles everything the factory needs from its host
//! process and never mutates:
//!
//! - an [`Evaluator`] that turns a scalar expression into a [`Datum`], used to
//!   assign placeholders and to fold constant function calls;
//! - an [`ErrorReporter`], the sink for conditions that are reported instead
//!   of returned (a production depth-guard trip);
//! - the [`LogicalPropsProvider`] used to derive group properties, which in
//!   turn carries the injected builtin lookup;
//! - the [`FactoryConfig`].
//!
//! A context is built once and shared through an `Arc` by every factory that
//! uses it.

use crate::config::FactoryConfig;
use crate::error::{EvalError, NormError};
use crate::expr::{Datum, Operator, ScalarExpr, ScalarOp};
use crate::logical::{DefaultPropsProvider, LogicalPropsProvider};
use crate::memo::{GroupId, Memo};
use ordered_float::OrderedFloat;
use std::fmt;
use std::sync::Arc;

/// Evaluates scalar expressions of a memo.
pub trait Evaluator: Send + Sync {
    fn eval(&self, memo: &Memo, expr: ScalarExpr) -> Result<Datum, EvalError>;

    /// Call a builtin function on constant arguments. Used for folding.
    fn eval_function(&self, name: &str, _args: &[Datum]) -> Result<Datum, EvalError> {
        Err(EvalError::Unsupported(format!("function {}", name)))
    }
}

/// Observability sink for errors that must not fail the query.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, err: &NormError);
}

/// Reports errors to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, err: &NormError) {
        tracing::error!(error = %err, assertion = err.is_assertion(), "optimizer error reported");
    }
}

/// Evaluates constants, tuples, positional placeholders and a few builtins.
///
/// Placeholder `$n` takes the n-th value of `placeholders` (1-based).
#[derive(Debug, Clone, Default)]
pub struct DefaultEvaluator {
    placeholders: Vec<Datum>,
    statement_date: i32,
}

impl DefaultEvaluator {
    pub fn new(placeholders: Vec<Datum>) -> Self {
        Self {
            placeholders,
            statement_date: 0,
        }
    }

    /// Value returned by `now()`, in days since the epoch.
    pub fn with_statement_date(mut self, days: i32) -> Self {
        self.statement_date = days;
        self
    }

    fn eval_group(&self, memo: &Memo, id: GroupId) -> Result<Datum, EvalError> {
        let expr = memo.expr(id);
        let Operator::Scalar(op) = &expr.op else {
            return Err(EvalError::Unsupported(expr.op.to_string()));
        };
        match op {
            ScalarOp::Const { value, .. } => Ok(value.clone()),
            ScalarOp::Null(_) => Ok(Datum::Null),
            ScalarOp::True => Ok(Datum::Bool(true)),
            ScalarOp::False => Ok(Datum::Bool(false)),
            ScalarOp::Placeholder { index, typ } => {
                let value = (*index as usize)
                    .checked_sub(1)
                    .and_then(|i| self.placeholders.get(i))
                    .ok_or(EvalError::NoPlaceholderValue(*index))?;
                let found = value.resolved_type();
                if !typ.accepts(&found) {
                    return Err(EvalError::PlaceholderType {
                        index: *index,
                        expected: typ.clone(),
                        found,
                    });
                }
                Ok(value.clone())
            }
            ScalarOp::Tuple(_) => expr
                .children
                .iter()
                .map(|c| self.eval_group(memo, *c))
                .collect::<Result<Vec<_>, _>>()
                .map(Datum::Tuple),
            ScalarOp::Function { name, .. } => {
                let args = expr
                    .children
                    .iter()
                    .map(|c| self.eval_group(memo, *c))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(name, &args)
            }
            _ => Err(EvalError::Unsupported(expr.op.to_string())),
        }
    }

    fn call(&self, name: &str, args: &[Datum]) -> Result<Datum, EvalError> {
        let invalid = |reason: &str| EvalError::InvalidArgument {
            func: name.to_string(),
            reason: reason.to_string(),
        };
        match (name, args) {
            ("abs" | "lower" | "upper" | "length", [Datum::Null]) => Ok(Datum::Null),
            ("abs", [Datum::Int(n)]) => n.checked_abs().map(Datum::Int).ok_or_else(|| invalid("integer out of range")),
            ("abs", [Datum::Float(f)]) => Ok(Datum::Float(OrderedFloat(f.0.abs()))),
            ("lower", [Datum::String(s)]) => Ok(Datum::String(s.to_lowercase())),
            ("upper", [Datum::String(s)]) => Ok(Datum::String(s.to_uppercase())),
            ("length", [Datum::String(s)]) => Ok(Datum::Int(s.chars().count() as i64)),
            ("now", []) => Ok(Datum::Date(self.statement_date)),
            ("abs" | "lower" | "upper" | "length" | "now", _) => Err(invalid("unexpected arguments")),
            _ => Err(EvalError::Unsupported(format!("function {}", name))),
        }
    }
}

impl Evaluator for DefaultEvaluator {
    fn eval(&self, memo: &Memo, expr: ScalarExpr) -> Result<Datum, EvalError> {
        self.eval_group(memo, expr.group())
    }

    fn eval_function(&self, name: &str, args: &[Datum]) -> Result<Datum, EvalError> {
        self.call(name, args)
    }
}

/// Host-provided collaborators of the factory.
#[derive(Clone)]
pub struct EvalContext {
    evaluator: Arc<dyn Evaluator>,
    reporter: Arc<dyn ErrorReporter>,
    props: Arc<dyn LogicalPropsProvider>,
    config: FactoryConfig,
}

impl EvalContext {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            evaluator,
            reporter: Arc::new(LogReporter),
            props: Arc::new(DefaultPropsProvider::default()),
            config: FactoryConfig::default(),
        }
    }

    pub fn with_config(mut self, config: FactoryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_props_provider(mut self, props: Arc<dyn LogicalPropsProvider>) -> Self {
        self.props = props;
        self
    }

    pub fn evaluator(&self) -> &dyn Evaluator {
        self.evaluator.as_ref()
    }

    pub fn reporter(&self) -> &dyn ErrorReporter {
        self.reporter.as_ref()
    }

    pub fn props(&self) -> &dyn LogicalPropsProvider {
        self.props.as_ref()
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new(Arc::new(DefaultEvaluator::default()))
    }
}

impl fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalContext").field("config", &self.config).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_calls() {
        let ev = DefaultEvaluator::new(vec![]).with_statement_date(19000);
        assert_eq!(ev.call("upper", &[Datum::String("ab".into())]), Ok(Datum::String("AB".into())));
        assert_eq!(ev.call("length", &[Datum::String("héllo".into())]), Ok(Datum::Int(5)));
        assert_eq!(ev.call("abs", &[Datum::Null]), Ok(Datum::Null));
        assert_eq!(ev.call("now", &[]), Ok(Datum::Date(19000)));
        assert!(matches!(
            ev.call("abs", &[Datum::Int(i64::MIN)]),
            Err(EvalError::InvalidArgument { .. })
        ));
        assert!(matches!(ev.call("random", &[]), Err(EvalError::Unsupported(_))));
    }
}
