//! # normx-core: Normalizing Expression Factory
//!
//! This crate implements the construction substrate of a cost-based query
//! optimizer: a factory that builds the query tree into a memo, applying
//! normalization rules transitively as each node is constructed and interning
//! structurally equal nodes into shared groups.
//!
//! ## Module Overview
//!
//! - **`expr`**: Expression and operator type definitions (relational, scalar).
//! - **`memo`**: The Memo -- interned groups, query metadata, scalar ranks and the root.
//! - **`metadata`**: Table and column identifier namespace of one query.
//! - **`factory`**: The normalizing factory: construction protocol, depth guard,
//!   rule notification and veto, folding control, lifecycle.
//! - **`construct`**: Typed constructors and convenience constructors.
//! - **`replace`**: Copy-and-replace traversal, placeholder assignment, column remapping.
//! - **`rule`**: The NormRule trait and RuleRegistry.
//! - **`pattern`**: Declarative pattern matching for rule applicability checks.
//! - **`folding`**: Policy for constant-folding stable operators.
//! - **`eval`**: Evaluation context: evaluator, error reporter, properties provider, config.
//! - **`logical`**: Logical property derivation (output columns, cardinality, volatility).
//! - **`builtins`**: Builtin function properties injected into the properties provider.
//! - **`properties`**: Logical and required physical property definitions.
//! - **`stats`**: Table statistics snapshotted from the catalog.
//! - **`catalog`**: Catalog trait for resolving tables.
//! - **`config`**: Factory configuration.
//! - **`error`**: Error types.

pub mod builtins;
pub mod catalog;
pub mod config;
pub mod construct;
pub mod error;
pub mod eval;
pub mod expr;
pub mod factory;
pub mod folding;
pub mod logical;
pub mod memo;
pub mod metadata;
pub mod pattern;
pub mod properties;
pub mod replace;
pub mod rule;
pub mod stats;

pub use error::{EvalError, NormError};
pub use factory::Factory;
