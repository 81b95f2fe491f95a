//! Shared kernel for the SAPL streaming policy engine.
//!
//! This crate exposes only the truly cross-cutting pieces: the `Val` value
//! model, the evaluation context, the policy/combining data model, and the
//! port traits (`FunctionRegistry`, `AttributeBroker`, `PolicyCatalog`) that
//! let the retrieval, evaluation, and combining crates depend on stable
//! abstractions instead of on each other's concrete types.
//!
//! Principles:
//! - No business logic, no I/O.
//! - Only stable types and traits.
//! - No cyclic dependencies: this crate sits at the base of the workspace.

pub mod domain;
pub mod error;
pub mod ports;

pub use domain::{
    attribute_key::AttributeSubscriptionKey,
    context::EvaluationContext,
    decision::{AuthorizationDecision, Decision, IdentifiableDecision, MultiDecision},
    expr::Expr,
    formula::{ConjunctiveClause, DisjunctiveFormula, Literal, PredicateId, PredicateTable},
    policy::{CombiningAlgorithm, ErrorHandling, PolicyDocument, PolicyId, PolicyKind, VotingMode},
    subscription::{AuthorizationSubscription, MultiSubscription},
    value::Val,
};

pub use error::{
    AttributeError, ConfigurationError, EvaluationError, ObligationError, RegistrationError,
};

pub use ports::{AttributeBroker, FunctionRegistry, PolicyCatalog};
