//! Facade crate wiring the kernel's value/policy model, the in-memory
//! attribute broker, and the policy-engine's evaluation/indexing/combining
//! pipeline into a single [`PolicyDecisionPoint`] (C7, spec §4.7).
//!
//! A consumer typically only needs three things from this crate:
//! [`EngineBuilder`] to construct the engine, [`FunctionRegistryBuilder`]
//! to register the functions its policies call, and the kernel's
//! `AuthorizationSubscription`/`AuthorizationDecision` types re-exported
//! below to talk to it.

pub mod engine;
pub mod error;
pub mod registry;

pub use engine::{EngineBuilder, PolicyDecisionPoint};
pub use error::EngineError;
pub use registry::FunctionRegistryBuilder;

pub use sapl_broker::InMemoryAttributeBroker;
pub use sapl_kernel::domain::decision::{AuthorizationDecision, Decision, IdentifiableDecision, MultiDecision};
pub use sapl_kernel::domain::expr::Expr;
pub use sapl_kernel::domain::policy::{CombiningAlgorithm, ErrorHandling, PolicyDocument, PolicyId, PolicyKind, VotingMode};
pub use sapl_kernel::domain::subscription::{AuthorizationSubscription, MultiSubscription};
pub use sapl_kernel::domain::value::Val;
pub use sapl_kernel::error::{AttributeError, ConfigurationError, EvaluationError, ObligationError, RegistrationError};
pub use sapl_kernel::ports::{
    AttributeBroker, CatalogEvent, FunctionRegistry, ParamValidator, PolicyCatalog, RegisteredFunction,
    SchemaRegistry,
};
