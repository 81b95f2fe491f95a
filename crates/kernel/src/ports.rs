//! External interfaces consumed by the engine (spec §6): `FunctionRegistry`,
//! `AttributeBroker`, `PolicyCatalog`. These are object-safe `async_trait`
//! ports so that `sapl-policies`/`sapl-engine` depend on abstractions, never
//! on `sapl-broker`'s concrete implementation, mirroring the teacher's
//! dependency-inversion style (`EvaluatePoliciesPort`, `SchemaStoragePort`).

use crate::domain::attribute_key::AttributeSubscriptionKey;
use crate::domain::policy::PolicyDocument;
use crate::domain::value::Val;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;

/// Parameter type validators a function registration can declare, per
/// spec §6.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamValidator {
    Text,
    Number,
    Bool,
    Array,
    Object,
    Int,
    Long,
}

/// A registered function: the callable plus its declared parameter
/// validators (spec §6.2). Validators are advisory metadata the evaluator
/// may use to produce a clearer `EvaluationError` before calling `func`.
pub struct RegisteredFunction {
    pub validators: Vec<ParamValidator>,
    pub func: Box<dyn Fn(&[Val]) -> Val + Send + Sync>,
}

/// Consumed interface: `lookup(fqName) -> opt<fn(args) -> Val>` (spec §6.2).
/// Implementations are expected to validate names against
/// `crate::error::is_valid_fq_name` and reject duplicates at registration
/// time with `RegistrationError`, synchronously, before the registry is
/// handed to the engine (spec §7: "RegistrationError ... produced
/// synchronously at engine construction").
pub trait FunctionRegistry: Send + Sync {
    fn lookup(&self, fq_name: &str) -> Option<Arc<RegisteredFunction>>;
}

/// Consumed interface backing `<attr.name(args)>` / `|<attr.name>` (spec
/// §4.3, §6.3).
#[async_trait]
pub trait AttributeBroker: Send + Sync {
    /// Returns a shared, replayable stream for `key`. See spec §4.3 for the
    /// full `fresh`/`initial_timeout` contract.
    async fn attribute_stream(
        &self,
        key: AttributeSubscriptionKey,
        fresh: bool,
        initial_timeout: Option<Duration>,
    ) -> BoxStream<'static, Val>;

    /// Manual push feed for a statically published entity attribute.
    async fn publish_attribute(&self, entity: Val, name: String, value: Val);

    /// Manual push feed for a statically published environment attribute.
    async fn publish_environment_attribute(&self, name: String, value: Val);

    /// Removes a previously published attribute; the stream emits
    /// `Undefined` and the key is marked unpublished (spec §4.3).
    async fn remove_attribute(&self, entity: Option<Val>, name: String);

    /// Number of currently active upstream subscriptions for `fq_name`,
    /// across every distinct key -- an introspection counterpart to the
    /// teacher's `InMemoryEventBus::subscription_count` (spec.md §4.3 does
    /// not name this operation; added per `SPEC_FULL.md` §5.3).
    async fn attribute_stream_count(&self, fq_name: &str) -> usize;
}

/// Consumed interface backing the `schema conformance` expression kind
/// (spec §4.4). Schemas are registered by name ahead of evaluation, the
/// same "lookup by fully qualified name" shape as `FunctionRegistry`.
pub trait SchemaRegistry: Send + Sync {
    fn validate(&self, schema_name: &str, value: &Val) -> Option<bool>;
}

/// Consumed interface: an iterator over `PolicyDocument` plus
/// `subscribe(updates)` producing add/remove events (spec §6.4).
#[derive(Debug, Clone)]
pub enum CatalogEvent {
    Put(Arc<PolicyDocument>),
    Removed(crate::domain::policy::PolicyId),
}

#[async_trait]
pub trait PolicyCatalog: Send + Sync {
    /// Returns every currently known policy document.
    async fn all(&self) -> Vec<Arc<PolicyDocument>>;

    /// Subscribes to add/remove events as the catalog changes.
    async fn subscribe_updates(&self) -> BoxStream<'static, CatalogEvent>;
}

/// Minimal no-op implementations used by this crate's own unit tests and,
/// behind the `test-support` feature, by downstream crates' test suites
/// (e.g. `sapl-policy-engine`'s evaluator tests) that need an
/// `EvaluationContext` without wiring a real broker/registry.
#[cfg(any(test, feature = "test-support"))]
pub mod tests_support {
    use super::*;
    use futures::stream;

    pub struct NullRegistry;
    impl FunctionRegistry for NullRegistry {
        fn lookup(&self, _fq_name: &str) -> Option<Arc<RegisteredFunction>> {
            None
        }
    }

    pub struct NullBroker;
    #[async_trait]
    impl AttributeBroker for NullBroker {
        async fn attribute_stream(
            &self,
            _key: AttributeSubscriptionKey,
            _fresh: bool,
            _initial_timeout: Option<Duration>,
        ) -> BoxStream<'static, Val> {
            Box::pin(stream::empty())
        }

        async fn publish_attribute(&self, _entity: Val, _name: String, _value: Val) {}

        async fn publish_environment_attribute(&self, _name: String, _value: Val) {}

        async fn remove_attribute(&self, _entity: Option<Val>, _name: String) {}

        async fn attribute_stream_count(&self, _fq_name: &str) -> usize {
            0
        }
    }
}
