//! The `PolicyDecisionPoint` (C7, spec §4.7): the engine facade wiring the
//! PRP (C5), per-policy evaluation (C4), and combining (C6) into the four
//! entry points a caller actually subscribes to.
//!
//! Grounded in the teacher's `AuthorizationEngine` (composition root owning
//! `Authorizer`/`PolicySet`/`Entities` behind `Arc<RwLock<_>>`,
//! `crates/policies/src/shared/application/engine/core.rs`), generalised
//! from one-shot `is_authorized` to the four reactive entry points this
//! workspace's streaming model requires.

use crate::error::EngineError;
use async_stream::stream;
use futures::stream::{self, BoxStream, StreamExt};
use sapl_kernel::domain::context::EvaluationContext;
use sapl_kernel::domain::decision::{AuthorizationDecision, IdentifiableDecision, MultiDecision};
use sapl_kernel::domain::policy::CombiningAlgorithm;
use sapl_kernel::domain::subscription::{AuthorizationSubscription, MultiSubscription};
use sapl_kernel::error::ConfigurationError;
use sapl_kernel::ports::{AttributeBroker, CatalogEvent, FunctionRegistry, PolicyCatalog, SchemaRegistry};
use sapl_policy_engine::{combine_decisions, evaluate_document, TargetIndex};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Builds a `PolicyDecisionPoint`. Grounded in the teacher's `Arc`-handle
/// dependency-injection style rather than global singletons (spec §9).
pub struct EngineBuilder {
    functions: Arc<dyn FunctionRegistry>,
    broker: Arc<dyn AttributeBroker>,
    catalog: Option<Arc<dyn PolicyCatalog>>,
    schemas: Option<Arc<dyn SchemaRegistry>>,
    pdp_algorithm: Option<CombiningAlgorithm>,
    attribute_initial_timeout: Option<Duration>,
}

impl EngineBuilder {
    pub fn new(functions: Arc<dyn FunctionRegistry>, broker: Arc<dyn AttributeBroker>) -> Self {
        Self {
            functions,
            broker,
            catalog: None,
            schemas: None,
            pdp_algorithm: None,
            attribute_initial_timeout: None,
        }
    }

    /// Seeds the PRP from `catalog.all()` at construction, then keeps it
    /// live by consuming `catalog.subscribe_updates()` in the background
    /// for the lifetime of the built engine (spec §4.5, §6.4).
    pub fn with_catalog(mut self, catalog: Arc<dyn PolicyCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_schema_registry(mut self, schemas: Arc<dyn SchemaRegistry>) -> Self {
        self.schemas = Some(schemas);
        self
    }

    /// The single top-level combining algorithm this PDP applies across
    /// the PRP's candidate documents (spec §4.7: "a single configurable
    /// top-level algorithm per PDP"). Required; `build()` fails with
    /// `ConfigurationError::InvalidPdpConfiguration` if never set.
    pub fn with_pdp_algorithm(mut self, algorithm: CombiningAlgorithm) -> Self {
        self.pdp_algorithm = Some(algorithm);
        self
    }

    pub fn with_attribute_initial_timeout(mut self, timeout: Duration) -> Self {
        self.attribute_initial_timeout = Some(timeout);
        self
    }

    pub async fn build(self) -> Result<PolicyDecisionPoint, EngineError> {
        let algorithm = self.pdp_algorithm.ok_or_else(|| {
            ConfigurationError::InvalidPdpConfiguration(
                "no PDP-level combining algorithm configured; call with_pdp_algorithm".to_string(),
            )
        })?;
        let index = Arc::new(TargetIndex::new(self.functions.clone()));

        let catalog_task = match self.catalog {
            Some(catalog) => {
                index.begin_loading();
                for document in catalog.all().await {
                    index.put(document);
                }
                index.end_loading();
                let mut updates = catalog.subscribe_updates().await;
                let index_bg = index.clone();
                Some(tokio::spawn(async move {
                    while let Some(event) = updates.next().await {
                        match event {
                            CatalogEvent::Put(document) => index_bg.put(document),
                            CatalogEvent::Removed(id) => index_bg.remove(&id),
                        }
                    }
                }))
            }
            None => None,
        };

        Ok(PolicyDecisionPoint {
            index,
            broker: self.broker,
            functions: self.functions,
            schemas: self.schemas,
            pdp_algorithm: algorithm,
            attribute_initial_timeout: self.attribute_initial_timeout,
            catalog_task,
        })
    }
}

/// The PDP. Cheap to clone the handles it owns; subscriptions share the
/// PRP and broker rather than each standing up their own.
pub struct PolicyDecisionPoint {
    index: Arc<TargetIndex>,
    broker: Arc<dyn AttributeBroker>,
    functions: Arc<dyn FunctionRegistry>,
    schemas: Option<Arc<dyn SchemaRegistry>>,
    pdp_algorithm: CombiningAlgorithm,
    attribute_initial_timeout: Option<Duration>,
    catalog_task: Option<JoinHandle<()>>,
}

impl Drop for PolicyDecisionPoint {
    fn drop(&mut self) {
        if let Some(handle) = self.catalog_task.take() {
            handle.abort();
        }
    }
}

impl PolicyDecisionPoint {
    /// Exposes the PRP for manual `put`/`remove` when the engine was built
    /// without a `PolicyCatalog` (spec §4.5).
    pub fn index(&self) -> &Arc<TargetIndex> {
        &self.index
    }

    fn root_context(&self, subscription: &AuthorizationSubscription) -> EvaluationContext {
        let mut top_level = HashMap::with_capacity(4);
        top_level.insert("subject".to_string(), subscription.subject.clone());
        top_level.insert("action".to_string(), subscription.action.clone());
        top_level.insert("resource".to_string(), subscription.resource.clone());
        top_level.insert("environment".to_string(), subscription.environment.clone());
        let mut ctx = EvaluationContext::root(top_level, HashMap::new(), self.functions.clone(), self.broker.clone());
        if let Some(schemas) = &self.schemas {
            ctx = ctx.with_schema_registry(schemas.clone());
        }
        if let Some(timeout) = self.attribute_initial_timeout {
            ctx = ctx.with_attribute_initial_timeout(timeout);
        }
        ctx
    }

    /// `decide(subscription) -> Stream<AuthorizationDecision>` (spec §4.7):
    /// asks the PRP for candidates, subscribes each via C4, combines via
    /// C6 under the PDP-level algorithm. Long-lived: the stream keeps
    /// emitting as attributes change until the caller drops it.
    #[instrument(skip(self, subscription), fields(action = %subscription.action.display_safe()))]
    pub fn decide(&self, subscription: AuthorizationSubscription) -> BoxStream<'static, AuthorizationDecision> {
        let index = self.index.clone();
        let broker = self.broker.clone();
        let ctx = self.root_context(&subscription);
        let algorithm = self.pdp_algorithm;
        Box::pin(stream! {
            let candidates = index.candidates(&subscription, broker.clone()).await.unwrap_or_default();
            let per_policy: Vec<BoxStream<'static, AuthorizationDecision>> = candidates
                .into_iter()
                .map(|document| evaluate_document(document, ctx.clone()))
                .collect();
            let mut combined = combine_decisions(per_policy, algorithm);
            while let Some(decision) = combined.next().await {
                yield decision;
            }
        })
    }

    /// `decide_once(subscription) -> Future<AuthorizationDecision>` (spec
    /// §4.7): the first element of `decide`, then cancellation -- dropping
    /// the returned future's stream after one tick releases every
    /// dependent attribute subscription (spec §5 "Cancellation").
    pub async fn decide_once(&self, subscription: AuthorizationSubscription) -> AuthorizationDecision {
        self.decide(subscription)
            .next()
            .await
            .unwrap_or_else(AuthorizationDecision::not_applicable)
    }

    /// `decide_all(multi_subscription) -> Stream<MultiDecision>` (spec
    /// §4.7): one emission per change, each carrying the full aggregated
    /// state of every sub-subscription (spec §9 Open Question (i) resolved
    /// as "re-emit the whole map on any single sub-decision's change" --
    /// see `DESIGN.md`).
    pub fn decide_all(&self, multi: MultiSubscription) -> BoxStream<'static, MultiDecision> {
        let ids: Vec<String> = multi.subscriptions.iter().map(|(id, _)| id.clone()).collect();
        let tagged: Vec<BoxStream<'static, (usize, AuthorizationDecision)>> = multi
            .subscriptions
            .into_iter()
            .enumerate()
            .map(|(i, (_, subscription))| self.decide(subscription).map(move |d| (i, d)).boxed())
            .collect();
        let mut merged = stream::select_all(tagged);
        Box::pin(stream! {
            let mut latest: Vec<Option<AuthorizationDecision>> = vec![None; ids.len()];
            while let Some((i, decision)) = merged.next().await {
                latest[i] = Some(decision);
                let decisions: BTreeMap<String, AuthorizationDecision> = ids
                    .iter()
                    .enumerate()
                    .filter_map(|(j, id)| latest[j].clone().map(|d| (id.clone(), d)))
                    .collect();
                yield MultiDecision::new(decisions);
            }
        })
    }

    /// `decide_each(multi_subscription) -> Stream<IdentifiableDecision>`
    /// (spec §4.7): per-sub-subscription stream with ids, interleaved as
    /// each changes.
    pub fn decide_each(&self, multi: MultiSubscription) -> BoxStream<'static, IdentifiableDecision> {
        let tagged: Vec<BoxStream<'static, IdentifiableDecision>> = multi
            .subscriptions
            .into_iter()
            .map(|(id, subscription)| {
                self.decide(subscription)
                    .map(move |decision| IdentifiableDecision::new(id.clone(), decision))
                    .boxed()
            })
            .collect();
        Box::pin(stream::select_all(tagged))
    }
}
