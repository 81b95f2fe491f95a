//! The Attribute Broker (C3, spec §4.3): a multi-subscriber, cached,
//! replayable stream for `<attr.name(args)>`/`|<attr.name>` lookups,
//! grounded in the teacher's `InMemoryEventBus`
//! (`examples/Rubentxu-hodei-artifacts/crates/kernel/src/infrastructure/in_memory_event_bus.rs`):
//! a `broadcast`-shaped fan-out per key, refcounted subscriptions, and a
//! background task that tears the key down once nobody is listening.
//!
//! This crate provides exactly one concrete implementation of
//! `sapl_kernel::ports::AttributeBroker`: [`InMemoryAttributeBroker`].

mod key_state;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::BoxStream;
use sapl_kernel::domain::attribute_key::AttributeSubscriptionKey;
use sapl_kernel::domain::value::Val;
use sapl_kernel::ports::AttributeBroker;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use key_state::{KeyState, SubscriptionGuard};

/// In-process `AttributeBroker`. One [`KeyState`] per distinct
/// `AttributeSubscriptionKey::cache_key()`, held in a [`DashMap`] so
/// concurrent subscribe/publish calls on unrelated keys never contend on a
/// single lock (spec §5: "concurrent subscriptions to *different* keys
/// never block one another").
pub struct InMemoryAttributeBroker {
    keys: Arc<DashMap<String, Arc<KeyState>>>,
    /// How long a key survives after its last subscriber drops before the
    /// upstream is torn down (spec §4.3). Zero means "tear down
    /// immediately".
    linger: Duration,
    /// Flipped on `dispose`; every live stream observes it and completes
    /// (never errors) in response (spec §4.3: "disposing the broker
    /// completes every outstanding stream").
    disposed: CancellationToken,
}

impl InMemoryAttributeBroker {
    pub fn new(linger: Duration) -> Self {
        Self {
            keys: Arc::new(DashMap::new()),
            linger,
            disposed: CancellationToken::new(),
        }
    }

    /// Stops every outstanding stream and prevents new subscriptions from
    /// seeing stale cached values. Idempotent.
    pub fn dispose(&self) {
        self.disposed.cancel();
    }

    fn get_or_create(&self, cache_key: String, fq_name: &str) -> Arc<KeyState> {
        self.keys
            .entry(cache_key)
            .or_insert_with(|| Arc::new(KeyState::new(fq_name.to_string())))
            .clone()
    }

    fn publish(&self, key: AttributeSubscriptionKey, value: Val) {
        let cache_key = key.cache_key();
        let state = self.get_or_create(cache_key, &key.fq_name);
        state.publish(value);
    }
}

#[async_trait]
impl AttributeBroker for InMemoryAttributeBroker {
    #[instrument(skip(self, key), fields(fq_name = %key.fq_name, fresh))]
    async fn attribute_stream(
        &self,
        key: AttributeSubscriptionKey,
        fresh: bool,
        initial_timeout: Option<Duration>,
    ) -> BoxStream<'static, Val> {
        let cache_key = key.cache_key();
        let state = self.get_or_create(cache_key.clone(), &key.fq_name);
        let receiver = state.subscribe();
        let guard = SubscriptionGuard::new(
            self.keys.clone(),
            cache_key,
            state.clone(),
            self.linger,
        );
        debug!(cache_key = %guard.cache_key(), "attribute stream subscribed");
        key_state::stream(state, receiver, guard, fresh, initial_timeout, self.disposed.clone())
    }

    #[instrument(skip(self, entity, value), fields(fq_name = %name))]
    async fn publish_attribute(&self, entity: Val, name: String, value: Val) {
        let digest = sapl_kernel::domain::attribute_key::VariablesDigest::empty();
        let key = AttributeSubscriptionKey::new(name, Some(entity), Vec::new(), digest);
        trace!("publishing entity attribute");
        self.publish(key, value);
    }

    #[instrument(skip(self, value), fields(fq_name = %name))]
    async fn publish_environment_attribute(&self, name: String, value: Val) {
        let digest = sapl_kernel::domain::attribute_key::VariablesDigest::empty();
        let key = AttributeSubscriptionKey::environment(name, Vec::new(), digest);
        trace!("publishing environment attribute");
        self.publish(key, value);
    }

    #[instrument(skip(self, entity), fields(fq_name = %name))]
    async fn remove_attribute(&self, entity: Option<Val>, name: String) {
        let digest = sapl_kernel::domain::attribute_key::VariablesDigest::empty();
        let key = AttributeSubscriptionKey::new(name, entity, Vec::new(), digest);
        self.publish(key, Val::undefined());
    }

    async fn attribute_stream_count(&self, fq_name: &str) -> usize {
        self.keys
            .iter()
            .filter(|entry| entry.value().fq_name == fq_name)
            .map(|entry| entry.value().subscriber_count())
            .sum()
    }
}
