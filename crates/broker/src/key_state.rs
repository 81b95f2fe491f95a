//! Per-key state machine backing [`crate::InMemoryAttributeBroker`]:
//! `Idle -> Loading -> Active <-> Active-with-queued-teardown -> Terminated`
//! (spec §4.3), implemented with a `tokio::sync::watch` channel (which
//! already gives "replay the latest value, then every subsequent change"
//! for free) plus a refcount and a generation counter that lets a
//! re-subscription during the linger window cancel a pending teardown.

use async_stream::stream;
use dashmap::DashMap;
use futures::stream::BoxStream;
use sapl_kernel::domain::value::Val;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::trace;

pub(crate) struct KeyState {
    pub(crate) fq_name: String,
    sender: watch::Sender<Val>,
    has_value: AtomicBool,
    refcount: AtomicUsize,
    generation: AtomicU64,
}

impl KeyState {
    pub(crate) fn new(fq_name: String) -> Self {
        let (sender, _receiver) = watch::channel(Val::undefined());
        Self {
            fq_name,
            sender,
            has_value: AtomicBool::new(false),
            refcount: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Val> {
        self.sender.subscribe()
    }

    pub(crate) fn publish(&self, value: Val) {
        self.has_value.store(true, Ordering::SeqCst);
        // `send` only fails when every receiver (including the one held by
        // `sender.subscribe()` above) has dropped, which cannot happen here
        // since `KeyState` owns `sender` and hands out fresh receivers.
        let _ = self.sender.send(value);
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.refcount.load(Ordering::SeqCst)
    }
}

/// Decrements the key's refcount on drop and, if it was the last
/// subscriber, schedules a delayed teardown. Holds its own
/// [`Arc`] handles so it can outlive the stream it was created for if the
/// caller drops the stream early.
pub(crate) struct SubscriptionGuard {
    keys: Arc<DashMap<String, Arc<KeyState>>>,
    cache_key: String,
    state: Arc<KeyState>,
    linger: Duration,
}

impl SubscriptionGuard {
    pub(crate) fn new(
        keys: Arc<DashMap<String, Arc<KeyState>>>,
        cache_key: String,
        state: Arc<KeyState>,
        linger: Duration,
    ) -> Self {
        state.refcount.fetch_add(1, Ordering::SeqCst);
        state.generation.fetch_add(1, Ordering::SeqCst);
        Self {
            keys,
            cache_key,
            state,
            linger,
        }
    }

    pub(crate) fn cache_key(&self) -> &str {
        &self.cache_key
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let remaining = self.state.refcount.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining != 0 {
            return;
        }
        let generation_at_drop = self.state.generation.load(Ordering::SeqCst);
        let keys = self.keys.clone();
        let cache_key = self.cache_key.clone();
        let state = self.state.clone();
        let linger = self.linger;
        tokio::spawn(async move {
            if !linger.is_zero() {
                tokio::time::sleep(linger).await;
            }
            if state.subscriber_count() != 0 {
                return;
            }
            if state.generation.load(Ordering::SeqCst) != generation_at_drop {
                // Someone re-subscribed (and possibly unsubscribed again)
                // during the linger window; their own drop will schedule
                // the next teardown attempt.
                return;
            }
            trace!(cache_key = %cache_key, "tearing down attribute key after linger");
            keys.remove_if(&cache_key, |_, existing| Arc::ptr_eq(existing, &state));
        });
    }
}

/// Builds the per-subscription stream described by spec §4.3: replay the
/// cached value unless `fresh`, otherwise wait for the next real publish;
/// race the very first value against `initial_timeout` when nothing has
/// ever been published; complete (never error) once `disposed` fires.
pub(crate) fn stream(
    state: Arc<KeyState>,
    mut receiver: watch::Receiver<Val>,
    guard: SubscriptionGuard,
    fresh: bool,
    initial_timeout: Option<Duration>,
    disposed: CancellationToken,
) -> BoxStream<'static, Val> {
    let already_has_value = state.has_value.load(Ordering::SeqCst);

    Box::pin(stream! {
        let _guard = guard;

        if already_has_value && !fresh {
            yield receiver.borrow_and_update().clone();
        } else if !already_has_value {
            match initial_timeout {
                Some(timeout) => {
                    tokio::select! {
                        changed = receiver.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            yield receiver.borrow_and_update().clone();
                        }
                        _ = tokio::time::sleep(timeout) => {
                            yield Val::undefined();
                        }
                        _ = disposed.cancelled() => {
                            return;
                        }
                    }
                }
                None => {}
            }
        }

        loop {
            tokio::select! {
                changed = receiver.changed() => {
                    match changed {
                        Ok(()) => yield receiver.borrow_and_update().clone(),
                        Err(_) => return,
                    }
                }
                _ = disposed.cancelled() => {
                    return;
                }
            }
        }
    })
}
