//! `AuthorizationSubscription` (spec §3).

use crate::domain::value::Val;
use serde::{Deserialize, Serialize};

/// The subject/action/resource/environment tuple submitted to the engine.
/// Any field may be `Null` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationSubscription {
    pub subject: Val,
    pub action: Val,
    pub resource: Val,
    pub environment: Val,
}

impl AuthorizationSubscription {
    pub fn new(subject: Val, action: Val, resource: Val, environment: Val) -> Self {
        Self {
            subject,
            action,
            resource,
            environment,
        }
    }

    /// Convenience constructor for subscriptions with no environment
    /// attributes, the common case in the scenarios of spec §8.
    pub fn without_environment(subject: Val, action: Val, resource: Val) -> Self {
        Self::new(subject, action, resource, Val::null())
    }
}

/// A batch of subscriptions sharing a single `decide_all`/`decide_each`
/// stream, each tagged with an opaque id the caller supplies so responses
/// can be correlated back (spec §4.7 `decide_each`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiSubscription {
    pub subscriptions: Vec<(String, AuthorizationSubscription)>,
}

impl MultiSubscription {
    pub fn new(subscriptions: Vec<(String, AuthorizationSubscription)>) -> Self {
        Self { subscriptions }
    }
}
