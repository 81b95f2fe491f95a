//! `Decision` and `AuthorizationDecision` (spec §3).

use crate::domain::value::Val;
use serde::{Deserialize, Serialize};

/// The four-valued authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Permit,
    Deny,
    NotApplicable,
    Indeterminate,
}

impl Decision {
    pub fn is_permit(self) -> bool {
        matches!(self, Decision::Permit)
    }
}

/// The result of a single decision tick, wire-compatible with spec §6.7:
/// ```json
/// { "decision": "PERMIT", "resource": <any>?, "obligations": [...]?, "advice": [...]? }
/// ```
///
/// Invariant (spec §3): if `decision != Permit` then `resource` and
/// `obligations` MUST be absent; `advice` MAY be present regardless.
/// Construction is only possible through the constructors below, which
/// enforce the invariant rather than trusting callers to respect it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationDecision {
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Val>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obligations: Option<Vec<Val>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advice: Option<Vec<Val>>,
}

impl AuthorizationDecision {
    pub fn permit(resource: Option<Val>, obligations: Vec<Val>, advice: Vec<Val>) -> Self {
        Self {
            decision: Decision::Permit,
            resource,
            obligations: if obligations.is_empty() {
                None
            } else {
                Some(obligations)
            },
            advice: if advice.is_empty() { None } else { Some(advice) },
        }
    }

    pub fn deny(advice: Vec<Val>) -> Self {
        Self {
            decision: Decision::Deny,
            resource: None,
            obligations: None,
            advice: if advice.is_empty() { None } else { Some(advice) },
        }
    }

    pub fn not_applicable() -> Self {
        Self {
            decision: Decision::NotApplicable,
            resource: None,
            obligations: None,
            advice: None,
        }
    }

    pub fn indeterminate(advice: Vec<Val>) -> Self {
        Self {
            decision: Decision::Indeterminate,
            resource: None,
            obligations: None,
            advice: if advice.is_empty() { None } else { Some(advice) },
        }
    }

    /// Builds a bare decision (no resource/obligations/advice) for any
    /// outcome, collapsing an invalid combination defensively: non-PERMIT
    /// decisions never carry `resource`/`obligations` even if constructed
    /// by hand elsewhere and passed through here.
    pub fn from_decision(decision: Decision) -> Self {
        match decision {
            Decision::Permit => Self::permit(None, Vec::new(), Vec::new()),
            Decision::Deny => Self::deny(Vec::new()),
            Decision::NotApplicable => Self::not_applicable(),
            Decision::Indeterminate => Self::indeterminate(Vec::new()),
        }
    }
}

/// One sub-subscription's decision within a `MultiSubscription`, tagged
/// with the id the caller supplied at subscribe time (spec §4.7
/// `decide_each`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifiableDecision {
    pub id: String,
    pub decision: AuthorizationDecision,
}

impl IdentifiableDecision {
    pub fn new(id: impl Into<String>, decision: AuthorizationDecision) -> Self {
        Self {
            id: id.into(),
            decision,
        }
    }
}

/// The aggregated state of every sub-subscription in a `MultiSubscription`
/// at one point in time, re-emitted in full whenever any single
/// sub-subscription's decision changes (spec §4.7 `decide_all`: "one
/// emission per change, aggregating sub-decisions").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiDecision {
    pub decisions: std::collections::BTreeMap<String, AuthorizationDecision>,
}

impl MultiDecision {
    pub fn new(decisions: std::collections::BTreeMap<String, AuthorizationDecision>) -> Self {
        Self { decisions }
    }
}
