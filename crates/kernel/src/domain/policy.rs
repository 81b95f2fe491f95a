//! `PolicyDocument` and `CombiningAlgorithm` (spec §3).

use crate::domain::decision::Decision;
use crate::domain::expr::Expr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Unique identifier for a policy document. Opaque to the engine (spec §6.4:
/// "the engine treats the document id as opaque").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolicyId(String);

impl PolicyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a fresh id for a policy document the catalog does not itself
    /// supply one for (spec §3 Ambient stack).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PolicyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A parsed policy document is either a leaf `Policy` or a `PolicySet`
/// containing only `Policy` children (spec §3 invariant: a PolicySet
/// contains only Policies, never nested sets, in one set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyKind {
    Policy,
    PolicySet,
}

/// Voting mode selecting which combining rule applies (spec §3, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VotingMode {
    DenyOverrides,
    PermitOverrides,
    FirstApplicable,
    OnlyOneApplicable,
    DenyUnlessPermit,
    PermitUnlessDeny,
}

/// How combining treats per-policy `Error`/`Indeterminate` inputs (spec §3,
/// §4.6). `TreatAsIndeterminate` and `Propagate` are documented distinctly
/// even though they currently compute the same result, per spec §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorHandling {
    Propagate,
    TreatAsIndeterminate,
    TreatAsNotApplicable,
}

/// `{ votingMode, defaultDecision, errorHandling }` (spec §3, §6.6). The
/// JSON representation is exactly this shape, field for field.
///
/// `only_one_applicable_counts_indeterminate` resolves spec §9 Open
/// Question (ii): whether `ONLY_ONE_APPLICABLE` treats `INDETERMINATE` as
/// "applicable". Recorded as an explicit configuration flag rather than a
/// guessed fixed behavior; default `false` (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombiningAlgorithm {
    #[serde(rename = "votingMode")]
    pub voting_mode: VotingMode,
    #[serde(rename = "defaultDecision")]
    pub default_decision: Decision,
    #[serde(rename = "errorHandling")]
    pub error_handling: ErrorHandling,
    #[serde(default, rename = "onlyOneApplicableCountsIndeterminate")]
    pub only_one_applicable_counts_indeterminate: bool,
}

impl CombiningAlgorithm {
    pub fn new(
        voting_mode: VotingMode,
        default_decision: Decision,
        error_handling: ErrorHandling,
    ) -> Self {
        Self {
            voting_mode,
            default_decision,
            error_handling,
            only_one_applicable_counts_indeterminate: false,
        }
    }

    pub fn with_only_one_applicable_counts_indeterminate(mut self, flag: bool) -> Self {
        self.only_one_applicable_counts_indeterminate = flag;
        self
    }
}

/// A parsed policy or policy set (spec §3). Immutable once constructed and
/// freely shareable (policy documents never self-reference after parsing,
/// spec §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub id: PolicyId,
    pub name: String,
    pub kind: PolicyKind,
    pub target_expr: Option<Arc<Expr>>,
    pub where_expr: Option<Arc<Expr>>,
    pub entitlement: Decision,
    pub obligations: Vec<Arc<Expr>>,
    pub advice: Vec<Arc<Expr>>,
    pub transform: Option<Arc<Expr>>,
    pub imports: BTreeMap<String, String>,
    pub children: Vec<Arc<PolicyDocument>>,
    pub combining: Option<CombiningAlgorithm>,
}

impl PolicyDocument {
    /// Builds a leaf policy (no children, `combining` irrelevant).
    #[allow(clippy::too_many_arguments)]
    pub fn policy(
        id: PolicyId,
        name: impl Into<String>,
        target_expr: Option<Expr>,
        where_expr: Option<Expr>,
        entitlement: Decision,
        obligations: Vec<Expr>,
        advice: Vec<Expr>,
        transform: Option<Expr>,
    ) -> Self {
        assert!(
            matches!(entitlement, Decision::Permit | Decision::Deny),
            "a policy's entitlement must be PERMIT or DENY"
        );
        Self {
            id,
            name: name.into(),
            kind: PolicyKind::Policy,
            target_expr: target_expr.map(Arc::new),
            where_expr: where_expr.map(Arc::new),
            entitlement,
            obligations: obligations.into_iter().map(Arc::new).collect(),
            advice: advice.into_iter().map(Arc::new).collect(),
            transform: transform.map(Arc::new),
            imports: BTreeMap::new(),
            children: Vec::new(),
            combining: None,
        }
    }

    /// Builds a policy set. `children` must all be `Policy` kind (spec §3
    /// invariant); debug-asserted here since the catalog is the trusted
    /// source of truth and this is not user input.
    pub fn policy_set(
        id: PolicyId,
        name: impl Into<String>,
        target_expr: Option<Expr>,
        children: Vec<Arc<PolicyDocument>>,
        combining: CombiningAlgorithm,
    ) -> Self {
        debug_assert!(
            children.iter().all(|c| c.kind == PolicyKind::Policy),
            "a PolicySet's children must all be Policy documents"
        );
        Self {
            id,
            name: name.into(),
            kind: PolicyKind::PolicySet,
            target_expr: target_expr.map(Arc::new),
            where_expr: None,
            entitlement: Decision::NotApplicable,
            obligations: Vec::new(),
            advice: Vec::new(),
            transform: None,
            imports: BTreeMap::new(),
            children,
            combining: Some(combining),
        }
    }

    pub fn is_set(&self) -> bool {
        self.kind == PolicyKind::PolicySet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_policy_has_no_children() {
        let p = PolicyDocument::policy(
            PolicyId::new("p1"),
            "permit-all",
            None,
            None,
            Decision::Permit,
            Vec::new(),
            Vec::new(),
            None,
        );
        assert!(p.children.is_empty());
        assert!(!p.is_set());
    }

    #[test]
    fn generate_produces_distinct_ids() {
        assert_ne!(PolicyId::generate(), PolicyId::generate());
    }

    #[test]
    #[should_panic(expected = "PERMIT or DENY")]
    fn leaf_policy_entitlement_must_be_permit_or_deny() {
        PolicyDocument::policy(
            PolicyId::new("bad"),
            "bad",
            None,
            None,
            Decision::NotApplicable,
            Vec::new(),
            Vec::new(),
            None,
        );
    }
}
