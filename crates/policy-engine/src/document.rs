//! Recursive `PolicyDocument` evaluation: a leaf `Policy` evaluates
//! directly via `evaluate_policy`; a `PolicySet` first evaluates its own
//! target as a pre-filter, then recursively evaluates and combines its
//! children under its own `combining` algorithm (spec §3: "a set's
//! combining governs its children only").
//!
//! This is the seam between C4/C6 and the engine facade (C7): the facade
//! only ever calls `evaluate_document` on each top-level candidate the PRP
//! returns, then combines those top-level streams under the PDP-level
//! algorithm -- it never needs to know whether a candidate is a leaf or a
//! set.

use crate::features::combine_decisions::combiner;
use crate::features::evaluate_policy::evaluator::once;
use crate::features::evaluate_policy::use_case::evaluate_policy;
use futures::stream::{BoxStream, StreamExt};
use sapl_kernel::domain::context::EvaluationContext;
use sapl_kernel::domain::decision::AuthorizationDecision;
use sapl_kernel::domain::policy::{PolicyDocument, PolicyKind};
use sapl_kernel::domain::value::Val;
use std::sync::Arc;

/// Evaluates any `PolicyDocument` (leaf or set) against `ctx`.
pub fn evaluate_document(document: Arc<PolicyDocument>, ctx: EvaluationContext) -> BoxStream<'static, AuthorizationDecision> {
    match document.kind {
        PolicyKind::Policy => evaluate_policy(document, ctx),
        PolicyKind::PolicySet => evaluate_policy_set(document, ctx),
    }
}

fn evaluate_policy_set(document: Arc<PolicyDocument>, ctx: EvaluationContext) -> BoxStream<'static, AuthorizationDecision> {
    let target_stream = match &document.target_expr {
        Some(expr) => crate::features::evaluate_policy::evaluator::evaluate(expr.clone(), ctx.clone()),
        None => once(Val::bool(true)),
    };
    Box::pin(target_stream.flat_map(move |target_val| evaluate_set_after_target(document.clone(), ctx.clone(), target_val)))
}

fn evaluate_set_after_target(
    document: Arc<PolicyDocument>,
    ctx: EvaluationContext,
    target_val: Val,
) -> BoxStream<'static, AuthorizationDecision> {
    if target_val.is_error() {
        return once_decision(AuthorizationDecision::indeterminate(Vec::new()));
    }
    if target_val.as_bool() != Some(true) {
        return once_decision(AuthorizationDecision::not_applicable());
    }
    let algorithm = document
        .combining
        .expect("a PolicySet document always carries a combining algorithm");
    let children: Vec<BoxStream<'static, AuthorizationDecision>> = document
        .children
        .iter()
        .map(|child| evaluate_document(child.clone(), ctx.clone()))
        .collect();
    combiner::combine(children, algorithm)
}

fn once_decision(d: AuthorizationDecision) -> BoxStream<'static, AuthorizationDecision> {
    Box::pin(futures::stream::once(async move { d }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sapl_kernel::domain::decision::Decision;
    use sapl_kernel::domain::policy::{CombiningAlgorithm, ErrorHandling, PolicyId, VotingMode};
    use sapl_kernel::ports::tests_support::{NullBroker, NullRegistry};
    use std::collections::HashMap;

    fn ctx() -> EvaluationContext {
        EvaluationContext::root(
            HashMap::new(),
            HashMap::new(),
            Arc::new(NullRegistry),
            Arc::new(NullBroker),
        )
    }

    fn permit_policy(id: &str) -> Arc<PolicyDocument> {
        Arc::new(PolicyDocument::policy(
            PolicyId::new(id),
            id,
            None,
            None,
            Decision::Permit,
            Vec::new(),
            Vec::new(),
            None,
        ))
    }

    fn deny_policy(id: &str) -> Arc<PolicyDocument> {
        Arc::new(PolicyDocument::policy(
            PolicyId::new(id),
            id,
            None,
            None,
            Decision::Deny,
            Vec::new(),
            Vec::new(),
            None,
        ))
    }

    #[tokio::test]
    async fn policy_set_combines_its_children_under_its_own_algorithm() {
        let set = Arc::new(PolicyDocument::policy_set(
            PolicyId::new("set1"),
            "set1",
            None,
            vec![deny_policy("p1"), permit_policy("p2")],
            CombiningAlgorithm::new(VotingMode::DenyOverrides, Decision::NotApplicable, ErrorHandling::Propagate),
        ));
        let decision = evaluate_document(set, ctx()).next().await.unwrap();
        assert_eq!(decision.decision, Decision::Deny);
    }

    #[tokio::test]
    async fn policy_set_target_false_is_not_applicable_without_evaluating_children() {
        let set = Arc::new(PolicyDocument::policy_set(
            PolicyId::new("set1"),
            "set1",
            Some(sapl_kernel::domain::expr::Expr::literal(Val::bool(false))),
            vec![permit_policy("p1")],
            CombiningAlgorithm::new(VotingMode::PermitOverrides, Decision::NotApplicable, ErrorHandling::Propagate),
        ));
        let decision = evaluate_document(set, ctx()).next().await.unwrap();
        assert_eq!(decision.decision, Decision::NotApplicable);
    }
}
