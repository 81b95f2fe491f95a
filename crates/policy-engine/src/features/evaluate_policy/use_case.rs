//! `evaluate_policy` use case (C4, spec §4.4): folds a single leaf
//! `Policy` document's target/where/obligations/advice/transform into the
//! reactive `AuthorizationDecision` stream the combiner consumes.
//!
//! Mirrors the teacher's single `is_authorized` entry point
//! (`AuthorizationEngine::is_authorized`) generalised from one-shot to
//! reactive, and split into the vertical-slice `use_case.rs` convention.

use crate::features::evaluate_policy::evaluator::{evaluate, lift_n, once};
use futures::stream::{BoxStream, StreamExt};
use sapl_kernel::domain::context::EvaluationContext;
use sapl_kernel::domain::decision::{AuthorizationDecision, Decision};
use sapl_kernel::domain::policy::PolicyDocument;
use sapl_kernel::domain::value::Val;
use std::sync::Arc;

/// Evaluates a leaf `Policy` document's target, then (only while the
/// target holds) its `where`/obligations/advice/transform, against `ctx`.
///
/// Per spec §4.4 step 2 and §7: the target or `where` clause resolving to
/// `Error` is `INDETERMINATE`; resolving to any other non-`true` value
/// (`false`, `Undefined`) is `NOT_APPLICABLE` (decided ambiguity, see
/// `DESIGN.md`).
pub fn evaluate_policy(document: Arc<PolicyDocument>, ctx: EvaluationContext) -> BoxStream<'static, AuthorizationDecision> {
    let target_stream = match &document.target_expr {
        Some(expr) => evaluate(expr.clone(), ctx.clone()),
        None => once(Val::bool(true)),
    };
    let document_for_map = document.clone();
    let ctx_for_map = ctx.clone();
    Box::pin(target_stream.flat_map(move |target_val| {
        evaluate_after_target(document_for_map.clone(), ctx_for_map.clone(), target_val)
    }))
}

fn evaluate_after_target(
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
    let where_stream = match &document.where_expr {
        Some(expr) => evaluate(expr.clone(), ctx.clone()),
        None => once(Val::bool(true)),
    };
    let document = document.clone();
    Box::pin(where_stream.flat_map(move |where_val| evaluate_after_where(document.clone(), ctx.clone(), where_val)))
}

fn evaluate_after_where(
    document: Arc<PolicyDocument>,
    ctx: EvaluationContext,
    where_val: Val,
) -> BoxStream<'static, AuthorizationDecision> {
    if where_val.is_error() {
        return once_decision(AuthorizationDecision::indeterminate(Vec::new()));
    }
    if where_val.as_bool() != Some(true) {
        return once_decision(AuthorizationDecision::not_applicable());
    }

    let obligation_streams: Vec<_> = document
        .obligations
        .iter()
        .map(|e| evaluate(e.clone(), ctx.clone()))
        .collect();
    let advice_streams: Vec<_> = document.advice.iter().map(|e| evaluate(e.clone(), ctx.clone())).collect();
    let transform_stream = document
        .transform
        .as_ref()
        .map(|e| evaluate(e.clone(), ctx.clone()))
        .unwrap_or_else(|| once(Val::undefined()));

    let n_obligations = obligation_streams.len();
    let n_advice = advice_streams.len();
    let entitlement = document.entitlement;

    let mut all_streams = Vec::with_capacity(n_obligations + n_advice + 1);
    all_streams.extend(obligation_streams);
    all_streams.extend(advice_streams);
    all_streams.push(transform_stream);

    lift_n(all_streams, move |latest| {
        let obligations = &latest[0..n_obligations];
        let advice = &latest[n_obligations..n_obligations + n_advice];
        let transform = &latest[n_obligations + n_advice];
        fold_effect_clauses(entitlement, obligations, advice, transform)
    })
    .map(|v| decision_from_folded_val(entitlement, v))
    .boxed()
}

/// `fold_effect_clauses` packs the tick's obligation/advice/transform
/// values into a single `Val::Array` so `lift_n`'s `Val -> Val` shape can
/// carry the whole tuple through one combinator; `decision_from_folded_val`
/// unpacks it back into an `AuthorizationDecision` (spec §4.4 steps 3-8).
/// Only obligations (step 5) and transform (step 7) errors force
/// `INDETERMINATE` (spec §3, §7); an advice expression (step 6) that
/// evaluates to `Error` is logged and dropped rather than propagated, so it
/// can never flip an otherwise-valid decision.
fn fold_effect_clauses(entitlement: Decision, obligations: &[Val], advice: &[Val], transform: &Val) -> Val {
    if let Some(e) = Val::first_error(obligations.iter().chain(std::iter::once(transform))) {
        return e.clone();
    }
    let advice: Vec<Val> = advice
        .iter()
        .filter(|v| {
            if v.is_error() {
                tracing::warn!(error = ?v, "advice expression evaluated to an error; dropping");
                false
            } else {
                true
            }
        })
        .cloned()
        .collect();
    let mut packed = Vec::with_capacity(2 + obligations.len() + advice.len());
    packed.push(Val::number(entitlement_tag(entitlement)));
    packed.push(transform.clone());
    packed.push(Val::array(obligations.to_vec()));
    packed.push(Val::array(advice));
    Val::array(packed)
}

fn entitlement_tag(entitlement: Decision) -> i64 {
    match entitlement {
        Decision::Permit => 1,
        _ => 0,
    }
}

fn decision_from_folded_val(entitlement: Decision, folded: Val) -> AuthorizationDecision {
    if folded.is_error() {
        return AuthorizationDecision::indeterminate(Vec::new());
    }
    let parts = match folded.as_array() {
        Some(parts) if parts.len() == 4 => parts,
        _ => return AuthorizationDecision::indeterminate(Vec::new()),
    };
    let transform = &parts[1];
    let obligations = parts[2].as_array().map(|a| a.to_vec()).unwrap_or_default();
    let advice = parts[3].as_array().map(|a| a.to_vec()).unwrap_or_default();

    match entitlement {
        Decision::Permit => {
            let resource = if transform.is_undefined() { None } else { Some(transform.clone()) };
            AuthorizationDecision::permit(resource, obligations, advice)
        }
        Decision::Deny => AuthorizationDecision::deny(advice),
        // A leaf policy's entitlement is asserted PERMIT|DENY at
        // construction (`PolicyDocument::policy`); unreachable in practice.
        _ => AuthorizationDecision::indeterminate(advice),
    }
}

fn once_decision(d: AuthorizationDecision) -> BoxStream<'static, AuthorizationDecision> {
    Box::pin(futures::stream::once(async move { d }))
}
