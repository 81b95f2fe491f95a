//! Combining algorithms (C6, spec §4.6): fold the per-policy decision
//! streams of *n* candidate policies (or a `PolicySet`'s children) into one
//! decision stream, under a named `CombiningAlgorithm`.
//!
//! Grounded in the same "recompute on any tick, fold latest values" model
//! as `evaluate_policy::evaluator::lift_n`, generalised from `Val` to
//! `AuthorizationDecision` -- the per-policy streams here are already the
//! output of C4, so the combiner has no expressions left to evaluate, only
//! four-valued decisions to fold.

use async_stream::stream;
use futures::stream::{self, BoxStream, StreamExt};
use sapl_kernel::domain::policy::PolicyId;
use sapl_kernel::domain::value::Val;
use sapl_kernel::{AuthorizationDecision, CombiningAlgorithm, Decision, ErrorHandling, VotingMode};

/// Combines `streams`, in *submission order* (index 0 is first-submitted;
/// `FIRST_APPLICABLE`'s ordering is document order, not arrival order,
/// spec §4.5/§5), under `algorithm`. Suppresses consecutive structurally
/// equal emissions (spec §4.6).
pub fn combine(
    streams: Vec<BoxStream<'static, AuthorizationDecision>>,
    algorithm: CombiningAlgorithm,
) -> BoxStream<'static, AuthorizationDecision> {
    let n = streams.len();
    if n == 0 {
        let default = AuthorizationDecision::from_decision(algorithm.default_decision);
        return Box::pin(stream::once(async move { default }));
    }
    let tagged: Vec<BoxStream<'static, (usize, AuthorizationDecision)>> = streams
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.map(move |d| (i, d)).boxed())
        .collect();
    let mut merged = stream::select_all(tagged);
    Box::pin(stream! {
        let mut latest = vec![AuthorizationDecision::not_applicable(); n];
        let mut last_emitted: Option<AuthorizationDecision> = None;
        while let Some((i, d)) = merged.next().await {
            latest[i] = d;
            let combined = fold_tick(&latest, algorithm);
            if last_emitted.as_ref() != Some(&combined) {
                last_emitted = Some(combined.clone());
                yield combined;
            }
        }
    })
}

/// Single-tick fold, exposed separately so both `combine` above and
/// property tests (spec §8 properties 2-3) can exercise the pure folding
/// logic without constructing streams.
pub fn fold_tick(latest: &[AuthorizationDecision], algorithm: CombiningAlgorithm) -> AuthorizationDecision {
    if latest.is_empty() {
        return AuthorizationDecision::from_decision(algorithm.default_decision);
    }
    let effective: Vec<Decision> = latest
        .iter()
        .map(|d| effective_decision(d.decision, algorithm.error_handling))
        .collect();

    match algorithm.voting_mode {
        VotingMode::DenyOverrides => fold_deny_overrides(latest, &effective),
        VotingMode::PermitOverrides => fold_permit_overrides(latest, &effective),
        VotingMode::FirstApplicable => fold_first_applicable(latest, &effective),
        VotingMode::OnlyOneApplicable => {
            fold_only_one_applicable(latest, &effective, algorithm.only_one_applicable_counts_indeterminate)
        }
        VotingMode::DenyUnlessPermit => fold_deny_unless_permit(latest, &effective),
        VotingMode::PermitUnlessDeny => fold_permit_unless_deny(latest, &effective),
    }
}

/// Maps a per-policy decision through the combiner's error-handling mode
/// (spec §4.6): `TreatAsNotApplicable` suppresses `INDETERMINATE` inputs;
/// `Propagate`/`TreatAsIndeterminate` both keep it as `INDETERMINATE`
/// (documented distinctly in the spec even though currently identical).
fn effective_decision(decision: Decision, error_handling: ErrorHandling) -> Decision {
    if decision == Decision::Indeterminate && error_handling == ErrorHandling::TreatAsNotApplicable {
        Decision::NotApplicable
    } else {
        decision
    }
}

fn fold_deny_overrides(latest: &[AuthorizationDecision], effective: &[Decision]) -> AuthorizationDecision {
    if let Some(i) = effective.iter().position(|d| *d == Decision::Deny) {
        return latest[i].clone();
    }
    if let Some(i) = effective.iter().position(|d| *d == Decision::Indeterminate) {
        return AuthorizationDecision::indeterminate(latest[i].advice.clone().unwrap_or_default());
    }
    if let Some(i) = effective.iter().position(|d| *d == Decision::Permit) {
        return permit_with_obligations(latest, effective, i);
    }
    AuthorizationDecision::not_applicable()
}

fn fold_permit_overrides(latest: &[AuthorizationDecision], effective: &[Decision]) -> AuthorizationDecision {
    if let Some(i) = effective.iter().position(|d| *d == Decision::Permit) {
        return permit_with_obligations(latest, effective, i);
    }
    if let Some(i) = effective.iter().position(|d| *d == Decision::Indeterminate) {
        return AuthorizationDecision::indeterminate(latest[i].advice.clone().unwrap_or_default());
    }
    if let Some(i) = effective.iter().position(|d| *d == Decision::Deny) {
        return latest[i].clone();
    }
    AuthorizationDecision::not_applicable()
}

/// Document-submission-order scan: the first non-`NOT_APPLICABLE` wins;
/// `INDETERMINATE` does not skip (spec §4.6).
fn fold_first_applicable(latest: &[AuthorizationDecision], effective: &[Decision]) -> AuthorizationDecision {
    for (i, d) in effective.iter().enumerate() {
        match d {
            Decision::Permit => return permit_with_obligations(latest, effective, i),
            Decision::Deny => return latest[i].clone(),
            Decision::Indeterminate => {
                return AuthorizationDecision::indeterminate(latest[i].advice.clone().unwrap_or_default());
            }
            Decision::NotApplicable => continue,
        }
    }
    AuthorizationDecision::not_applicable()
}

fn fold_only_one_applicable(
    latest: &[AuthorizationDecision],
    effective: &[Decision],
    counts_indeterminate: bool,
) -> AuthorizationDecision {
    let applicable: Vec<usize> = effective
        .iter()
        .enumerate()
        .filter(|(_, d)| match d {
            Decision::NotApplicable => false,
            Decision::Indeterminate => counts_indeterminate,
            _ => true,
        })
        .map(|(i, _)| i)
        .collect();
    if applicable.len() == 1 {
        let i = applicable[0];
        return match effective[i] {
            Decision::Permit => permit_with_obligations(latest, effective, i),
            _ => latest[i].clone(),
        };
    }
    AuthorizationDecision::indeterminate(aggregate_advice(latest))
}

/// Never emits `INDETERMINATE`/`NOT_APPLICABLE` (spec §4.6): any `PERMIT`
/// wins, otherwise `DENY`.
fn fold_deny_unless_permit(latest: &[AuthorizationDecision], effective: &[Decision]) -> AuthorizationDecision {
    if let Some(i) = effective.iter().position(|d| *d == Decision::Permit) {
        return permit_with_obligations(latest, effective, i);
    }
    AuthorizationDecision::deny(aggregate_advice(latest))
}

/// Symmetric to `fold_deny_unless_permit`: any `DENY` wins, otherwise
/// `PERMIT`.
fn fold_permit_unless_deny(latest: &[AuthorizationDecision], effective: &[Decision]) -> AuthorizationDecision {
    if let Some(i) = effective.iter().position(|d| *d == Decision::Deny) {
        return latest[i].clone();
    }
    let permit_index = effective.iter().position(|d| *d == Decision::Permit);
    permit_with_obligations(latest, effective, permit_index.unwrap_or(0))
}

/// Builds the combined `PERMIT`, aggregating obligations from every policy
/// whose effective decision is `PERMIT` (deduplicated by structural
/// equality) and advice from every policy regardless of decision (spec
/// §4.6). Takes the resource of the first (submission-order) permit-voting
/// policy that carries one -- the spec does not define a multi-resource
/// merge rule, so first-wins is the resolved choice (`DESIGN.md`).
fn permit_with_obligations(
    latest: &[AuthorizationDecision],
    effective: &[Decision],
    preferred: usize,
) -> AuthorizationDecision {
    let mut obligations: Vec<Val> = Vec::new();
    for (i, d) in effective.iter().enumerate() {
        if *d != Decision::Permit {
            continue;
        }
        if let Some(obls) = &latest[i].obligations {
            for o in obls {
                if !obligations.contains(o) {
                    obligations.push(o.clone());
                }
            }
        }
    }
    let resource = effective
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == Decision::Permit)
        .find_map(|(i, _)| latest[i].resource.clone())
        .or_else(|| latest.get(preferred).and_then(|d| d.resource.clone()));
    AuthorizationDecision::permit(resource, obligations, aggregate_advice(latest))
}

fn aggregate_advice(latest: &[AuthorizationDecision]) -> Vec<Val> {
    let mut advice: Vec<Val> = Vec::new();
    for d in latest {
        if let Some(a) = &d.advice {
            for v in a {
                if !advice.contains(v) {
                    advice.push(v.clone());
                }
            }
        }
    }
    advice
}

/// Document ids paired 1:1 with the streams passed to `combine`, used only
/// to keep call sites honest about submission order when candidates are
/// gathered from a `HashMap`-backed catalog (no runtime behavior depends on
/// `PolicyId` itself here; the combiner only ever sees positional order).
pub type SubmissionOrder = Vec<PolicyId>;

#[cfg(test)]
mod tests {
    use super::*;
    use sapl_kernel::domain::policy::ErrorHandling as EH;

    fn algo(mode: VotingMode) -> CombiningAlgorithm {
        CombiningAlgorithm::new(mode, Decision::NotApplicable, EH::Propagate)
    }

    #[test]
    fn deny_overrides_picks_deny_over_permit() {
        let latest = vec![
            AuthorizationDecision::permit(None, vec![], vec![]),
            AuthorizationDecision::deny(vec![]),
        ];
        let result = fold_tick(&latest, algo(VotingMode::DenyOverrides));
        assert_eq!(result.decision, Decision::Deny);
    }

    #[test]
    fn permit_overrides_picks_permit_over_deny() {
        let latest = vec![
            AuthorizationDecision::deny(vec![]),
            AuthorizationDecision::permit(None, vec![], vec![]),
        ];
        let result = fold_tick(&latest, algo(VotingMode::PermitOverrides));
        assert_eq!(result.decision, Decision::Permit);
    }

    #[test]
    fn first_applicable_on_singleton_equals_that_decision() {
        let latest = vec![AuthorizationDecision::permit(None, vec![], vec![])];
        let result = fold_tick(&latest, algo(VotingMode::FirstApplicable));
        assert_eq!(result, latest[0]);
    }

    #[test]
    fn first_applicable_respects_submission_order_not_strength() {
        let latest = vec![
            AuthorizationDecision::deny(vec![]),
            AuthorizationDecision::permit(None, vec![], vec![]),
        ];
        let result = fold_tick(&latest, algo(VotingMode::FirstApplicable));
        assert_eq!(result.decision, Decision::Deny);
    }

    #[test]
    fn deny_unless_permit_never_emits_indeterminate_or_not_applicable() {
        let latest = vec![AuthorizationDecision::indeterminate(vec![])];
        let result = fold_tick(&latest, algo(VotingMode::DenyUnlessPermit));
        assert_eq!(result.decision, Decision::Deny);
    }

    #[test]
    fn permit_unless_deny_never_emits_indeterminate_or_not_applicable() {
        let latest = vec![AuthorizationDecision::not_applicable()];
        let result = fold_tick(&latest, algo(VotingMode::PermitUnlessDeny));
        assert_eq!(result.decision, Decision::Permit);
    }

    #[test]
    fn only_one_applicable_with_two_candidates_is_indeterminate() {
        let latest = vec![
            AuthorizationDecision::permit(None, vec![], vec![]),
            AuthorizationDecision::deny(vec![]),
        ];
        let result = fold_tick(&latest, algo(VotingMode::OnlyOneApplicable));
        assert_eq!(result.decision, Decision::Indeterminate);
    }

    #[test]
    fn only_one_applicable_with_exactly_one_returns_it() {
        let latest = vec![
            AuthorizationDecision::not_applicable(),
            AuthorizationDecision::deny(vec![]),
        ];
        let result = fold_tick(&latest, algo(VotingMode::OnlyOneApplicable));
        assert_eq!(result.decision, Decision::Deny);
    }

    #[test]
    fn error_handling_treat_as_not_applicable_suppresses_indeterminate() {
        let latest = vec![AuthorizationDecision::indeterminate(vec![])];
        let algorithm =
            CombiningAlgorithm::new(VotingMode::DenyOverrides, Decision::NotApplicable, EH::TreatAsNotApplicable);
        let result = fold_tick(&latest, algorithm);
        assert_eq!(result.decision, Decision::NotApplicable);
    }

    #[test]
    fn obligations_are_only_collected_from_permit_voting_policies() {
        let latest = vec![
            AuthorizationDecision::permit(None, vec![Val::text("log")], vec![]),
            AuthorizationDecision::deny(vec![]),
        ];
        let result = fold_tick(&latest, algo(VotingMode::PermitOverrides));
        assert_eq!(result.obligations, Some(vec![Val::text("log")]));
    }
}

/// Property tests for spec §8 property 3 ("combiner algebra"): generates
/// arbitrary multisets of bare `Decision`s (obligations/advice/resource
/// stripped so permutation can be checked against the `.decision` field
/// alone -- permuting the input reorders obligation-collection order too,
/// which `AuthorizationDecision`'s derived equality would otherwise treat
/// as a distinct result even though the decision itself is unchanged).
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use sapl_kernel::domain::policy::ErrorHandling as EH;

    fn decision_strategy() -> impl Strategy<Value = Decision> {
        prop_oneof![
            Just(Decision::Permit),
            Just(Decision::Deny),
            Just(Decision::NotApplicable),
            Just(Decision::Indeterminate),
        ]
    }

    fn combine_pair(a: Decision, b: Decision, algorithm: CombiningAlgorithm) -> Decision {
        let latest = vec![
            AuthorizationDecision::from_decision(a),
            AuthorizationDecision::from_decision(b),
        ];
        fold_tick(&latest, algorithm).decision
    }

    fn algo(mode: VotingMode) -> CombiningAlgorithm {
        CombiningAlgorithm::new(mode, Decision::NotApplicable, EH::Propagate)
    }

    proptest! {
        // DENY_OVERRIDES and PERMIT_OVERRIDES are commutative over the
        // resulting decision: swapping two inputs never changes the winner.
        #[test]
        fn deny_overrides_is_commutative(a in decision_strategy(), b in decision_strategy()) {
            let algorithm = algo(VotingMode::DenyOverrides);
            prop_assert_eq!(combine_pair(a, b, algorithm), combine_pair(b, a, algorithm));
        }

        #[test]
        fn permit_overrides_is_commutative(a in decision_strategy(), b in decision_strategy()) {
            let algorithm = algo(VotingMode::PermitOverrides);
            prop_assert_eq!(combine_pair(a, b, algorithm), combine_pair(b, a, algorithm));
        }

        // Associativity: grouping three inputs left-to-right or
        // right-to-left yields the same winner.
        #[test]
        fn deny_overrides_is_associative(a in decision_strategy(), b in decision_strategy(), c in decision_strategy()) {
            let algorithm = algo(VotingMode::DenyOverrides);
            let left = combine_pair(combine_pair(a, b, algorithm), c, algorithm);
            let right = combine_pair(a, combine_pair(b, c, algorithm), algorithm);
            prop_assert_eq!(left, right);
        }

        #[test]
        fn permit_overrides_is_associative(a in decision_strategy(), b in decision_strategy(), c in decision_strategy()) {
            let algorithm = algo(VotingMode::PermitOverrides);
            let left = combine_pair(combine_pair(a, b, algorithm), c, algorithm);
            let right = combine_pair(a, combine_pair(b, c, algorithm), algorithm);
            prop_assert_eq!(left, right);
        }

        // DENY_UNLESS_PERMIT/PERMIT_UNLESS_DENY never emit INDETERMINATE or
        // NOT_APPLICABLE, for any multiset of inputs (spec §4.6).
        #[test]
        fn deny_unless_permit_never_emits_indeterminate_or_not_applicable(
            decisions in prop::collection::vec(decision_strategy(), 0..6)
        ) {
            let latest: Vec<AuthorizationDecision> =
                decisions.into_iter().map(AuthorizationDecision::from_decision).collect();
            let result = fold_tick(&latest, algo(VotingMode::DenyUnlessPermit));
            prop_assert!(matches!(result.decision, Decision::Permit | Decision::Deny));
        }

        #[test]
        fn permit_unless_deny_never_emits_indeterminate_or_not_applicable(
            decisions in prop::collection::vec(decision_strategy(), 0..6)
        ) {
            let latest: Vec<AuthorizationDecision> =
                decisions.into_iter().map(AuthorizationDecision::from_decision).collect();
            let result = fold_tick(&latest, algo(VotingMode::PermitUnlessDeny));
            prop_assert!(matches!(result.decision, Decision::Permit | Decision::Deny));
        }

        // FIRST_APPLICABLE on a singleton returns exactly that decision.
        #[test]
        fn first_applicable_on_singleton_equals_that_decision(d in decision_strategy()) {
            let latest = vec![AuthorizationDecision::from_decision(d)];
            let result = fold_tick(&latest, algo(VotingMode::FirstApplicable));
            prop_assert_eq!(result.decision, d);
        }
    }
}
