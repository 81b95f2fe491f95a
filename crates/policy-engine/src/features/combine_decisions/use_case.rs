//! `combine_decisions` use case (C6, spec §4.6): thin wrapper around
//! `combiner::combine` giving the vertical slice its conventional
//! `use_case.rs` entry point.

use crate::features::combine_decisions::combiner;
use futures::stream::BoxStream;
use sapl_kernel::domain::decision::AuthorizationDecision;
use sapl_kernel::domain::policy::CombiningAlgorithm;

/// Combines `candidates`, one stream per candidate policy/policy-set in
/// submission order, under `algorithm`.
pub fn combine_decisions(
    candidates: Vec<BoxStream<'static, AuthorizationDecision>>,
    algorithm: CombiningAlgorithm,
) -> BoxStream<'static, AuthorizationDecision> {
    combiner::combine(candidates, algorithm)
}
