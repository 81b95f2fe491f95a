//! DTOs for the `combine_decisions` vertical slice.

pub use sapl_kernel::{
    AuthorizationDecision, CombiningAlgorithm, Decision, ErrorHandling, PolicyId, VotingMode,
};
