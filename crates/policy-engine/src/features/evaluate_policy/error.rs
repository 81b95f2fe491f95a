//! Feature-scoped error for `evaluate_policy`, wrapping the kernel error
//! taxonomy the same way every other vertical-slice `error.rs` module does
//! in this workspace.

use sapl_kernel::{EvaluationError, ObligationError};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvaluatePolicyError {
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Obligation(#[from] ObligationError),
}
