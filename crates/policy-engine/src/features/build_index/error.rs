//! Feature-scoped error for `build_index`.

use sapl_kernel::RegistrationError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildIndexError {
    #[error("policy {0} is already indexed")]
    DuplicatePolicyId(String),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
}
