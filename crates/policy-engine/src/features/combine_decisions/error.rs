//! Feature-scoped error for `combine_decisions`.

use sapl_kernel::ConfigurationError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CombineDecisionsError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}
