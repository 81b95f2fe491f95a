//! Facade-level error taxonomy (spec §7): registration/configuration
//! errors are fatal and surface synchronously at construction time, never
//! from `decide`/`decide_once`/`decide_all`/`decide_each` themselves.

use sapl_kernel::{ConfigurationError, RegistrationError};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}
