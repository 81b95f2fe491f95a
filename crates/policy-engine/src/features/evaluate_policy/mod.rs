//! Single-policy evaluation feature (C4, spec §4.4).

pub mod dto;
pub mod error;
pub mod evaluator;
pub mod use_case;

pub use dto::*;
pub use error::EvaluatePolicyError;
pub use use_case::evaluate_policy;
