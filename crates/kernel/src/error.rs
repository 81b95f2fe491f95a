//! Error taxonomy (spec §7).
//!
//! Per-policy errors (`EvaluationError`, `ObligationError`) are local and
//! become `INDETERMINATE`; broker errors (`AttributeError`) are stream
//! values, never termination; registration/configuration errors are fatal
//! and surface synchronously at construction time.

use thiserror::Error;

/// Produced by expression evaluation. Becomes `Val::Error`; a policy whose
/// target/where/transform evaluates to `Error` fails with `INDETERMINATE`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("expression evaluation failed: {0}")]
    Failed(String),
    #[error("duplicate top-level variable declaration: {0}")]
    DuplicateTopLevelVariable(String),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),
}

/// Produced by the broker when an upstream fails. Surfaces as `Val::Error`
/// in the stream; does not terminate the subscription.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttributeError {
    #[error("attribute provider for '{name}' failed: {message}")]
    ProviderFailed { name: String, message: String },
    #[error("attribute stream for '{0}' timed out waiting for an initial value")]
    InitialTimeout(String),
}

/// Produced during obligation expression evaluation on `PERMIT`. Forces the
/// policy to `INDETERMINATE` -- never a silent `PERMIT` (spec §7).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("obligation expression failed: {0}")]
pub struct ObligationError(pub String);

/// Produced synchronously at engine construction when a function/attribute
/// name is malformed or duplicated (spec §7).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error(
        "'{0}' is not a valid fully qualified name (expected [A-Za-z][A-Za-z0-9]*('.'[A-Za-z][A-Za-z0-9]*){{1,9}})"
    )]
    MalformedName(String),
    #[error("'{0}' is already registered")]
    Duplicate(String),
}

/// Produced at construction for a bad combining algorithm or invalid PDP
/// configuration (spec §7).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("invalid combining algorithm configuration: {0}")]
    InvalidCombiningAlgorithm(String),
    #[error("invalid PDP configuration: {0}")]
    InvalidPdpConfiguration(String),
}

/// The fully qualified name pattern required by spec §7:
/// `[A-Za-z][A-Za-z0-9]*('.'[A-Za-z][A-Za-z0-9]*){1,9}` -- a leading
/// segment plus one to nine additional dotted segments, each starting with
/// a letter. Implemented by hand (no `regex` dependency needed for this one
/// shape) so `RegistrationError::MalformedName` can be raised synchronously
/// without pulling in a regex engine for a single fixed pattern.
pub fn is_valid_fq_name(name: &str) -> bool {
    let segments: Vec<&str> = name.split('.').collect();
    if !(2..=10).contains(&segments.len()) {
        return false;
    }
    segments.iter().all(|segment| {
        let mut chars = segment.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => {
                chars.all(|c| c.is_ascii_alphanumeric())
            }
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_fq_names_are_accepted() {
        assert!(is_valid_fq_name("org.example.attr"));
        assert!(is_valid_fq_name("a.b"));
    }

    #[test]
    fn single_segment_name_is_rejected() {
        assert!(!is_valid_fq_name("attr"));
    }

    #[test]
    fn name_with_leading_digit_segment_is_rejected() {
        assert!(!is_valid_fq_name("org.1attr"));
    }

    #[test]
    fn name_with_too_many_segments_is_rejected() {
        let too_long = (0..12)
            .map(|i| format!("s{i}"))
            .collect::<Vec<_>>()
            .join(".");
        assert!(!is_valid_fq_name(&too_long));
    }
}
