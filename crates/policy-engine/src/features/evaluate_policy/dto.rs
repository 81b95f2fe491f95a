//! DTOs for the `evaluate_policy` vertical slice. Re-exports the kernel
//! shapes this feature consumes/produces so callers only need one `use`
//! line, matching the teacher's per-feature `dto.rs` convention.

pub use sapl_kernel::{AuthorizationDecision, Decision, PolicyDocument};
