//! Policy AST evaluator (C4), target indexer / PRP (C5), and combining
//! algorithms (C6) for the SAPL streaming policy engine.
//!
//! Organised as vertical-slice features, one per externally invokable
//! operation, following the same `dto.rs`/`error.rs`/`use_case.rs`
//! convention the workspace's retained reference crates use.

pub mod document;
pub mod features;

pub use document::evaluate_document;
pub use features::build_index::{BuildIndexError, IndexMode, IndexedDocument, TargetIndex};
pub use features::combine_decisions::{combine_decisions, CombineDecisionsError};
pub use features::evaluate_policy::{evaluate_policy, EvaluatePolicyError};
