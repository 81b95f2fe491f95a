//! DTOs for the `build_index` vertical slice.

pub use sapl_kernel::{AuthorizationSubscription, PolicyDocument, PolicyId};

use sapl_kernel::{ConjunctiveClause, DisjunctiveFormula, Literal};
use std::sync::Arc;

/// A policy (or policy set) document paired with its canonicalised target
/// formula, what the index actually stores per `PolicyId` (spec §4.5).
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub document: Arc<PolicyDocument>,
    pub formula: DisjunctiveFormula,
}

/// Whether the index is currently buffering `put`/`remove` calls or
/// applying them immediately (spec §4.5: "Live-mode flag separates
/// *loading* ... from *serving*").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Loading,
    Serving,
}

pub(crate) fn predicate_holds(formula: &DisjunctiveFormula, truth: &[Option<bool>]) -> bool {
    if formula.is_contradiction() {
        return false;
    }
    formula.clauses().iter().any(|clause| clause_holds(clause, truth))
}

fn clause_holds(clause: &ConjunctiveClause, truth: &[Option<bool>]) -> bool {
    clause.literals().iter().all(|lit| literal_holds(lit, truth))
}

/// A literal "holds" under over-approximate candidate lookup (spec §4.5:
/// "over-approximation is allowed, under-approximation is not") when its
/// predicate's evaluated truth is unknown (the predicate errored, or
/// resolved to a non-boolean) -- unknown always counts as "might hold",
/// regardless of whether the literal is negated.
fn literal_holds(lit: &Literal, truth: &[Option<bool>]) -> bool {
    match truth.get(lit.predicate.0 as usize).copied().flatten() {
        Some(b) => {
            if lit.negated {
                !b
            } else {
                b
            }
        }
        None => true,
    }
}
