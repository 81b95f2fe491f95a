//! `DisjunctiveFormula` and friends (spec §3, §4.5).
//!
//! A target expression is canonicalised into a Disjunctive Normal Form
//! boolean formula over opaque predicate leaves. Predicates are stored in an
//! arena (`PredicateTable`) and referenced by integer index rather than
//! owned, so formulas never carry cycles and are cheap to share (spec §9:
//! "use arena + integer index rather than owning cycles").

use crate::domain::expr::Expr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// An index into a `PredicateTable`, identifying one extracted boolean
/// sub-expression. Two `PredicateId`s are equal iff they index the same
/// table slot; the table itself is responsible for deduplicating
/// structurally-equal predicates so that equal sub-expressions share one id
/// (spec §4.5: "a predicate-sharing index that evaluates each distinct
/// predicate once").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PredicateId(pub u32);

/// Arena owning every distinct predicate expression extracted while
/// canonicalising targets. Shared across all policies in one `TargetIndex`.
#[derive(Debug, Default)]
pub struct PredicateTable {
    predicates: Vec<Arc<Expr>>,
}

impl PredicateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `expr`, returning the id of an existing structurally-equal
    /// predicate if one is already present, or a freshly allocated id.
    pub fn intern(&mut self, expr: Expr) -> PredicateId {
        if let Some(pos) = self.predicates.iter().position(|p| p.as_ref() == &expr) {
            return PredicateId(pos as u32);
        }
        self.predicates.push(Arc::new(expr));
        PredicateId((self.predicates.len() - 1) as u32)
    }

    pub fn get(&self, id: PredicateId) -> Option<&Arc<Expr>> {
        self.predicates.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

/// A literal: a predicate reference, optionally negated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    pub predicate: PredicateId,
    pub negated: bool,
}

impl Literal {
    pub fn new(predicate: PredicateId, negated: bool) -> Self {
        Self { predicate, negated }
    }

    pub fn negate(self) -> Self {
        Self {
            predicate: self.predicate,
            negated: !self.negated,
        }
    }
}

/// An ordered-on-construction, order-insensitive-on-comparison set of
/// literals, ANDed together. Non-empty after construction (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConjunctiveClause {
    literals: BTreeSet<Literal>,
}

impl ConjunctiveClause {
    /// Builds a clause from literals, applying idempotence (duplicate
    /// literals dropped) per spec §4.5. Returns `None` if the clause
    /// contains both a literal and its negation (constant-false,
    /// dropped per spec §4.5) or if the input was empty.
    pub fn new(literals: impl IntoIterator<Item = Literal>) -> Option<Self> {
        let set: BTreeSet<Literal> = literals.into_iter().collect();
        if set.is_empty() {
            return None;
        }
        for lit in &set {
            if set.contains(&lit.negate()) {
                return None;
            }
        }
        Some(Self { literals: set })
    }

    pub fn literals(&self) -> &BTreeSet<Literal> {
        &self.literals
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    /// True iff `self`'s literal set is a superset of `other`'s, meaning
    /// `other` absorbs `self` (spec §4.5 absorption law: a clause containing
    /// another clause as a subset is dropped).
    pub fn is_superset_of(&self, other: &ConjunctiveClause) -> bool {
        self.literals.is_superset(&other.literals)
    }
}

/// An ordered set of conjunctive clauses, ORed together. Non-empty after
/// construction (spec §3). Two formulas are equal iff their reduced forms
/// have equal clause sets (order-insensitive) and each clause's literal set
/// is equal (order-insensitive) (spec §4.5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisjunctiveFormula {
    clauses: Vec<ConjunctiveClause>,
}

impl DisjunctiveFormula {
    /// Builds a reduced formula from raw clauses: drops clauses absorbed by
    /// another clause, and collapses to the tautology (a single empty-ish
    /// marker clause) if any input clause is constant-true. Because an
    /// always-true clause cannot be represented as a non-empty
    /// `ConjunctiveClause`, the tautology is represented as the sentinel
    /// `DisjunctiveFormula::tautology()` rather than a degenerate clause.
    pub fn new(clauses: Vec<ConjunctiveClause>) -> Self {
        Self::reduce_clauses(clauses)
    }

    /// The formula that is always true, the identity for `combine` and the
    /// absorbing element for `distribute` over AND (spec §8 property 4).
    pub fn tautology() -> Self {
        Self {
            clauses: vec![ConjunctiveClause {
                literals: BTreeSet::new(),
            }],
        }
    }

    pub fn is_tautology(&self) -> bool {
        self.clauses.len() == 1 && self.clauses[0].is_empty()
    }

    /// The formula that is always false: no clause can ever be satisfied.
    pub fn contradiction() -> Self {
        Self { clauses: vec![] }
    }

    pub fn is_contradiction(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[ConjunctiveClause] {
        &self.clauses
    }

    fn reduce_clauses(mut clauses: Vec<ConjunctiveClause>) -> Self {
        if clauses.iter().any(ConjunctiveClause::is_empty) {
            return Self::tautology();
        }
        // Idempotence across the clause list: dedup structurally-equal
        // clauses (order-insensitive) before absorption.
        clauses.sort_by(|a, b| {
            a.literals
                .iter()
                .collect::<Vec<_>>()
                .cmp(&b.literals.iter().collect::<Vec<_>>())
        });
        clauses.dedup();

        // Absorption: drop any clause that is a strict superset of another
        // (a superset clause is a stronger, redundant condition).
        let mut kept: Vec<ConjunctiveClause> = Vec::new();
        for candidate in clauses {
            if kept
                .iter()
                .any(|k| candidate.is_superset_of(k) && candidate != *k)
            {
                continue;
            }
            kept.retain(|k| !(k.is_superset_of(&candidate) && *k != candidate));
            kept.push(candidate);
        }
        Self { clauses: kept }
    }

    /// Negation via De Morgan's laws, pushing negation to literals and then
    /// distributing the resulting conjunction-of-disjunctions back out into
    /// DNF. `formula.negate().negate() == formula.reduce()` (spec §8
    /// property 4).
    pub fn negate(&self) -> DisjunctiveFormula {
        if self.is_tautology() {
            return DisjunctiveFormula::contradiction();
        }
        if self.is_contradiction() {
            return DisjunctiveFormula::tautology();
        }
        // Negated formula is the conjunction over clauses of the
        // disjunction of negated literals. Distribute via repeated
        // cartesian-product expansion (target formulas are small).
        let mut acc = vec![BTreeSet::<Literal>::new()];
        for clause in &self.clauses {
            let negated_lits: Vec<Literal> = clause.literals.iter().map(|l| l.negate()).collect();
            let mut next = Vec::with_capacity(acc.len() * negated_lits.len());
            for partial in &acc {
                for lit in &negated_lits {
                    let mut extended = partial.clone();
                    extended.insert(*lit);
                    next.push(extended);
                }
            }
            acc = next;
        }
        let clauses: Vec<ConjunctiveClause> = acc
            .into_iter()
            .filter_map(|set| ConjunctiveClause::new(set))
            .collect();
        Self::reduce_clauses(clauses)
    }

    /// OR-combination. The tautology absorbs any operand:
    /// `tautology.combine(x) == tautology` (spec §8 property 4).
    pub fn combine(&self, other: &DisjunctiveFormula) -> DisjunctiveFormula {
        if self.is_tautology() || other.is_tautology() {
            return DisjunctiveFormula::tautology();
        }
        let mut clauses = self.clauses.clone();
        clauses.extend(other.clauses.iter().cloned());
        Self::reduce_clauses(clauses)
    }

    /// AND-distribution. The tautology is the identity:
    /// `tautology.distribute(x) == x` (spec §8 property 4).
    pub fn distribute(&self, other: &DisjunctiveFormula) -> DisjunctiveFormula {
        if self.is_tautology() {
            return other.clone();
        }
        if other.is_tautology() {
            return self.clone();
        }
        if self.is_contradiction() || other.is_contradiction() {
            return DisjunctiveFormula::contradiction();
        }
        let mut clauses = Vec::with_capacity(self.clauses.len() * other.clauses.len());
        for a in &self.clauses {
            for b in &other.clauses {
                let union: BTreeSet<Literal> =
                    a.literals.union(&b.literals).copied().collect();
                if let Some(clause) = ConjunctiveClause::new(union) {
                    clauses.push(clause);
                }
                // if ConjunctiveClause::new returns None the conjunction
                // contains a literal and its negation: constant false,
                // contributes nothing to the disjunction.
            }
        }
        Self::reduce_clauses(clauses)
    }

    /// Reduction is idempotent: constructing a formula from its own clauses
    /// again yields an equal formula. Exposed for the property test of
    /// spec §8.4 (`negate().negate() == reduce()`).
    pub fn reduce(&self) -> DisjunctiveFormula {
        Self::reduce_clauses(self.clauses.clone())
    }
}


/// Property tests for spec §8 property 4 ("DNF reduction laws"), generating
/// arbitrary formulas over a small fixed predicate universe rather than
/// hand-picked cases.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// A handful of distinct predicate ids is enough to exercise dedup,
    /// absorption, and contradiction without the cartesian-product blowup
    /// in `negate()` making the suite slow.
    fn literal_strategy() -> impl Strategy<Value = Literal> {
        (0u32..4, any::<bool>()).prop_map(|(id, negated)| Literal::new(PredicateId(id), negated))
    }

    fn clause_strategy() -> impl Strategy<Value = Option<ConjunctiveClause>> {
        prop::collection::vec(literal_strategy(), 1..4).prop_map(ConjunctiveClause::new)
    }

    fn formula_strategy() -> impl Strategy<Value = DisjunctiveFormula> {
        prop::collection::vec(clause_strategy(), 0..4)
            .prop_map(|clauses| DisjunctiveFormula::new(clauses.into_iter().flatten().collect()))
    }

    proptest! {
        // formula.negate().negate() == formula.reduce() (spec §8 property 4).
        #[test]
        fn negate_is_involutive_up_to_reduction(formula in formula_strategy()) {
            prop_assert_eq!(formula.negate().negate(), formula.reduce());
        }

        // tautology.combine(x) == tautology: the tautology absorbs any
        // operand under OR.
        #[test]
        fn tautology_absorbs_any_operand_under_combine(formula in formula_strategy()) {
            let tautology = DisjunctiveFormula::tautology();
            prop_assert_eq!(tautology.combine(&formula), DisjunctiveFormula::tautology());
        }

        // tautology.distribute(x) == x: the tautology is the identity
        // under AND.
        #[test]
        fn tautology_is_identity_under_distribute(formula in formula_strategy()) {
            let tautology = DisjunctiveFormula::tautology();
            prop_assert_eq!(tautology.distribute(&formula), formula);
        }

        // reduce() is idempotent: reducing an already-reduced formula
        // changes nothing.
        #[test]
        fn reduce_is_idempotent(formula in formula_strategy()) {
            prop_assert_eq!(formula.reduce(), formula.reduce().reduce());
        }
    }
}
