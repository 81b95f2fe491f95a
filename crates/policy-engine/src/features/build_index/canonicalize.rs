//! Target-expression canonicalisation (C5, spec §4.5): walks a target
//! `Expr` and rewrites it into a `DisjunctiveFormula` over opaque predicate
//! leaves. Boolean combinators (`Logical::{And,Or,Not}`) are recognised
//! structurally; every other `Expr` variant becomes an interned leaf.

use sapl_kernel::domain::expr::{Expr, LogicalOp};
use sapl_kernel::{ConjunctiveClause, DisjunctiveFormula, Literal, PredicateTable};

/// Canonicalises `expr` into DNF, interning every non-combinator
/// sub-expression into `table`. `None` target (no target clause) should be
/// represented by the caller as `DisjunctiveFormula::tautology()` directly;
/// this function only handles an expression that is actually present.
pub fn canonicalize(expr: &Expr, table: &mut PredicateTable) -> DisjunctiveFormula {
    if expr.is_literal_true() {
        return DisjunctiveFormula::tautology();
    }
    if expr.is_literal_false() {
        return DisjunctiveFormula::contradiction();
    }
    match expr {
        Expr::Logical { op: LogicalOp::And, operands } => operands
            .iter()
            .map(|o| canonicalize(o, table))
            .fold(DisjunctiveFormula::tautology(), |acc, next| acc.distribute(&next)),
        Expr::Logical { op: LogicalOp::Or, operands } => operands
            .iter()
            .map(|o| canonicalize(o, table))
            .fold(DisjunctiveFormula::contradiction(), |acc, next| acc.combine(&next)),
        Expr::Logical { op: LogicalOp::Not, operands } => {
            debug_assert_eq!(operands.len(), 1, "LogicalOp::Not takes exactly one operand");
            match operands.first() {
                Some(inner) => canonicalize(inner, table).negate(),
                None => DisjunctiveFormula::contradiction(),
            }
        }
        _ => leaf(expr, table),
    }
}

fn leaf(expr: &Expr, table: &mut PredicateTable) -> DisjunctiveFormula {
    let id = table.intern(expr.clone());
    let clause = ConjunctiveClause::new([Literal::new(id, false)]).expect("single non-contradictory literal");
    DisjunctiveFormula::new(vec![clause])
}

#[cfg(test)]
mod tests {
    use super::*;
    use sapl_kernel::domain::value::Val;

    fn ident(name: &str) -> Expr {
        Expr::ident(name)
    }

    #[test]
    fn and_of_two_predicates_distributes_into_one_clause() {
        let mut table = PredicateTable::new();
        let expr = Expr::Logical {
            op: LogicalOp::And,
            operands: vec![ident("a"), ident("b")],
        };
        let formula = canonicalize(&expr, &mut table);
        assert_eq!(formula.clauses().len(), 1);
        assert_eq!(formula.clauses()[0].len(), 2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn or_of_two_predicates_yields_two_clauses() {
        let mut table = PredicateTable::new();
        let expr = Expr::Logical {
            op: LogicalOp::Or,
            operands: vec![ident("a"), ident("b")],
        };
        let formula = canonicalize(&expr, &mut table);
        assert_eq!(formula.clauses().len(), 2);
    }

    #[test]
    fn not_pushes_negation_to_the_leaf() {
        let mut table = PredicateTable::new();
        let expr = Expr::Logical {
            op: LogicalOp::Not,
            operands: vec![ident("a")],
        };
        let formula = canonicalize(&expr, &mut table);
        assert_eq!(formula.clauses().len(), 1);
        assert!(formula.clauses()[0].literals().iter().next().unwrap().negated);
    }

    #[test]
    fn literal_true_target_is_tautology() {
        let mut table = PredicateTable::new();
        let formula = canonicalize(&Expr::literal(Val::bool(true)), &mut table);
        assert!(formula.is_tautology());
    }

    #[test]
    fn repeated_predicate_reuses_the_same_interned_id() {
        let mut table = PredicateTable::new();
        let expr = Expr::Logical {
            op: LogicalOp::And,
            operands: vec![ident("a"), ident("a")],
        };
        let formula = canonicalize(&expr, &mut table);
        assert_eq!(table.len(), 1);
        assert_eq!(formula.clauses()[0].len(), 1);
    }
}
