//! The parsed expression AST (spec §4.4, §9: "tagged-variant `Expr` over a
//! common evaluator rather than inheritance").
//!
//! This crate never parses policy source text (spec §1 Non-goals): `Expr`
//! trees arrive fully formed from an external `PolicyCatalog`. Evaluation of
//! `Expr` lives in `sapl-policies`; this module only defines the shape.

use crate::domain::value::Val;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// Logical operators. `And`/`Or` short-circuit only when the decisive
/// operand is not `Error` (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

/// Which side of an attribute finder the entity argument binds to: the
/// two-argument `entity.attr(args)` form, or the environment (zero-arity,
/// `|<env.attr>`) form (spec §4.4, §4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeFinderKind {
    Entity(Box<Expr>),
    Environment,
}

/// A parsed expression node. One variant per evaluator case (spec §4.4,
/// §9). `Arc` is used for child nodes so a single `Expr` tree can be shared
/// across every policy that references the same sub-expression without
/// cloning the tree (predicates extracted by the target indexer reuse the
/// same `Arc<Expr>` leaves the policy stores).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Val),
    Identifier(String),
    FieldAccess {
        base: Arc<Expr>,
        field: String,
    },
    Index {
        base: Arc<Expr>,
        index: Arc<Expr>,
    },
    Slice {
        base: Arc<Expr>,
        start: Option<Arc<Expr>>,
        end: Option<Arc<Expr>>,
        step: Option<Arc<Expr>>,
    },
    Filter {
        base: Arc<Expr>,
        predicate: Arc<Expr>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
    },
    AttributeFinder {
        name: String,
        kind: AttributeFinderKind,
        args: Vec<Expr>,
        fresh: bool,
    },
    Arith {
        op: ArithOp,
        lhs: Arc<Expr>,
        rhs: Arc<Expr>,
    },
    Compare {
        op: CompareOp,
        lhs: Arc<Expr>,
        rhs: Arc<Expr>,
    },
    Logical {
        op: LogicalOp,
        operands: Vec<Expr>,
    },
    Conditional {
        condition: Arc<Expr>,
        then_branch: Arc<Expr>,
        else_branch: Arc<Expr>,
    },
    RegexMatch {
        value: Arc<Expr>,
        pattern: Arc<Expr>,
    },
    SchemaConformance {
        value: Arc<Expr>,
        schema_name: String,
    },
}

impl Expr {
    pub fn literal(v: Val) -> Self {
        Expr::Literal(v)
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Identifier(name.into())
    }

    pub fn is_literal_true(&self) -> bool {
        matches!(self, Expr::Literal(v) if v.as_bool() == Some(true))
    }

    pub fn is_literal_false(&self) -> bool {
        matches!(self, Expr::Literal(v) if v.as_bool() == Some(false))
    }
}
