//! The `Val` value model (spec §3, §4.1).
//!
//! `Val` is the single tagged-variant type that flows through expression
//! evaluation, attribute streams, and obligations/advice/transform. It is
//! deliberately richer than `serde_json::Value`: it distinguishes `Null`
//! from `Undefined`, it carries an explicit `Error` variant instead of
//! failing evaluation outright, and every value carries a secrecy flag that
//! propagates monotonically through derived values.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Placeholder substituted for secret values by display routines.
pub const SECRET_PLACEHOLDER: &str = "***SECRET***";

/// A single step of provenance recorded on a `Val`, used for optional trace
/// sinks (spec §7: "internal traces are optionally exposed through a trace
/// sink interface"). Kept intentionally small: a label plus nested causes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub label: String,
    pub causes: Vec<Trace>,
}

impl Trace {
    pub fn leaf(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            causes: Vec::new(),
        }
    }

    pub fn node(label: impl Into<String>, causes: Vec<Trace>) -> Self {
        Self {
            label: label.into(),
            causes,
        }
    }
}

/// The tagged-variant runtime value.
///
/// `Number` uses an arbitrary-precision decimal rather than a binary float
/// so that "compares by mathematical value" (spec §4.1) holds without
/// floating-point surprises (`0.1 + 0.2 == 0.3` etc.).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum ValKind {
    Undefined,
    Error(String),
    Null,
    Bool(bool),
    Number(Decimal),
    Text(String),
    Array(Vec<Val>),
    Object(BTreeMap<String, Val>),
}

/// A `Val` is a `ValKind` plus the metadata the spec requires every derived
/// value to carry: a secrecy flag and an optional trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Val {
    pub kind: ValKind,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub secret: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Trace>,
}

/// Structural equality used for obligation/advice deduplication (spec
/// §4.6) compares `kind` and `secret` but deliberately ignores `trace`:
/// provenance is diagnostic metadata, not part of a value's identity.
impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.secret == other.secret
    }
}

impl Val {
    fn new(kind: ValKind) -> Self {
        Self {
            kind,
            secret: false,
            trace: None,
        }
    }

    pub fn undefined() -> Self {
        Self::new(ValKind::Undefined)
    }

    pub fn null() -> Self {
        Self::new(ValKind::Null)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ValKind::Error(message.into()))
    }

    pub fn bool(b: bool) -> Self {
        Self::new(ValKind::Bool(b))
    }

    pub fn number(n: impl Into<Decimal>) -> Self {
        Self::new(ValKind::Number(n.into()))
    }

    pub fn text(s: impl Into<String>) -> Self {
        Self::new(ValKind::Text(s.into()))
    }

    pub fn array(items: Vec<Val>) -> Self {
        Self::new(ValKind::Array(items))
    }

    pub fn object(fields: BTreeMap<String, Val>) -> Self {
        Self::new(ValKind::Object(fields))
    }

    /// Marks this value (and, by convention, anything derived from it) as
    /// secret. Secrecy is monotonic: callers must OR this flag into any
    /// value computed from a secret input (spec §4.1, §8 property 6).
    pub fn with_secret(mut self, secret: bool) -> Self {
        self.secret = self.secret || secret;
        self
    }

    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self.kind, ValKind::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, ValKind::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, ValKind::Error(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &self.kind {
            ValKind::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.kind {
            ValKind::Error(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match &self.kind {
            ValKind::Number(n) => n.to_string().parse::<i64>().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.kind {
            ValKind::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Val]> {
        match &self.kind {
            ValKind::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Any operation over `Val`s that is documented to propagate errors
    /// should route its operand list through this helper first.
    pub fn first_error<'a>(vals: impl IntoIterator<Item = &'a Val>) -> Option<&'a Val> {
        vals.into_iter().find(|v| v.is_error())
    }

    /// Derives a secrecy flag for a value computed from the given operands,
    /// per the monotonic-secrecy invariant.
    pub fn derived_secret<'a>(vals: impl IntoIterator<Item = &'a Val>) -> bool {
        vals.into_iter().any(|v| v.secret)
    }

    /// Renders a display-safe string, substituting secret values with the
    /// fixed placeholder rather than their content.
    pub fn display_safe(&self) -> String {
        if self.secret {
            return SECRET_PLACEHOLDER.to_string();
        }
        match &self.kind {
            ValKind::Undefined => "undefined".to_string(),
            ValKind::Null => "null".to_string(),
            ValKind::Error(m) => format!("error({m})"),
            ValKind::Bool(b) => b.to_string(),
            ValKind::Number(n) => n.to_string(),
            ValKind::Text(s) => s.clone(),
            ValKind::Array(items) => {
                let rendered: Vec<String> = items.iter().map(Val::display_safe).collect();
                format!("[{}]", rendered.join(", "))
            }
            ValKind::Object(fields) => {
                let rendered: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", v.display_safe()))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
        }
    }

    /// Field access used by `Expr::FieldAccess`. Missing keys yield
    /// `Undefined` rather than an error (spec §4.4).
    pub fn get_field(&self, name: &str) -> Val {
        match &self.kind {
            ValKind::Object(fields) => fields
                .get(name)
                .cloned()
                .unwrap_or_else(Val::undefined)
                .with_secret(self.secret),
            ValKind::Error(m) => Val::error(m.clone()).with_secret(self.secret),
            _ => Val::undefined().with_secret(self.secret),
        }
    }

    /// Index access used by `Expr::Index`. Out-of-range indices yield
    /// `Undefined` (spec §4.4).
    pub fn get_index(&self, idx: i64) -> Val {
        match &self.kind {
            ValKind::Array(items) => {
                let len = items.len() as i64;
                let resolved = if idx < 0 { len + idx } else { idx };
                if resolved < 0 || resolved >= len {
                    Val::undefined().with_secret(self.secret)
                } else {
                    items[resolved as usize].clone().with_secret(self.secret)
                }
            }
            ValKind::Error(m) => Val::error(m.clone()).with_secret(self.secret),
            _ => Val::undefined().with_secret(self.secret),
        }
    }

    /// Slice access used by `Expr::Slice`. Python-like half-open range,
    /// clamped to bounds; never errors, mirroring index/field semantics.
    pub fn get_slice(&self, start: Option<i64>, end: Option<i64>, step: Option<i64>) -> Val {
        match &self.kind {
            ValKind::Array(items) => {
                let len = items.len() as i64;
                let step = step.unwrap_or(1);
                if step == 0 {
                    return Val::error("slice step must not be zero").with_secret(self.secret);
                }
                let clamp = |v: i64| -> i64 { v.max(0).min(len) };
                let (mut i, stop) = if step > 0 {
                    (
                        clamp(start.map(|s| if s < 0 { len + s } else { s }).unwrap_or(0)),
                        clamp(end.map(|e| if e < 0 { len + e } else { e }).unwrap_or(len)),
                    )
                } else {
                    (
                        clamp(
                            start
                                .map(|s| if s < 0 { len + s } else { s })
                                .unwrap_or(len - 1),
                        ),
                        clamp(end.map(|e| if e < 0 { len + e } else { e }).unwrap_or(-1)),
                    )
                };
                let mut out = Vec::new();
                if step > 0 {
                    while i < stop {
                        out.push(items[i as usize].clone());
                        i += step;
                    }
                } else {
                    while i > stop {
                        if i < len {
                            out.push(items[i as usize].clone());
                        }
                        i += step;
                    }
                }
                Val::array(out).with_secret(self.secret)
            }
            ValKind::Error(m) => Val::error(m.clone()).with_secret(self.secret),
            _ => Val::undefined().with_secret(self.secret),
        }
    }

    /// Type tag ordinal used by comparisons/equality to reject cross-type
    /// comparisons (spec §4.1), except for Null/Undefined which compare
    /// specially.
    fn type_rank(&self) -> u8 {
        match &self.kind {
            ValKind::Undefined => 0,
            ValKind::Null => 1,
            ValKind::Bool(_) => 2,
            ValKind::Number(_) => 3,
            ValKind::Text(_) => 4,
            ValKind::Array(_) => 5,
            ValKind::Object(_) => 6,
            ValKind::Error(_) => 7,
        }
    }

    /// Three-valued equality per spec §4.1:
    /// - `Error` propagates.
    /// - `Undefined == Undefined` yields `Undefined` (not `true`).
    /// - `Null == Null` yields `true`.
    /// - Cross-type comparisons yield `Error` unless both sides are
    ///   `Null`/`Undefined`.
    pub fn val_eq(&self, other: &Val) -> Val {
        if let Some(e) = Val::first_error([self, other]) {
            return e.clone();
        }
        let secret = Val::derived_secret([self, other]);
        if self.is_undefined() && other.is_undefined() {
            return Val::undefined().with_secret(secret);
        }
        if self.is_null() && other.is_null() {
            return Val::bool(true).with_secret(secret);
        }
        if (self.is_null() || self.is_undefined()) != (other.is_null() || other.is_undefined()) {
            // one side absent-ish, the other isn't: not an error, just false
            return Val::bool(false).with_secret(secret);
        }
        match (&self.kind, &other.kind) {
            (ValKind::Bool(a), ValKind::Bool(b)) => Val::bool(a == b).with_secret(secret),
            (ValKind::Number(a), ValKind::Number(b)) => Val::bool(a == b).with_secret(secret),
            (ValKind::Text(a), ValKind::Text(b)) => Val::bool(a == b).with_secret(secret),
            (ValKind::Array(a), ValKind::Array(b)) => {
                if a.len() != b.len() {
                    return Val::bool(false).with_secret(secret);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    let eq = x.val_eq(y);
                    if eq.is_error() {
                        return eq;
                    }
                    if eq.as_bool() != Some(true) {
                        return Val::bool(false).with_secret(secret);
                    }
                }
                Val::bool(true).with_secret(secret)
            }
            (ValKind::Object(a), ValKind::Object(b)) => {
                if a.len() != b.len() {
                    return Val::bool(false).with_secret(secret);
                }
                for (k, x) in a {
                    match b.get(k) {
                        Some(y) => {
                            let eq = x.val_eq(y);
                            if eq.is_error() {
                                return eq;
                            }
                            if eq.as_bool() != Some(true) {
                                return Val::bool(false).with_secret(secret);
                            }
                        }
                        None => return Val::bool(false).with_secret(secret),
                    }
                }
                Val::bool(true).with_secret(secret)
            }
            _ => Val::error(format!(
                "cannot compare values of different types ({:?} vs {:?})",
                self.type_rank(),
                other.type_rank()
            ))
            .with_secret(secret),
        }
    }

    /// Ordering comparison for `<`, `<=`, `>`, `>=`. Returns `Val::Bool` or
    /// `Val::Error`, per spec §4.1.
    pub fn val_cmp(&self, other: &Val) -> Result<Ordering, Val> {
        if let Some(e) = Val::first_error([self, other]) {
            return Err(e.clone());
        }
        match (&self.kind, &other.kind) {
            (ValKind::Number(a), ValKind::Number(b)) => Ok(a.cmp(b)),
            (ValKind::Text(a), ValKind::Text(b)) => Ok(a.cmp(b)),
            (ValKind::Bool(a), ValKind::Bool(b)) => Ok(a.cmp(b)),
            _ => Err(Val::error("values are not ordered-comparable")
                .with_secret(Val::derived_secret([self, other]))),
        }
    }

    /// Division, surfacing `Error` on division by zero (spec §4.1).
    pub fn div(&self, other: &Val) -> Val {
        if let Some(e) = Val::first_error([self, other]) {
            return e.clone();
        }
        let secret = Val::derived_secret([self, other]);
        match (&self.kind, &other.kind) {
            (ValKind::Number(a), ValKind::Number(b)) => {
                if b.is_zero() {
                    Val::error("division by zero").with_secret(secret)
                } else {
                    Val::number(a / b).with_secret(secret)
                }
            }
            _ => Val::error("division requires numeric operands").with_secret(secret),
        }
    }

    /// Addition. `Text + Text` concatenates, matching the teacher corpus'
    /// common `+` overload for strings; any other non-numeric pairing is an
    /// `Error`.
    pub fn add(&self, other: &Val) -> Val {
        if let Some(e) = Val::first_error([self, other]) {
            return e.clone();
        }
        let secret = Val::derived_secret([self, other]);
        match (&self.kind, &other.kind) {
            (ValKind::Number(a), ValKind::Number(b)) => Val::number(a + b).with_secret(secret),
            (ValKind::Text(a), ValKind::Text(b)) => {
                Val::text(format!("{a}{b}")).with_secret(secret)
            }
            _ => Val::error("addition requires two numbers or two strings").with_secret(secret),
        }
    }

    /// Subtraction, numeric operands only.
    pub fn sub(&self, other: &Val) -> Val {
        if let Some(e) = Val::first_error([self, other]) {
            return e.clone();
        }
        let secret = Val::derived_secret([self, other]);
        match (&self.kind, &other.kind) {
            (ValKind::Number(a), ValKind::Number(b)) => Val::number(a - b).with_secret(secret),
            _ => Val::error("subtraction requires numeric operands").with_secret(secret),
        }
    }

    /// Multiplication, numeric operands only.
    pub fn mul(&self, other: &Val) -> Val {
        if let Some(e) = Val::first_error([self, other]) {
            return e.clone();
        }
        let secret = Val::derived_secret([self, other]);
        match (&self.kind, &other.kind) {
            (ValKind::Number(a), ValKind::Number(b)) => Val::number(a * b).with_secret(secret),
            _ => Val::error("multiplication requires numeric operands").with_secret(secret),
        }
    }

    /// Remainder, surfacing `Error` on modulo by zero, mirroring `div`.
    pub fn modulo(&self, other: &Val) -> Val {
        if let Some(e) = Val::first_error([self, other]) {
            return e.clone();
        }
        let secret = Val::derived_secret([self, other]);
        match (&self.kind, &other.kind) {
            (ValKind::Number(a), ValKind::Number(b)) => {
                if b.is_zero() {
                    Val::error("modulo by zero").with_secret(secret)
                } else {
                    Val::number(a % b).with_secret(secret)
                }
            }
            _ => Val::error("modulo requires numeric operands").with_secret(secret),
        }
    }

    /// Unary negation.
    pub fn neg(&self) -> Val {
        if self.is_error() {
            return self.clone();
        }
        match &self.kind {
            ValKind::Number(a) => Val::number(-a).with_secret(self.secret),
            _ => Val::error("negation requires a numeric operand").with_secret(self.secret),
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_safe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_equals_undefined_is_undefined_not_true() {
        let result = Val::undefined().val_eq(&Val::undefined());
        assert!(result.is_undefined());
    }

    #[test]
    fn null_equals_null_is_true() {
        let result = Val::null().val_eq(&Val::null());
        assert_eq!(result.as_bool(), Some(true));
    }

    #[test]
    fn cross_type_comparison_is_error() {
        let result = Val::number(Decimal::from(1)).val_eq(&Val::text("1"));
        assert!(result.is_error());
    }

    #[test]
    fn error_propagates_through_equality() {
        let result = Val::error("boom").val_eq(&Val::bool(true));
        assert!(result.is_error());
        assert_eq!(result.error_message(), Some("boom"));
    }

    #[test]
    fn division_by_zero_is_error() {
        let result = Val::number(Decimal::from(4)).div(&Val::number(Decimal::from(0)));
        assert!(result.is_error());
    }

    #[test]
    fn secrecy_is_monotonic_across_derived_values() {
        let secret_input = Val::number(Decimal::from(1)).with_secret(true);
        let plain_input = Val::number(Decimal::from(2));
        let sum_secret = Val::derived_secret([&secret_input, &plain_input]);
        assert!(sum_secret);
    }

    #[test]
    fn secret_values_display_as_placeholder() {
        let v = Val::text("super-secret").with_secret(true);
        assert_eq!(v.display_safe(), SECRET_PLACEHOLDER);
    }

    #[test]
    fn missing_field_is_undefined() {
        let obj = Val::object(BTreeMap::new());
        assert!(obj.get_field("missing").is_undefined());
    }

    #[test]
    fn out_of_range_index_is_undefined() {
        let arr = Val::array(vec![Val::bool(true)]);
        assert!(arr.get_index(5).is_undefined());
    }
}
