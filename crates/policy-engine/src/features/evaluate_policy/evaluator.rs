//! The expression evaluator (C4, spec §4.4): a pure, `match`-dispatched
//! function per `Expr` variant (spec §9: "tagged-variant `Expr` over a
//! common evaluator rather than inheritance"), lifted over streams.
//!
//! Every operator recomputes its output whenever any stream argument
//! emits, folding in each argument's *latest* known value -- starting from
//! `Val::Undefined` before that argument has produced anything, mirroring
//! the teacher's `AuthorizationEngine::is_authorized` single-shot
//! evaluation generalised to a reactive tick per spec §4.4, §5.

use async_stream::stream;
use futures::stream::{self, BoxStream, StreamExt};
use regex::Regex;
use sapl_kernel::domain::attribute_key::{AttributeSubscriptionKey, VariablesDigest};
use sapl_kernel::domain::context::EvaluationContext;
use sapl_kernel::domain::expr::{ArithOp, AttributeFinderKind, CompareOp, Expr, LogicalOp};
use sapl_kernel::domain::value::Val;
use std::sync::Arc;

/// Evaluates `expr` against `ctx`, returning the reactive stream of `Val`
/// ticks described by spec §4.4.
pub fn evaluate(expr: Arc<Expr>, ctx: EvaluationContext) -> BoxStream<'static, Val> {
    match expr.as_ref() {
        Expr::Literal(v) => once(v.clone()),
        Expr::Identifier(name) => once(ctx.resolve(name)),
        Expr::FieldAccess { base, field } => {
            let field = field.clone();
            lift1(evaluate(base.clone(), ctx), move |v| v.get_field(&field))
        }
        Expr::Index { base, index } => lift2(
            evaluate(base.clone(), ctx.clone()),
            evaluate(index.clone(), ctx),
            |base, idx| match idx.as_i64() {
                Some(i) => base.get_index(i),
                None if idx.is_error() => idx.clone(),
                None => Val::error("index must be an integer"),
            },
        ),
        Expr::Slice {
            base,
            start,
            end,
            step,
        } => evaluate_slice(base.clone(), start.clone(), end.clone(), step.clone(), ctx),
        Expr::Filter { base, predicate } => evaluate_filter(base.clone(), predicate.clone(), ctx),
        Expr::Call { function, args } => evaluate_call(function.clone(), args.clone(), ctx),
        Expr::AttributeFinder {
            name,
            kind,
            args,
            fresh,
        } => evaluate_attribute_finder(name.clone(), kind.clone(), args.clone(), *fresh, ctx),
        Expr::Arith { op, lhs, rhs } => {
            let op = *op;
            lift2(
                evaluate(lhs.clone(), ctx.clone()),
                evaluate(rhs.clone(), ctx),
                move |a, b| arith(op, a, b),
            )
        }
        Expr::Compare { op, lhs, rhs } => {
            let op = *op;
            lift2(
                evaluate(lhs.clone(), ctx.clone()),
                evaluate(rhs.clone(), ctx),
                move |a, b| compare(op, a, b),
            )
        }
        Expr::Logical { op, operands } => evaluate_logical(*op, operands.clone(), ctx),
        Expr::Conditional {
            condition,
            then_branch,
            else_branch,
        } => evaluate_conditional(condition.clone(), then_branch.clone(), else_branch.clone(), ctx),
        Expr::RegexMatch { value, pattern } => lift2(
            evaluate(value.clone(), ctx.clone()),
            evaluate(pattern.clone(), ctx),
            |value, pattern| regex_match(value, pattern),
        ),
        Expr::SchemaConformance { value, schema_name } => {
            let schema_name = schema_name.clone();
            let ctx = ctx.clone();
            lift1(evaluate(value.clone(), ctx.clone()), move |v| {
                schema_conformance(&ctx, &schema_name, v)
            })
        }
    }
}

/// Evaluates `expr` and returns only its first emitted value, then drops
/// the stream. Used for sub-expressions that are resolved once per tick of
/// an outer operator rather than independently reactive -- filter
/// predicates and attribute-finder arguments/entities (spec §4.4 does not
/// mandate full reactivity for these positions; see `DESIGN.md`).
async fn evaluate_once(expr: Arc<Expr>, ctx: EvaluationContext) -> Val {
    evaluate(expr, ctx)
        .next()
        .await
        .unwrap_or_else(Val::undefined)
}

pub(crate) fn once(v: Val) -> BoxStream<'static, Val> {
    Box::pin(stream::once(async move { v }))
}

fn lift1(s: BoxStream<'static, Val>, f: impl Fn(Val) -> Val + Send + Sync + 'static) -> BoxStream<'static, Val> {
    Box::pin(s.map(f))
}

fn lift2(
    a: BoxStream<'static, Val>,
    b: BoxStream<'static, Val>,
    f: impl Fn(&Val, &Val) -> Val + Send + Sync + 'static,
) -> BoxStream<'static, Val> {
    lift_n(vec![a, b], move |latest| f(&latest[0], &latest[1]))
}

/// General n-ary lift: recomputes `f` over the latest known value of every
/// operand whenever *any* operand emits (spec §4.4), starting every slot at
/// `Val::Undefined` before its first value arrives.
pub(crate) fn lift_n(
    streams: Vec<BoxStream<'static, Val>>,
    f: impl Fn(&[Val]) -> Val + Send + Sync + 'static,
) -> BoxStream<'static, Val> {
    let n = streams.len();
    if n == 0 {
        return once(f(&[]));
    }
    let tagged: Vec<BoxStream<'static, (usize, Val)>> = streams
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.map(move |v| (i, v)).boxed())
        .collect();
    let mut merged = stream::select_all(tagged);
    Box::pin(stream! {
        let mut latest = vec![Val::undefined(); n];
        while let Some((i, v)) = merged.next().await {
            latest[i] = v;
            yield f(&latest);
        }
    })
}

fn arith(op: ArithOp, a: &Val, b: &Val) -> Val {
    match op {
        ArithOp::Add => a.add(b),
        ArithOp::Sub => a.sub(b),
        ArithOp::Mul => a.mul(b),
        ArithOp::Div => a.div(b),
        ArithOp::Mod => a.modulo(b),
    }
}

fn compare(op: CompareOp, a: &Val, b: &Val) -> Val {
    match op {
        CompareOp::Eq => a.val_eq(b),
        CompareOp::NotEq => match a.val_eq(b).as_bool() {
            Some(eq) => Val::bool(!eq).with_secret(Val::derived_secret([a, b])),
            None => a.val_eq(b),
        },
        CompareOp::Lt => ordering_result(a, b, |o| o.is_lt()),
        CompareOp::LtEq => ordering_result(a, b, |o| o.is_le()),
        CompareOp::Gt => ordering_result(a, b, |o| o.is_gt()),
        CompareOp::GtEq => ordering_result(a, b, |o| o.is_ge()),
    }
}

fn ordering_result(a: &Val, b: &Val, test: impl Fn(std::cmp::Ordering) -> bool) -> Val {
    let secret = Val::derived_secret([a, b]);
    match a.val_cmp(b) {
        Ok(ordering) => Val::bool(test(ordering)).with_secret(secret),
        Err(e) => e,
    }
}

fn regex_match(value: &Val, pattern: &Val) -> Val {
    if let Some(e) = Val::first_error([value, pattern]) {
        return e.clone();
    }
    let secret = Val::derived_secret([value, pattern]);
    match (value.as_text(), pattern.as_text()) {
        (Some(text), Some(pattern)) => match Regex::new(pattern) {
            Ok(re) => Val::bool(re.is_match(text)).with_secret(secret),
            Err(e) => Val::error(format!("invalid regex: {e}")).with_secret(secret),
        },
        _ => Val::error("regex match requires text operands").with_secret(secret),
    }
}

fn schema_conformance(ctx: &EvaluationContext, schema_name: &str, value: Val) -> Val {
    if value.is_error() {
        return value;
    }
    let secret = value.secret;
    match ctx.schemas().and_then(|registry| registry.validate(schema_name, &value)) {
        Some(result) => Val::bool(result).with_secret(secret),
        None => Val::undefined().with_secret(secret),
    }
}

fn evaluate_slice(
    base: Arc<Expr>,
    start: Option<Arc<Expr>>,
    end: Option<Arc<Expr>>,
    step: Option<Arc<Expr>>,
    ctx: EvaluationContext,
) -> BoxStream<'static, Val> {
    let null_stream = || once(Val::null());
    let start_stream = start.map(|e| evaluate(e, ctx.clone())).unwrap_or_else(null_stream);
    let end_stream = end.map(|e| evaluate(e, ctx.clone())).unwrap_or_else(null_stream);
    let step_stream = step.map(|e| evaluate(e, ctx.clone())).unwrap_or_else(null_stream);
    let base_stream = evaluate(base, ctx);
    lift_n(
        vec![base_stream, start_stream, end_stream, step_stream],
        |latest| {
            if let Some(e) = Val::first_error(latest.iter()) {
                return e.clone();
            }
            latest[0].get_slice(latest[1].as_i64(), latest[2].as_i64(), latest[3].as_i64())
        },
    )
}

/// Filters `base` (an array) keeping elements for which `predicate`,
/// evaluated against a child context binding `item` to the element,
/// resolves to `Val::Bool(true)` on its first tick (see `evaluate_once`).
/// Re-filters the whole array every time `base` emits.
fn evaluate_filter(base: Arc<Expr>, predicate: Arc<Expr>, ctx: EvaluationContext) -> BoxStream<'static, Val> {
    let base_stream = evaluate(base, ctx.clone());
    Box::pin(stream! {
        let mut base_stream = base_stream;
        while let Some(base_val) = base_stream.next().await {
            if base_val.is_error() {
                yield base_val;
                continue;
            }
            let items = match base_val.as_array() {
                Some(items) => items.to_vec(),
                None => {
                    yield Val::error("filter requires an array base");
                    continue;
                }
            };
            let mut kept = Vec::with_capacity(items.len());
            for item in items {
                let mut bindings = std::collections::HashMap::new();
                bindings.insert("item".to_string(), item.clone());
                let child = match ctx.with_child(bindings) {
                    Ok(child) => child,
                    Err(e) => {
                        yield Val::error(e.to_string());
                        continue;
                    }
                };
                let kept_flag = evaluate_once(predicate.clone(), child).await;
                if kept_flag.as_bool() == Some(true) {
                    kept.push(item);
                }
            }
            yield Val::array(kept).with_secret(base_val.secret);
        }
    })
}

fn evaluate_call(function: String, args: Vec<Expr>, ctx: EvaluationContext) -> BoxStream<'static, Val> {
    let fq_name = ctx.resolve_import(&function).to_string();
    let arg_streams: Vec<BoxStream<'static, Val>> = args
        .into_iter()
        .map(|a| evaluate(Arc::new(a), ctx.clone()))
        .collect();
    let registry = ctx.functions().clone();
    lift_n(arg_streams, move |latest| {
        if let Some(e) = Val::first_error(latest.iter()) {
            return e.clone();
        }
        match registry.lookup(&fq_name) {
            Some(registered) => (registered.func)(latest),
            None => Val::error(format!("unknown function: {fq_name}")),
        }
    })
}

fn evaluate_attribute_finder(
    name: String,
    kind: AttributeFinderKind,
    args: Vec<Expr>,
    fresh: bool,
    ctx: EvaluationContext,
) -> BoxStream<'static, Val> {
    let fq_name = ctx.resolve_import(&name).to_string();
    let initial_timeout = ctx.attribute_initial_timeout();
    let broker = ctx.broker().clone();
    Box::pin(stream! {
        let entity = match &kind {
            AttributeFinderKind::Entity(expr) => Some(evaluate_once(Arc::new((**expr).clone()), ctx.clone()).await),
            AttributeFinderKind::Environment => None,
        };
        let mut arguments = Vec::with_capacity(args.len());
        for arg in &args {
            arguments.push(evaluate_once(Arc::new(arg.clone()), ctx.clone()).await);
        }
        let digest = VariablesDigest::empty();
        let key = AttributeSubscriptionKey::new(fq_name, entity, arguments, digest);
        let mut upstream = broker.attribute_stream(key, fresh, initial_timeout).await;
        while let Some(v) = upstream.next().await {
            yield v;
        }
    })
}

fn evaluate_logical(op: LogicalOp, operands: Vec<Expr>, ctx: EvaluationContext) -> BoxStream<'static, Val> {
    let streams: Vec<BoxStream<'static, Val>> = operands
        .into_iter()
        .map(|e| evaluate(Arc::new(e), ctx.clone()))
        .collect();
    match op {
        LogicalOp::Not => {
            debug_assert_eq!(streams.len(), 1, "LogicalOp::Not takes exactly one operand");
            lift_n(streams, |latest| match latest.first() {
                Some(v) if v.is_error() => v.clone(),
                Some(v) => match v.as_bool() {
                    Some(b) => Val::bool(!b).with_secret(v.secret),
                    None => Val::undefined().with_secret(v.secret),
                },
                None => Val::undefined(),
            })
        }
        LogicalOp::And => lift_n(streams, |latest| fold_logical(latest, false)),
        LogicalOp::Or => lift_n(streams, |latest| fold_logical(latest, true)),
    }
}

/// Folds the latest operand values for `AND` (`decisive == false`) or `OR`
/// (`decisive == true`), short-circuiting on a decisive non-error operand
/// before looking at errors or pending (`Undefined`) operands (spec §4.4:
/// "short-circuit ... only when the decisive operand is not Error").
fn fold_logical(latest: &[Val], decisive: bool) -> Val {
    let secret = Val::derived_secret(latest.iter());
    if latest
        .iter()
        .any(|v| !v.is_error() && v.as_bool() == Some(decisive))
    {
        return Val::bool(decisive).with_secret(secret);
    }
    if let Some(e) = Val::first_error(latest.iter()) {
        return e.clone();
    }
    if latest.iter().all(|v| v.as_bool() == Some(!decisive)) {
        return Val::bool(!decisive).with_secret(secret);
    }
    Val::undefined().with_secret(secret)
}

fn evaluate_conditional(
    condition: Arc<Expr>,
    then_branch: Arc<Expr>,
    else_branch: Arc<Expr>,
    ctx: EvaluationContext,
) -> BoxStream<'static, Val> {
    lift_n(
        vec![
            evaluate(condition, ctx.clone()),
            evaluate(then_branch, ctx.clone()),
            evaluate(else_branch, ctx),
        ],
        |latest| {
            let cond = &latest[0];
            if cond.is_error() {
                return cond.clone();
            }
            match cond.as_bool() {
                Some(true) => latest[1].clone(),
                Some(false) => latest[2].clone(),
                None => Val::undefined().with_secret(cond.secret),
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use sapl_kernel::ports::tests_support::{NullBroker, NullRegistry};
    use std::collections::HashMap;

    fn ctx() -> EvaluationContext {
        EvaluationContext::root(
            HashMap::new(),
            HashMap::new(),
            Arc::new(NullRegistry),
            Arc::new(NullBroker),
        )
    }

    async fn first(expr: Expr) -> Val {
        evaluate(Arc::new(expr), ctx()).next().await.unwrap()
    }

    #[tokio::test]
    async fn literal_evaluates_to_itself() {
        assert_eq!(first(Expr::literal(Val::number(1))).await, Val::number(1));
    }

    #[tokio::test]
    async fn unbound_identifier_is_undefined() {
        assert!(first(Expr::ident("nope")).await.is_undefined());
    }

    #[tokio::test]
    async fn and_short_circuits_on_false_ignoring_other_errors() {
        let expr = Expr::Logical {
            op: LogicalOp::And,
            operands: vec![
                Expr::literal(Val::bool(false)),
                Expr::literal(Val::error("boom")),
            ],
        };
        assert_eq!(first(expr).await.as_bool(), Some(false));
    }

    #[tokio::test]
    async fn or_short_circuits_on_true_ignoring_other_errors() {
        let expr = Expr::Logical {
            op: LogicalOp::Or,
            operands: vec![
                Expr::literal(Val::bool(true)),
                Expr::literal(Val::error("boom")),
            ],
        };
        assert_eq!(first(expr).await.as_bool(), Some(true));
    }

    #[tokio::test]
    async fn and_without_decisive_operand_propagates_error() {
        let expr = Expr::Logical {
            op: LogicalOp::And,
            operands: vec![
                Expr::literal(Val::bool(true)),
                Expr::literal(Val::error("boom")),
            ],
        };
        assert!(first(expr).await.is_error());
    }

    #[tokio::test]
    async fn field_access_on_missing_key_is_undefined() {
        let expr = Expr::FieldAccess {
            base: Arc::new(Expr::literal(Val::object(Default::default()))),
            field: "missing".to_string(),
        };
        assert!(first(expr).await.is_undefined());
    }

    #[tokio::test]
    async fn conditional_picks_then_branch() {
        let expr = Expr::Conditional {
            condition: Arc::new(Expr::literal(Val::bool(true))),
            then_branch: Arc::new(Expr::literal(Val::number(1))),
            else_branch: Arc::new(Expr::literal(Val::number(2))),
        };
        assert_eq!(first(expr).await, Val::number(1));
    }

    #[tokio::test]
    async fn division_by_zero_propagates_as_error() {
        let expr = Expr::Arith {
            op: ArithOp::Div,
            lhs: Arc::new(Expr::literal(Val::number(1))),
            rhs: Arc::new(Expr::literal(Val::number(0))),
        };
        assert!(first(expr).await.is_error());
    }

    #[tokio::test]
    async fn regex_match_detects_substring_pattern() {
        let expr = Expr::RegexMatch {
            value: Arc::new(Expr::literal(Val::text("hello world"))),
            pattern: Arc::new(Expr::literal(Val::text("^hello"))),
        };
        assert_eq!(first(expr).await.as_bool(), Some(true));
    }

    #[tokio::test]
    async fn filter_keeps_only_matching_items() {
        let arr = Val::array(vec![Val::number(1), Val::number(2), Val::number(3)]);
        let expr = Expr::Filter {
            base: Arc::new(Expr::literal(arr)),
            predicate: Arc::new(Expr::Compare {
                op: CompareOp::Gt,
                lhs: Arc::new(Expr::ident("item")),
                rhs: Arc::new(Expr::literal(Val::number(1))),
            }),
        };
        let result = first(expr).await;
        assert_eq!(result.as_array().map(|a| a.len()), Some(2));
    }
}
