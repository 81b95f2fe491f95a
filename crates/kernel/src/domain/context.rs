//! `EvaluationContext` (spec §4.2).
//!
//! A persistent, immutable-by-structural-sharing map of bound variables plus
//! handles to the `FunctionRegistry` and `AttributeBroker` ports. Child
//! contexts extend the parent by adding bindings without mutating it,
//! mirroring the teacher's `Arc`-handle dependency-injection style
//! (`EvaluatePoliciesUseCase::new(schema_storage: Arc<dyn SchemaStoragePort>)`).

use crate::domain::value::Val;
use crate::error::EvaluationError;
use crate::ports::{AttributeBroker, FunctionRegistry, SchemaRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The four top-level variable names every subscription seeds into the root
/// context. Re-declaring any of these at a deeper scope is rejected with
/// `EvaluationError` (spec §4.2).
pub const RESERVED_TOP_LEVEL_VARS: [&str; 4] = ["subject", "action", "resource", "environment"];

/// One level of variable bindings, structurally shared with its parent via
/// `Arc` so that cloning a context for a child scope is O(1) regardless of
/// how many ancestors it has.
#[derive(Debug)]
struct Frame {
    bindings: HashMap<String, Val>,
    parent: Option<Arc<Frame>>,
}

/// Persistent, cheaply-cloneable evaluation context.
#[derive(Clone)]
pub struct EvaluationContext {
    frame: Arc<Frame>,
    imports: Arc<HashMap<String, String>>,
    functions: Arc<dyn FunctionRegistry>,
    broker: Arc<dyn AttributeBroker>,
    schemas: Option<Arc<dyn SchemaRegistry>>,
    attribute_initial_timeout: Option<Duration>,
    cancellation: CancellationToken,
}

impl EvaluationContext {
    /// Builds the root context for one subscription's evaluation tree.
    /// `top_level` must contain exactly `subject`/`action`/`resource`/
    /// `environment` (each may be `Val::Null`, spec §3); duplicates across
    /// calls to `with_child` below are what gets rejected, not this root.
    pub fn root(
        top_level: HashMap<String, Val>,
        imports: HashMap<String, String>,
        functions: Arc<dyn FunctionRegistry>,
        broker: Arc<dyn AttributeBroker>,
    ) -> Self {
        Self {
            frame: Arc::new(Frame {
                bindings: top_level,
                parent: None,
            }),
            imports: Arc::new(imports),
            functions,
            broker,
            schemas: None,
            attribute_initial_timeout: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Attaches a `SchemaRegistry` handle, consumed by `schema conformance`
    /// expressions (spec §4.4). Optional: a context built without one
    /// simply fails schema-conformance checks with `Undefined` rather than
    /// requiring every engine to wire a registry it does not use.
    pub fn with_schema_registry(mut self, registry: Arc<dyn SchemaRegistry>) -> Self {
        self.schemas = Some(registry);
        self
    }

    pub fn schemas(&self) -> Option<&Arc<dyn SchemaRegistry>> {
        self.schemas.as_ref()
    }

    /// Sets the `initial_timeout` passed to every `attribute_stream` call
    /// made while evaluating this context's expression tree (spec §4.3).
    pub fn with_attribute_initial_timeout(mut self, timeout: Duration) -> Self {
        self.attribute_initial_timeout = Some(timeout);
        self
    }

    pub fn attribute_initial_timeout(&self) -> Option<Duration> {
        self.attribute_initial_timeout
    }

    /// Extends this context with additional bindings, without mutating
    /// `self`. Rejects re-declaration of a top-level `var subject|action|
    /// resource|environment` name at evaluation time (spec §4.2).
    pub fn with_child(
        &self,
        bindings: HashMap<String, Val>,
    ) -> Result<EvaluationContext, EvaluationError> {
        for name in bindings.keys() {
            if RESERVED_TOP_LEVEL_VARS.contains(&name.as_str()) {
                return Err(EvaluationError::DuplicateTopLevelVariable(name.clone()));
            }
        }
        Ok(Self {
            frame: Arc::new(Frame {
                bindings,
                parent: Some(self.frame.clone()),
            }),
            imports: self.imports.clone(),
            functions: self.functions.clone(),
            broker: self.broker.clone(),
            schemas: self.schemas.clone(),
            attribute_initial_timeout: self.attribute_initial_timeout,
            cancellation: self.cancellation.clone(),
        })
    }

    /// Derives a child cancellable from this context's cancellation token,
    /// so cancelling the outermost subscription propagates to every
    /// descendant context (spec §4.2, §5 "Cancellation").
    pub fn child_cancellation(&self) -> CancellationToken {
        self.cancellation.child_token()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves a variable by walking from this frame up to the root.
    /// Unbound identifiers yield `Undefined`, never an error (spec §3, §4.4).
    pub fn resolve(&self, name: &str) -> Val {
        let mut frame = Some(self.frame.as_ref());
        while let Some(f) = frame {
            if let Some(v) = f.bindings.get(name) {
                return v.clone();
            }
            frame = f.parent.as_deref();
        }
        Val::undefined()
    }

    /// Resolves an import alias to a fully-qualified name, falling back to
    /// the name unchanged if no import is registered for it.
    pub fn resolve_import<'a>(&'a self, name: &'a str) -> &'a str {
        self.imports
            .get(name)
            .map(String::as_str)
            .unwrap_or(name)
    }

    pub fn functions(&self) -> &Arc<dyn FunctionRegistry> {
        &self.functions
    }

    pub fn broker(&self) -> &Arc<dyn AttributeBroker> {
        &self.broker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::tests_support::{NullBroker, NullRegistry};

    fn root_ctx() -> EvaluationContext {
        let mut top = HashMap::new();
        top.insert("subject".to_string(), Val::null());
        top.insert("action".to_string(), Val::null());
        top.insert("resource".to_string(), Val::null());
        top.insert("environment".to_string(), Val::null());
        EvaluationContext::root(
            top,
            HashMap::new(),
            Arc::new(NullRegistry),
            Arc::new(NullBroker),
        )
    }

    #[test]
    fn unbound_identifier_resolves_to_undefined() {
        let ctx = root_ctx();
        assert!(ctx.resolve("nonexistent").is_undefined());
    }

    #[test]
    fn child_context_sees_parent_bindings() {
        let ctx = root_ctx();
        let mut child_bindings = HashMap::new();
        child_bindings.insert("x".to_string(), Val::number(1));
        let child = ctx.with_child(child_bindings).unwrap();
        assert!(child.resolve("subject").is_null());
        assert_eq!(child.resolve("x").as_bool(), None);
    }

    #[test]
    fn redeclaring_top_level_variable_is_rejected() {
        let ctx = root_ctx();
        let mut bindings = HashMap::new();
        bindings.insert("subject".to_string(), Val::bool(true));
        let result = ctx.with_child(bindings);
        assert!(result.is_err());
    }

    #[test]
    fn cancelling_parent_cancels_child() {
        let ctx = root_ctx();
        let child_token = ctx.child_cancellation();
        ctx.cancel();
        assert!(child_token.is_cancelled());
    }
}
