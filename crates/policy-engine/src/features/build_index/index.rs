//! `TargetIndex`: the concrete PRP (C5, spec §4.5).
//!
//! A read-mostly, `DashMap`-backed store of `IndexedDocument`s, mirroring
//! the broker's per-key `DashMap<String, Arc<KeyState>>` concurrency style.
//! `put`/`remove`/`update_function_context` are safe to call while
//! subscriptions are active; readers always observe either the pre- or
//! post-update snapshot, never a torn one, because each document's
//! `IndexedDocument` is swapped in as a single atomic map entry.

use crate::features::build_index::canonicalize::canonicalize;
use crate::features::build_index::dto::{predicate_holds, IndexMode, IndexedDocument};
use crate::features::build_index::error::BuildIndexError;
use dashmap::DashMap;
use futures::stream::StreamExt;
use sapl_kernel::domain::context::EvaluationContext;
use sapl_kernel::domain::expr::Expr;
use sapl_kernel::domain::subscription::AuthorizationSubscription;
use sapl_kernel::ports::{AttributeBroker, FunctionRegistry};
use sapl_kernel::{DisjunctiveFormula, PolicyDocument, PolicyId, PredicateTable};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
enum PendingUpdate {
    Put(Arc<PolicyDocument>),
    Remove(PolicyId),
}

/// The concrete PRP. Built once per engine and shared behind an `Arc` with
/// every decision subscription (spec §4.5, §6.4).
pub struct TargetIndex {
    documents: DashMap<PolicyId, IndexedDocument>,
    order: RwLock<Vec<PolicyId>>,
    table: RwLock<PredicateTable>,
    functions: RwLock<Arc<dyn FunctionRegistry>>,
    serving: AtomicBool,
    pending: RwLock<Vec<PendingUpdate>>,
}

impl TargetIndex {
    pub fn new(functions: Arc<dyn FunctionRegistry>) -> Self {
        Self {
            documents: DashMap::new(),
            order: RwLock::new(Vec::new()),
            table: RwLock::new(PredicateTable::new()),
            functions: RwLock::new(functions),
            serving: AtomicBool::new(true),
            pending: RwLock::new(Vec::new()),
        }
    }

    /// Enters *loading* mode: subsequent `put`/`remove` calls are buffered
    /// rather than applied immediately (spec §4.5).
    pub fn begin_loading(&self) {
        self.serving.store(false, Ordering::SeqCst);
    }

    /// Re-enters *serving* mode, applying every buffered update atomically
    /// with respect to readers (each individual `put`/`remove` is itself
    /// atomic; "atomically" here means the whole batch becomes visible
    /// before this call returns, spec §4.5 "atomic switchover at the next
    /// attribute tick").
    pub fn end_loading(&self) {
        let batch: Vec<PendingUpdate> = std::mem::take(&mut self.pending.write().expect("pending lock poisoned"));
        self.serving.store(true, Ordering::SeqCst);
        for update in batch {
            match update {
                PendingUpdate::Put(doc) => self.apply_put(doc),
                PendingUpdate::Remove(id) => self.apply_remove(&id),
            }
        }
    }

    pub fn mode(&self) -> IndexMode {
        if self.serving.load(Ordering::SeqCst) {
            IndexMode::Serving
        } else {
            IndexMode::Loading
        }
    }

    /// Indexes `document`, canonicalising its target expression. Submission
    /// order is the order `put` is called in (spec §4.5: "document order is
    /// the submission order supplied by the caller").
    pub fn put(&self, document: Arc<PolicyDocument>) {
        if self.serving.load(Ordering::SeqCst) {
            self.apply_put(document);
        } else {
            self.pending
                .write()
                .expect("pending lock poisoned")
                .push(PendingUpdate::Put(document));
        }
    }

    pub fn remove(&self, id: &PolicyId) {
        if self.serving.load(Ordering::SeqCst) {
            self.apply_remove(id);
        } else {
            self.pending
                .write()
                .expect("pending lock poisoned")
                .push(PendingUpdate::Remove(id.clone()));
        }
    }

    /// Swaps in a new `FunctionRegistry`, used when functions referenced by
    /// target expressions change (spec §4.5 `update_function_context`).
    /// Applied immediately regardless of `serving`/`loading` mode, unlike
    /// `put`/`remove`: it only replaces the handle `candidates()` reads at
    /// the start of its next call, so there is no document-list snapshot
    /// for it to tear.
    pub fn update_function_context(&self, functions: Arc<dyn FunctionRegistry>) {
        *self.functions.write().expect("functions lock poisoned") = functions;
    }

    fn apply_put(&self, document: Arc<PolicyDocument>) {
        let formula = match &document.target_expr {
            Some(expr) => canonicalize(expr, &mut self.table.write().expect("predicate table lock poisoned")),
            None => DisjunctiveFormula::tautology(),
        };
        let id = document.id.clone();
        if self.documents.insert(id.clone(), IndexedDocument { document, formula }).is_none() {
            self.order.write().expect("order lock poisoned").push(id);
        }
    }

    fn apply_remove(&self, id: &PolicyId) {
        if self.documents.remove(id).is_some() {
            self.order.write().expect("order lock poisoned").retain(|existing| existing != id);
        }
    }

    /// Returns every policy document whose target might apply to
    /// `subscription`, in submission order. Evaluates each distinct
    /// predicate once (spec §4.5 option (b)) against a root
    /// `EvaluationContext` built from the subscription, then propagates
    /// truth through each document's formula.
    pub async fn candidates(
        &self,
        subscription: &AuthorizationSubscription,
        broker: Arc<dyn AttributeBroker>,
    ) -> Result<Vec<Arc<PolicyDocument>>, BuildIndexError> {
        let functions = self.functions.read().expect("functions lock poisoned").clone();
        let mut top_level = HashMap::with_capacity(4);
        top_level.insert("subject".to_string(), subscription.subject.clone());
        top_level.insert("action".to_string(), subscription.action.clone());
        top_level.insert("resource".to_string(), subscription.resource.clone());
        top_level.insert("environment".to_string(), subscription.environment.clone());
        let ctx = EvaluationContext::root(top_level, HashMap::new(), functions, broker);

        let predicates: Vec<Arc<Expr>> = {
            let table = self.table.read().expect("predicate table lock poisoned");
            (0..table.len())
                .map(|i| {
                    table
                        .get(sapl_kernel::PredicateId(i as u32))
                        .expect("index within bounds")
                        .clone()
                })
                .collect()
        };
        let mut truth = Vec::with_capacity(predicates.len());
        for predicate in &predicates {
            let value = crate::features::evaluate_policy::evaluator::evaluate(predicate.clone(), ctx.clone())
                .next()
                .await
                .unwrap_or_else(sapl_kernel::domain::value::Val::undefined);
            truth.push(if value.is_error() { None } else { value.as_bool() });
        }

        let order = self.order.read().expect("order lock poisoned").clone();
        let mut result = Vec::with_capacity(order.len());
        for id in order {
            if let Some(indexed) = self.documents.get(&id) {
                if predicate_holds(&indexed.formula, &truth) {
                    result.push(indexed.document.clone());
                }
            }
        }
        Ok(result)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sapl_kernel::domain::decision::Decision;
    use sapl_kernel::domain::value::Val;
    use sapl_kernel::ports::tests_support::NullRegistry;

    fn subscription(role: &str) -> AuthorizationSubscription {
        let mut subject = std::collections::BTreeMap::new();
        subject.insert("role".to_string(), Val::text(role));
        AuthorizationSubscription::without_environment(Val::object(subject), Val::text("read"), Val::text("doc-1"))
    }

    fn doc_with_target(target: Expr) -> Arc<PolicyDocument> {
        Arc::new(PolicyDocument::policy(
            PolicyId::new("p1"),
            "p1",
            Some(target),
            None,
            Decision::Permit,
            Vec::new(),
            Vec::new(),
            None,
        ))
    }

    #[tokio::test]
    async fn policy_with_no_target_is_always_a_candidate() {
        let index = TargetIndex::new(Arc::new(NullRegistry));
        index.put(Arc::new(PolicyDocument::policy(
            PolicyId::new("p1"),
            "p1",
            None,
            None,
            Decision::Permit,
            Vec::new(),
            Vec::new(),
            None,
        )));
        let candidates = index
            .candidates(&subscription("admin"), Arc::new(sapl_kernel::ports::tests_support::NullBroker))
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn policy_whose_target_cannot_match_is_excluded() {
        let index = TargetIndex::new(Arc::new(NullRegistry));
        let target = Expr::Compare {
            op: sapl_kernel::domain::expr::CompareOp::Eq,
            lhs: Arc::new(Expr::FieldAccess {
                base: Arc::new(Expr::ident("subject")),
                field: "role".to_string(),
            }),
            rhs: Arc::new(Expr::literal(Val::text("admin"))),
        };
        index.put(doc_with_target(target));
        let candidates = index
            .candidates(&subscription("guest"), Arc::new(sapl_kernel::ports::tests_support::NullBroker))
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn policy_whose_target_matches_is_included() {
        let index = TargetIndex::new(Arc::new(NullRegistry));
        let target = Expr::Compare {
            op: sapl_kernel::domain::expr::CompareOp::Eq,
            lhs: Arc::new(Expr::FieldAccess {
                base: Arc::new(Expr::ident("subject")),
                field: "role".to_string(),
            }),
            rhs: Arc::new(Expr::literal(Val::text("admin"))),
        };
        index.put(doc_with_target(target));
        let candidates = index
            .candidates(&subscription("admin"), Arc::new(sapl_kernel::ports::tests_support::NullBroker))
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn remove_drops_a_previously_indexed_document() {
        let index = TargetIndex::new(Arc::new(NullRegistry));
        let id = PolicyId::new("p1");
        index.put(Arc::new(PolicyDocument::policy(
            id.clone(),
            "p1",
            None,
            None,
            Decision::Permit,
            Vec::new(),
            Vec::new(),
            None,
        )));
        index.remove(&id);
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn updates_are_buffered_while_loading_and_applied_on_end_loading() {
        let index = TargetIndex::new(Arc::new(NullRegistry));
        index.begin_loading();
        index.put(Arc::new(PolicyDocument::policy(
            PolicyId::new("p1"),
            "p1",
            None,
            None,
            Decision::Permit,
            Vec::new(),
            Vec::new(),
            None,
        )));
        assert!(index.is_empty());
        index.end_loading();
        assert_eq!(index.len(), 1);
    }

    mockall::mock! {
        /// Hand-written mock for the `FunctionRegistry` port (spec §6.2):
        /// `mockall::mock!` rather than `#[automock]` since the trait lives
        /// in `sapl-kernel`, which does not itself depend on `mockall`.
        Registry {}

        impl FunctionRegistry for Registry {
            fn lookup(&self, fq_name: &str) -> Option<Arc<sapl_kernel::ports::RegisteredFunction>>;
        }
    }

    #[tokio::test]
    async fn target_calling_a_mocked_function_filters_candidates() {
        let mut mock = MockRegistry::new();
        mock.expect_lookup()
            .withf(|name| name == "org.is_admin")
            .times(2)
            .returning(|_| {
                Some(Arc::new(sapl_kernel::ports::RegisteredFunction {
                    validators: Vec::new(),
                    func: Box::new(|args: &[Val]| Val::bool(args[0].as_text() == Some("admin"))),
                }))
            });

        let target = Expr::Call {
            function: "org.is_admin".to_string(),
            args: vec![Expr::FieldAccess {
                base: Arc::new(Expr::ident("subject")),
                field: "role".to_string(),
            }],
        };
        let index = TargetIndex::new(Arc::new(mock));
        index.put(doc_with_target(target));

        let admin_candidates = index
            .candidates(&subscription("admin"), Arc::new(sapl_kernel::ports::tests_support::NullBroker))
            .await
            .unwrap();
        assert_eq!(admin_candidates.len(), 1);

        let guest_candidates = index
            .candidates(&subscription("guest"), Arc::new(sapl_kernel::ports::tests_support::NullBroker))
            .await
            .unwrap();
        assert!(guest_candidates.is_empty());
    }
}
