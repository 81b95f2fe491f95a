//! A concrete `FunctionRegistry` (spec §6.2): a fixed map of fully
//! qualified names to callables, validated at construction so
//! `RegistrationError` always surfaces synchronously and never mid-stream
//! (spec §7).

use sapl_kernel::error::is_valid_fq_name;
use sapl_kernel::ports::{FunctionRegistry, ParamValidator, RegisteredFunction};
use sapl_kernel::{RegistrationError, Val};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds an immutable `FunctionRegistry` one function at a time. Once
/// `build()` returns, the registry never changes (spec §5: "the function
/// registry is immutable after engine construction").
#[derive(Default)]
pub struct FunctionRegistryBuilder {
    functions: HashMap<String, Arc<RegisteredFunction>>,
}

impl FunctionRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `fq_name` with its parameter validators and implementation.
    /// Rejects a malformed name or a name already registered, synchronously
    /// (spec §7).
    pub fn register(
        mut self,
        fq_name: impl Into<String>,
        validators: Vec<ParamValidator>,
        func: impl Fn(&[Val]) -> Val + Send + Sync + 'static,
    ) -> Result<Self, RegistrationError> {
        let fq_name = fq_name.into();
        if !is_valid_fq_name(&fq_name) {
            return Err(RegistrationError::MalformedName(fq_name));
        }
        if self.functions.contains_key(&fq_name) {
            return Err(RegistrationError::Duplicate(fq_name));
        }
        self.functions.insert(
            fq_name,
            Arc::new(RegisteredFunction {
                validators,
                func: Box::new(func),
            }),
        );
        Ok(self)
    }

    pub fn build(self) -> Arc<dyn FunctionRegistry> {
        Arc::new(StaticFunctionRegistry {
            functions: self.functions,
        })
    }
}

struct StaticFunctionRegistry {
    functions: HashMap<String, Arc<RegisteredFunction>>,
}

impl FunctionRegistry for StaticFunctionRegistry {
    fn lookup(&self, fq_name: &str) -> Option<Arc<RegisteredFunction>> {
        self.functions.get(fq_name).cloned()
    }
}
