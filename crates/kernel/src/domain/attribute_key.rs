//! `AttributeSubscriptionKey` (spec §3, §4.3).

use crate::domain::value::Val;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A SHA-256 fingerprint of the variables bound in the evaluation context at
/// subscribe time, used so the broker can distinguish two subscriptions to
/// the same attribute that would otherwise resolve differently because they
/// see different bound variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariablesDigest(pub [u8; 32]);

impl VariablesDigest {
    pub fn of(serialized_variables: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(serialized_variables.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn empty() -> Self {
        Self::of("")
    }
}

/// Identifies one attribute stream the broker can multiplex across
/// subscribers: fully-qualified name, optional entity, positional
/// arguments, and the variables digest of the subscribing context
/// (spec §3, §4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSubscriptionKey {
    pub fq_name: String,
    pub entity: Option<Val>,
    pub arguments: Vec<Val>,
    pub variables_digest: VariablesDigest,
}

impl AttributeSubscriptionKey {
    pub fn new(
        fq_name: impl Into<String>,
        entity: Option<Val>,
        arguments: Vec<Val>,
        variables_digest: VariablesDigest,
    ) -> Self {
        Self {
            fq_name: fq_name.into(),
            entity,
            arguments,
            variables_digest,
        }
    }

    /// Environment attribute convenience constructor: no entity argument.
    pub fn environment(
        fq_name: impl Into<String>,
        arguments: Vec<Val>,
        variables_digest: VariablesDigest,
    ) -> Self {
        Self::new(fq_name, None, arguments, variables_digest)
    }

    /// A stable cache-key string, derived by display-rendering entity and
    /// arguments. Used by hash-map based broker implementations that cannot
    /// use `Val` as a map key directly (its `Number` wraps `Decimal`, which
    /// is `Eq`/`Hash`, but `Array`/`Object` recursion makes manual `Hash`
    /// brittle to maintain in lockstep with `val_eq`; a canonical string key
    /// sidesteps that entirely).
    pub fn cache_key(&self) -> String {
        let entity_part = self
            .entity
            .as_ref()
            .map(Val::display_safe)
            .unwrap_or_default();
        let args_part: Vec<String> = self.arguments.iter().map(Val::display_safe).collect();
        format!(
            "{}|{}|{}|{}",
            self.fq_name,
            entity_part,
            args_part.join(","),
            hex_digest(&self.variables_digest.0)
        )
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_for_equal_keys() {
        let digest = VariablesDigest::of("a=1");
        let k1 = AttributeSubscriptionKey::new("org.attr", None, vec![Val::number(1)], digest);
        let k2 = AttributeSubscriptionKey::new("org.attr", None, vec![Val::number(1)], digest);
        assert_eq!(k1.cache_key(), k2.cache_key());
    }

    #[test]
    fn cache_key_differs_for_different_arguments() {
        let digest = VariablesDigest::empty();
        let k1 = AttributeSubscriptionKey::new("org.attr", None, vec![Val::number(1)], digest);
        let k2 = AttributeSubscriptionKey::new("org.attr", None, vec![Val::number(2)], digest);
        assert_ne!(k1.cache_key(), k2.cache_key());
    }
}
