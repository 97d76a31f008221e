//! Contracts: normalized, immutable descriptions of a unit of work
//!
//! A `Contract` is produced once from a `Declaration` and then shared
//! through `Arc` by any number of concurrent invocations. It is never
//! mutated; customizing runtime options derives a new contract, memoized
//! per parent.

pub mod declaration;
pub mod identity;
pub mod implementation;
pub mod normalize;
pub mod spec;

pub use declaration::{Declaration, InputDeclaration, OutcomeDeclaration};
pub use identity::{derive_identity, kebab_case, RESERVED_IDENTITIES};
pub use implementation::Implementation;
pub use spec::{CachePolicy, InputSpec, OutcomeSpec, OutputSchema, Rule};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::arguments::UnknownKeyPolicy;
use crate::schema::{canonical_json, ValidationMode};
use crate::telemetry::InvocationMetrics;
use crate::usage::{BindingStyle, TriggeringStyle};

/// Name of the default success outcome
pub const SUCCESS: &str = "success";

/// Name of the catch-all failure outcome
pub const ERROR: &str = "error";

/// Per-contract runtime behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub validation_mode: ValidationMode,
    pub unknown_keys: UnknownKeyPolicy,
    /// Skip argument and output validation (the exit guard still applies)
    pub unchecked: bool,
    /// Consult and populate the cache when a policy and a store exist
    pub caching: bool,
}

/// Overrides for `Contract::customize`; unset fields keep the parent's value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customization {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_mode: Option<ValidationMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unknown_keys: Option<UnknownKeyPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caching: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unchecked: Option<bool>,
}

impl Customization {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validation_mode(mut self, mode: ValidationMode) -> Self {
        self.validation_mode = Some(mode);
        self
    }

    pub fn strict(self) -> Self {
        self.validation_mode(ValidationMode::Strict)
    }

    pub fn unknown_keys(mut self, policy: UnknownKeyPolicy) -> Self {
        self.unknown_keys = Some(policy);
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn caching(mut self, enabled: bool) -> Self {
        self.caching = Some(enabled);
        self
    }

    pub fn unchecked(mut self, unchecked: bool) -> Self {
        self.unchecked = Some(unchecked);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Memo key: canonical JSON of the set fields
    fn memo_key(&self) -> String {
        match serde_json::to_value(self) {
            Ok(value) => canonical_json(&value),
            Err(_) => format!("{:?}", self),
        }
    }
}

/// A normalized contract
#[derive(Debug)]
pub struct Contract {
    pub(crate) identity: String,
    pub(crate) friendly_name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) inputs: IndexMap<String, InputSpec>,
    pub(crate) outcomes: IndexMap<String, OutcomeSpec>,
    pub(crate) implementation: Implementation,
    pub(crate) synchronous: bool,
    pub(crate) timeout_ms: Option<u64>,
    pub(crate) cache: Option<CachePolicy>,
    pub(crate) args_order: Option<Vec<String>>,
    pub(crate) binding: BindingStyle,
    pub(crate) triggering: TriggeringStyle,
    pub(crate) options: RuntimeOptions,
    pub(crate) metrics: Option<Arc<InvocationMetrics>>,
    /// Memoized derivatives, keyed by canonical customization
    customizations: Mutex<HashMap<String, Arc<Contract>>>,
}

impl Contract {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.friendly_name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn inputs(&self) -> &IndexMap<String, InputSpec> {
        &self.inputs
    }

    pub fn input(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.get(name)
    }

    pub fn outcomes(&self) -> &IndexMap<String, OutcomeSpec> {
        &self.outcomes
    }

    pub fn outcome(&self, name: &str) -> Option<&OutcomeSpec> {
        self.outcomes.get(name)
    }

    pub fn implementation(&self) -> &Implementation {
        &self.implementation
    }

    pub fn is_synchronous(&self) -> bool {
        self.synchronous
    }

    /// Effective deadline; `None` when disabled
    pub fn timeout_ms(&self) -> Option<u64> {
        self.timeout_ms.filter(|ms| *ms > 0)
    }

    pub fn cache_policy(&self) -> Option<&CachePolicy> {
        self.cache.as_ref()
    }

    pub fn args_order(&self) -> Option<&[String]> {
        self.args_order.as_deref()
    }

    pub fn binding(&self) -> BindingStyle {
        self.binding
    }

    pub fn triggering(&self) -> TriggeringStyle {
        self.triggering
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub(crate) fn metrics(&self) -> Option<&InvocationMetrics> {
        self.metrics.as_deref()
    }

    /// Whether any outcome's schema depends on the invocation's arguments
    pub(crate) fn has_relative_outputs(&self) -> bool {
        self.outcomes
            .values()
            .filter_map(|o| o.output.as_ref())
            .any(OutputSchema::needs_arguments)
    }

    /// Derive a contract with overridden runtime options
    ///
    /// Derivatives are memoized: equal customizations of the same contract
    /// return the same `Arc`. An empty customization returns `self`.
    pub fn customize(self: &Arc<Self>, customization: &Customization) -> Arc<Contract> {
        if customization.is_empty() {
            return Arc::clone(self);
        }

        let key = customization.memo_key();
        let mut memo = self
            .customizations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = memo.get(&key) {
            return Arc::clone(existing);
        }

        debug!(contract = %self.identity, customization = %key, "Deriving customized contract");
        let derived = Arc::new(self.derive(customization));
        memo.insert(key, Arc::clone(&derived));
        derived
    }

    fn derive(&self, customization: &Customization) -> Contract {
        let options = RuntimeOptions {
            validation_mode: customization
                .validation_mode
                .unwrap_or(self.options.validation_mode),
            unknown_keys: customization.unknown_keys.unwrap_or(self.options.unknown_keys),
            unchecked: customization.unchecked.unwrap_or(self.options.unchecked),
            caching: customization.caching.unwrap_or(self.options.caching),
        };

        Contract {
            identity: self.identity.clone(),
            friendly_name: self.friendly_name.clone(),
            description: self.description.clone(),
            inputs: self.inputs.clone(),
            outcomes: self.outcomes.clone(),
            implementation: self.implementation.clone(),
            synchronous: self.synchronous,
            timeout_ms: customization.timeout_ms.or(self.timeout_ms),
            cache: self.cache.clone(),
            args_order: self.args_order.clone(),
            binding: self.binding,
            triggering: self.triggering,
            options,
            metrics: self.metrics.clone(),
            customizations: Mutex::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use serde_json::json;

    fn echo() -> Arc<Contract> {
        Declaration::new()
            .identity("echo")
            .input("value", InputDeclaration::new().schema(Schema::Json))
            .implementation(Implementation::synchronous(|args, exits, _| {
                exits.success(args.get("value").cloned().unwrap_or(json!(null)));
                Ok(())
            }))
            .sync(true)
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_outcomes_present() {
        let contract = echo();
        assert!(contract.outcome(SUCCESS).is_some());
        assert!(contract.outcome(ERROR).is_some());
        assert!(!contract.outcome(SUCCESS).unwrap().is_void());
        assert!(contract.outcome(ERROR).unwrap().is_void());
    }

    #[test]
    fn test_customize_is_memoized() {
        let contract = echo();
        let strict = Customization::new().strict();

        let first = contract.customize(&strict);
        let second = contract.customize(&Customization::new().strict());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.options().validation_mode, ValidationMode::Strict);
        assert_eq!(contract.options().validation_mode, ValidationMode::Lenient);

        let other = contract.customize(&Customization::new().timeout_ms(5));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(other.timeout_ms(), Some(5));
    }

    #[test]
    fn test_empty_customization_returns_self() {
        let contract = echo();
        assert!(Arc::ptr_eq(&contract, &contract.customize(&Customization::new())));
    }

    #[test]
    fn test_memo_key_ignores_field_order() {
        let a = Customization::new().caching(false).unchecked(true);
        let b = Customization::new().unchecked(true).caching(false);
        assert_eq!(a.memo_key(), b.memo_key());
    }
}
