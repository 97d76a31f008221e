//! Argument bag and argument processing
//!
//! Raw caller arguments are checked against the declared inputs in
//! declaration order. Every violation is collected before returning so that
//! one call reports all of its problems at once.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::contract::InputSpec;
use crate::schema::validate::codes;
use crate::schema::{validate_at, ValidationMode, Violation};

/// Named arguments of one invocation, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArgumentBag(IndexMap<String, Value>);

impl ArgumentBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.0
    }

    /// The bag as a JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

impl From<Map<String, Value>> for ArgumentBag {
    fn from(map: Map<String, Value>) -> Self {
        Self(map.into_iter().collect())
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for ArgumentBag {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// What to do with argument keys that match no declared input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownKeyPolicy {
    /// Drop silently
    Drop,
    /// Drop and log a warning
    #[default]
    Warn,
    /// Report a violation
    Reject,
}

impl fmt::Display for UnknownKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownKeyPolicy::Drop => write!(f, "drop"),
            UnknownKeyPolicy::Warn => write!(f, "warn"),
            UnknownKeyPolicy::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for UnknownKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "drop" | "ignore" => Ok(UnknownKeyPolicy::Drop),
            "warn" => Ok(UnknownKeyPolicy::Warn),
            "reject" | "deny" => Ok(UnknownKeyPolicy::Reject),
            other => Err(format!("unknown key policy `{}`", other)),
        }
    }
}

/// Sanitize raw arguments against declared inputs
///
/// Defaults are cloned into the output bag, so no two invocations ever share
/// a default value. Violations for declared inputs come first (in declaration
/// order), followed by unknown keys when the policy rejects them.
pub fn process(
    contract: &str,
    inputs: &IndexMap<String, InputSpec>,
    mut raw: ArgumentBag,
    mode: ValidationMode,
    unknown_keys: UnknownKeyPolicy,
) -> Result<ArgumentBag, Vec<Violation>> {
    let mut sanitized = ArgumentBag::new();
    let mut violations = Vec::new();

    for (name, spec) in inputs {
        let value = match raw.remove(name) {
            Some(value) => value,
            None => match &spec.default_value {
                Some(default) => default.clone(),
                None => {
                    if spec.required {
                        violations.push(Violation::new(
                            codes::REQUIRED,
                            name,
                            format!("{} is required", name),
                        ));
                    }
                    continue;
                }
            },
        };

        if value.is_null() {
            if spec.nullable {
                sanitized.insert(name.clone(), Value::Null);
            } else {
                violations.push(Violation::new(
                    codes::NULL,
                    name,
                    format!("{} must not be null", name),
                ));
            }
            continue;
        }

        match validate_at(&spec.schema, &value, mode, name) {
            Ok(coerced) => {
                let before = violations.len();
                violations.extend(spec.rules.iter().filter_map(|rule| rule.check(&coerced, name)));
                if violations.len() == before {
                    sanitized.insert(name.clone(), coerced);
                }
            }
            Err(found) => violations.extend(found),
        }
    }

    for key in raw.keys() {
        match unknown_keys {
            UnknownKeyPolicy::Drop => {}
            UnknownKeyPolicy::Warn => {
                warn!(contract = %contract, key = %key, "Dropping undeclared argument");
            }
            UnknownKeyPolicy::Reject => violations.push(Violation::new(
                codes::UNKNOWN_INPUT,
                key,
                format!("{} is not a declared input", key),
            )),
        }
    }

    if violations.is_empty() {
        Ok(sanitized)
    } else {
        Err(violations)
    }
}

/// Apply defaults without validating, keeping only declared inputs
pub fn fill_defaults(inputs: &IndexMap<String, InputSpec>, mut raw: ArgumentBag) -> ArgumentBag {
    let mut filled = ArgumentBag::new();
    for (name, spec) in inputs {
        match raw.remove(name) {
            Some(value) => {
                filled.insert(name.clone(), value);
            }
            None => {
                if let Some(default) = &spec.default_value {
                    filled.insert(name.clone(), default.clone());
                }
            }
        }
    }
    filled
}
