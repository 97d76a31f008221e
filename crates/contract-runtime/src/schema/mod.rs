//! Schema engine
//!
//! A closed tagged union of schema variants plus four pure operations:
//!
//! 1. **Inference** (`infer`) - derive a reusable schema from one sample
//! 2. **Validation** (`validate`) - strict conformance or lenient coercion
//! 3. **Intersection** (`intersect`) - narrow two schemas to their overlap
//! 4. **Hashing** (`hash`) - deterministic, key-order-independent digests

pub mod hash;
pub mod infer;
pub mod intersect;
pub mod validate;

pub use hash::{canonical_json, hash, hash_arguments};
pub use infer::{infer, EXACT_KEY, JSON_MARKER, OPAQUE_MARKER};
pub use intersect::intersect;
pub use validate::{validate, validate_at, ValidationMode, Violation};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Description of a value's expected shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Schema {
    String,
    Number,
    Boolean,
    /// Any JSON-compatible value
    Json,
    /// Unconstrained reference: never checked, never hashed
    Opaque,
    /// Structural equality with `value` required
    Exact { value: Value },
    /// Homogeneous list
    List { items: Box<Schema> },
    /// Generic object with arbitrary keys
    Dictionary,
    /// Fixed-shape object
    Record { fields: IndexMap<String, Schema> },
}

impl Schema {
    pub fn list(items: Schema) -> Self {
        Schema::List {
            items: Box::new(items),
        }
    }

    pub fn exact(value: Value) -> Self {
        Schema::Exact { value }
    }

    pub fn record<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Schema)>,
    {
        Schema::Record {
            fields: fields.into_iter().map(|(k, s)| (k.into(), s)).collect(),
        }
    }

    /// Whether this schema (or any nested schema) is opaque
    pub fn contains_opaque(&self) -> bool {
        match self {
            Schema::Opaque => true,
            Schema::List { items } => items.contains_opaque(),
            Schema::Record { fields } => fields.values().any(Schema::contains_opaque),
            _ => false,
        }
    }

    /// Short type name used in violation messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Schema::String => "string",
            Schema::Number => "number",
            Schema::Boolean => "boolean",
            Schema::Json => "json",
            Schema::Opaque => "ref",
            Schema::Exact { .. } => "exact",
            Schema::List { .. } => "list",
            Schema::Dictionary => "dictionary",
            Schema::Record { .. } => "record",
        }
    }

    /// Element schema for list schemas (`Json` for generic values)
    pub fn item_schema(&self) -> Option<Schema> {
        match self {
            Schema::List { items } => Some((**items).clone()),
            Schema::Json => Some(Schema::Json),
            Schema::Opaque => Some(Schema::Opaque),
            _ => None,
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schema::Exact { value } => write!(f, "exact({})", value),
            Schema::List { items } => write!(f, "list<{}>", items),
            Schema::Record { fields } => {
                write!(f, "{{")?;
                for (i, (key, schema)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, schema)?;
                }
                write!(f, "}}")
            }
            other => write!(f, "{}", other.type_name()),
        }
    }
}

/// JSON type name of a runtime value
pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
