//! Validation and coercion of values against a schema
//!
//! `Strict` mode requires the value to already conform. `Lenient` mode also
//! accepts representations that convert unambiguously (a numeric string into
//! a number, a number into a string, `"true"` into a boolean) and drops
//! undeclared record keys, but still rejects structural mismatches such as an
//! object where a string is expected.
//!
//! Every violation is collected; validation never stops at the first one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

use super::{value_type_name, Schema};

/// Validation strictness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Values must already conform
    Strict,
    /// Unambiguous conversions are applied
    #[default]
    Lenient,
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationMode::Strict => write!(f, "strict"),
            ValidationMode::Lenient => write!(f, "lenient"),
        }
    }
}

impl std::str::FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(ValidationMode::Strict),
            "lenient" | "loose" => Ok(ValidationMode::Lenient),
            _ => Err(format!("Unknown validation mode: {}", s)),
        }
    }
}

/// Violation codes
pub mod codes {
    pub const TYPE: &str = "E_TYPE";
    pub const EXACT: &str = "E_EXACT";
    pub const MISSING_FIELD: &str = "E_MISSING_FIELD";
    pub const EXTRA_FIELD: &str = "E_EXTRA_FIELD";
    pub const REQUIRED: &str = "E_REQUIRED";
    pub const NULL: &str = "E_NULL";
    pub const RULE: &str = "E_RULE";
    pub const UNKNOWN_INPUT: &str = "E_UNKNOWN_INPUT";
}

/// A single violated field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Violation code
    pub code: String,
    /// Path to the offending value (e.g. `name`, `items[2].id`)
    pub path: String,
    /// Human-readable message
    pub message: String,
    /// Expected type or value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// Actual type or value found
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl Violation {
    pub fn new(code: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            path: path.into(),
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    /// Type mismatch at `path`
    pub fn type_mismatch(path: &str, schema: &Schema, value: &Value) -> Self {
        Self::new(
            codes::TYPE,
            path,
            format!(
                "{} should be {} but got {}",
                path,
                schema,
                value_type_name(value)
            ),
        )
        .with_expected(schema.to_string())
        .with_actual(value_type_name(value))
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = Some(actual.into());
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Validate `value` against `schema`, returning the (possibly coerced) value
pub fn validate(schema: &Schema, value: &Value, mode: ValidationMode) -> Result<Value, Vec<Violation>> {
    validate_at(schema, value, mode, "$")
}

/// Validate with violations reported relative to `path`
pub fn validate_at(
    schema: &Schema,
    value: &Value,
    mode: ValidationMode,
    path: &str,
) -> Result<Value, Vec<Violation>> {
    let mut violations = Vec::new();
    let coerced = coerce(schema, value, mode, path, &mut violations);
    if violations.is_empty() {
        Ok(coerced)
    } else {
        Err(violations)
    }
}

fn coerce(
    schema: &Schema,
    value: &Value,
    mode: ValidationMode,
    path: &str,
    violations: &mut Vec<Violation>,
) -> Value {
    let lenient = mode == ValidationMode::Lenient;

    match (schema, value) {
        (Schema::Opaque, v) | (Schema::Json, v) => v.clone(),

        (Schema::Exact { value: expected }, v) => {
            if v != expected {
                violations.push(
                    Violation::new(
                        codes::EXACT,
                        path,
                        format!("{} should equal {}", path, expected),
                    )
                    .with_expected(expected.to_string())
                    .with_actual(v.to_string()),
                );
            }
            v.clone()
        }

        (Schema::String, Value::String(s)) => Value::String(s.clone()),
        (Schema::String, Value::Number(n)) if lenient => Value::String(n.to_string()),
        (Schema::String, Value::Bool(b)) if lenient => Value::String(b.to_string()),

        (Schema::Number, Value::Number(n)) => Value::Number(n.clone()),
        (Schema::Number, Value::String(s)) if lenient => match parse_number(s) {
            Some(n) => Value::Number(n),
            None => {
                violations.push(
                    Violation::new(
                        codes::TYPE,
                        path,
                        format!("{} should be number but got non-numeric string", path),
                    )
                    .with_expected("number")
                    .with_actual(format!("{:?}", s)),
                );
                value.clone()
            }
        },

        (Schema::Boolean, Value::Bool(b)) => Value::Bool(*b),
        (Schema::Boolean, v) if lenient => match parse_boolean(v) {
            Some(b) => Value::Bool(b),
            None => {
                violations.push(Violation::type_mismatch(path, schema, v));
                v.clone()
            }
        },

        (Schema::List { items }, Value::Array(arr)) => Value::Array(
            arr.iter()
                .enumerate()
                .map(|(i, item)| coerce(items, item, mode, &format!("{}[{}]", path, i), violations))
                .collect(),
        ),

        (Schema::Dictionary, Value::Object(map)) => Value::Object(map.clone()),

        (Schema::Record { fields }, Value::Object(map)) => {
            let mut out = Map::with_capacity(fields.len());
            for (key, field_schema) in fields {
                let field_path = format!("{}.{}", path, key);
                match map.get(key) {
                    Some(field_value) => {
                        out.insert(
                            key.clone(),
                            coerce(field_schema, field_value, mode, &field_path, violations),
                        );
                    }
                    None => violations.push(
                        Violation::new(
                            codes::MISSING_FIELD,
                            &field_path,
                            format!("{} is missing", field_path),
                        )
                        .with_expected(field_schema.to_string()),
                    ),
                }
            }
            if !lenient {
                for key in map.keys().filter(|k| !fields.contains_key(*k)) {
                    let field_path = format!("{}.{}", path, key);
                    violations.push(Violation::new(
                        codes::EXTRA_FIELD,
                        &field_path,
                        format!("{} is not a declared field", field_path),
                    ));
                }
            }
            Value::Object(out)
        }

        (schema, v) => {
            violations.push(Violation::type_mismatch(path, schema, v));
            v.clone()
        }
    }
}

/// Parse a numeric string into a JSON number, preferring integers
fn parse_number(s: &str) -> Option<Number> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Number::from(i));
    }
    let f = trimmed.parse::<f64>().ok().filter(|f| f.is_finite())?;
    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        return Some(Number::from(f as i64));
    }
    Number::from_f64(f)
}

fn parse_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 1.0 => Some(true),
            Some(f) if f == 0.0 => Some(false),
            _ => None,
        },
        _ => None,
    }
}
