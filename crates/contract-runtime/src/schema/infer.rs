//! Schema inference from a representative example
//!
//! Primitives map to their type, empty containers to generic containers,
//! and a few literal markers select special semantics:
//!
//! - `"*"` - any JSON value
//! - `"==="` - opaque reference
//! - `{"$exact": v}` - structural equality with `v`

use serde_json::Value;

use super::Schema;
use crate::error::{Result, SchemaError};

/// Example marker for "any JSON value"
pub const JSON_MARKER: &str = "*";

/// Example marker for an opaque reference
pub const OPAQUE_MARKER: &str = "===";

/// Single key of an exact-match example object
pub const EXACT_KEY: &str = "$exact";

/// Infer a schema from a representative example
///
/// Fails on `null` (it describes no type) and on lists whose items do not
/// share a single shape.
pub fn infer(example: &Value) -> Result<Schema> {
    infer_at(example, "$")
}

fn infer_at(example: &Value, path: &str) -> Result<Schema> {
    match example {
        Value::Null => Err(SchemaError::ambiguous(
            path,
            "null does not describe a type",
        )),
        Value::Bool(_) => Ok(Schema::Boolean),
        Value::Number(_) => Ok(Schema::Number),
        Value::String(s) if s == JSON_MARKER => Ok(Schema::Json),
        Value::String(s) if s == OPAQUE_MARKER => Ok(Schema::Opaque),
        Value::String(_) => Ok(Schema::String),
        Value::Array(items) => {
            let Some(first) = items.first() else {
                return Ok(Schema::list(Schema::Json));
            };
            let item_schema = infer_at(first, &format!("{}[0]", path))?;
            for (i, item) in items.iter().enumerate().skip(1) {
                let other = infer_at(item, &format!("{}[{}]", path, i))?;
                if other != item_schema {
                    return Err(SchemaError::ambiguous(
                        path,
                        format!(
                            "list example mixes `{}` and `{}` items",
                            item_schema, other
                        ),
                    ));
                }
            }
            Ok(Schema::list(item_schema))
        }
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(value) = map.get(EXACT_KEY) {
                    return Ok(Schema::exact(value.clone()));
                }
            }
            if map.is_empty() {
                return Ok(Schema::Dictionary);
            }
            let mut fields = indexmap::IndexMap::with_capacity(map.len());
            for (key, value) in map {
                fields.insert(key.clone(), infer_at(value, &format!("{}.{}", path, key))?);
            }
            Ok(Schema::Record { fields })
        }
    }
}
