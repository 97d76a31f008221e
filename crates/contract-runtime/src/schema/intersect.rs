//! Schema intersection
//!
//! Narrows two schemas to one accepting only values valid under both.
//! `None` means no value satisfies both; callers fall back to the broader
//! schema in that case.

use indexmap::IndexMap;

use super::{validate, Schema, ValidationMode};

/// Intersect two schemas
pub fn intersect(a: &Schema, b: &Schema) -> Option<Schema> {
    match (a, b) {
        (Schema::Opaque, other) | (other, Schema::Opaque) => Some(other.clone()),
        (Schema::Json, other) | (other, Schema::Json) => Some(other.clone()),

        (Schema::Exact { value }, other) | (other, Schema::Exact { value }) => {
            validate(other, value, ValidationMode::Strict)
                .ok()
                .map(|_| Schema::exact(value.clone()))
        }

        (Schema::String, Schema::String) => Some(Schema::String),
        (Schema::Number, Schema::Number) => Some(Schema::Number),
        (Schema::Boolean, Schema::Boolean) => Some(Schema::Boolean),

        (Schema::List { items: x }, Schema::List { items: y }) => intersect(x, y).map(Schema::list),

        (Schema::Dictionary, Schema::Dictionary) => Some(Schema::Dictionary),
        (Schema::Dictionary, record @ Schema::Record { .. })
        | (record @ Schema::Record { .. }, Schema::Dictionary) => Some(record.clone()),

        (Schema::Record { fields: left }, Schema::Record { fields: right }) => {
            let mut fields = IndexMap::with_capacity(left.len().max(right.len()));
            for (key, schema) in left {
                let narrowed = match right.get(key) {
                    Some(other) => intersect(schema, other)?,
                    None => schema.clone(),
                };
                fields.insert(key.clone(), narrowed);
            }
            for (key, schema) in right {
                if !fields.contains_key(key) {
                    fields.insert(key.clone(), schema.clone());
                }
            }
            Some(Schema::Record { fields })
        }

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_opaque_and_json_defer_to_other() {
        assert_eq!(intersect(&Schema::Opaque, &Schema::Number), Some(Schema::Number));
        assert_eq!(intersect(&Schema::String, &Schema::Json), Some(Schema::String));
    }

    #[test]
    fn test_disjoint_primitives() {
        assert_eq!(intersect(&Schema::String, &Schema::Number), None);
        assert_eq!(intersect(&Schema::list(Schema::String), &Schema::Dictionary), None);
    }

    #[test]
    fn test_exact_narrows_when_compatible() {
        let exact = Schema::exact(json!("blue"));
        assert_eq!(intersect(&Schema::String, &exact), Some(exact.clone()));
        assert_eq!(intersect(&exact, &Schema::Number), None);
    }

    #[test]
    fn test_records_merge_fields() {
        let a = Schema::record([("id", Schema::Json), ("name", Schema::String)]);
        let b = Schema::record([("id", Schema::Number), ("tags", Schema::list(Schema::String))]);
        assert_eq!(
            intersect(&a, &b),
            Some(Schema::record([
                ("id", Schema::Number),
                ("name", Schema::String),
                ("tags", Schema::list(Schema::String)),
            ]))
        );
    }

    #[test]
    fn test_record_conflict_is_empty() {
        let a = Schema::record([("id", Schema::String)]);
        let b = Schema::record([("id", Schema::Number)]);
        assert_eq!(intersect(&a, &b), None);
    }

    #[test]
    fn test_generic_containers_narrow() {
        let record = Schema::record([("a", Schema::Boolean)]);
        assert_eq!(intersect(&Schema::Dictionary, &record), Some(record.clone()));
        assert_eq!(
            intersect(&Schema::list(Schema::Json), &Schema::list(Schema::Number)),
            Some(Schema::list(Schema::Number))
        );
    }
}
