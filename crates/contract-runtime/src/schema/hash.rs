//! Stable hashing of runtime values
//!
//! Values are encoded canonically (object keys sorted at every depth, compact
//! JSON, integral floats written as integers) and digested with SHA-256, so
//! structurally equal values hash equally regardless of key order or of
//! `3` versus `3.0`.

use indexmap::IndexMap;
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

use crate::arguments::ArgumentBag;
use crate::contract::InputSpec;

/// Canonical JSON encoding with sorted object keys and integral numbers
pub fn canonical_json(value: &Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::with_capacity(map.len());
            for key in keys {
                out.insert(key.clone(), sorted(&map[key.as_str()]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        Value::Number(n) => integral(n).unwrap_or_else(|| Value::Number(n.clone())),
        other => other.clone(),
    }
}

/// A float without fractional part, as an integer
fn integral(n: &Number) -> Option<Value> {
    let f = n.as_f64().filter(|_| n.is_f64())?;
    // i64::MAX as f64 rounds up to 2^63, hence the strict bound.
    if f.fract() != 0.0 || f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return None;
    }
    Some(Value::from(f as i64))
}

/// SHA-256 (hex) of the canonical encoding of `value`
pub fn hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash an argument bag against its declared inputs
///
/// Inputs whose schema contains an opaque reference are excluded. If any
/// excluded input is required the hash is uncomputable and `None` is
/// returned; such calls cannot be memoized.
pub fn hash_arguments(inputs: &IndexMap<String, InputSpec>, arguments: &ArgumentBag) -> Option<String> {
    let mut hashable = Map::new();
    for (name, spec) in inputs {
        if spec.schema.contains_opaque() {
            if spec.required {
                return None;
            }
            continue;
        }
        if let Some(value) = arguments.get(name) {
            hashable.insert(name.clone(), value.clone());
        }
    }
    Some(hash(&Value::Object(hashable)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::InputSpec;
    use crate::schema::Schema;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({"b": {"y": 1, "x": [{"d": 1, "c": 2}]}, "a": true});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":true,"b":{"x":[{"c":2,"d":1}],"y":1}}"#
        );
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let digest = hash(&json!({"a": 1}));
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(digest, hash(&json!({"a": 2})));
    }

    #[test]
    fn test_hash_arguments_excludes_optional_opaque() {
        let mut inputs = IndexMap::new();
        inputs.insert("a".to_string(), InputSpec::new(Schema::Number).required(true));
        inputs.insert("cb".to_string(), InputSpec::new(Schema::Opaque));

        let mut with_cb = ArgumentBag::new();
        with_cb.insert("a", json!(1));
        with_cb.insert("cb", json!("handle-1"));
        let mut other_cb = ArgumentBag::new();
        other_cb.insert("a", json!(1));
        other_cb.insert("cb", json!("handle-2"));

        let first = hash_arguments(&inputs, &with_cb).unwrap();
        assert_eq!(Some(first), hash_arguments(&inputs, &other_cb));
    }

    #[test]
    fn test_integral_floats_hash_like_integers() {
        assert_eq!(hash(&json!({"n": 3})), hash(&json!({"n": 3.0})));
        assert_eq!(hash(&json!([-0.0])), hash(&json!([0])));
        assert_ne!(hash(&json!({"n": 3})), hash(&json!({"n": 3.5})));
        assert_eq!(canonical_json(&json!({"b": 2.0, "a": 1e3})), r#"{"a":1000,"b":2}"#);
        assert_eq!(canonical_json(&json!(1e300)), json!(1e300).to_string());
    }

    #[test]
    fn test_hash_arguments_uncomputable_for_required_opaque() {
        let mut inputs = IndexMap::new();
        inputs.insert(
            "conn".to_string(),
            InputSpec::new(Schema::record([("socket", Schema::Opaque)])).required(true),
        );
        let mut bag = ArgumentBag::new();
        bag.insert("conn", json!({"socket": 3}));
        assert_eq!(hash_arguments(&inputs, &bag), None);
    }

    fn permuted(value: &Value, seed: u64) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                if seed % 2 == 1 {
                    entries.reverse();
                } else {
                    let shift = entries.len().min(1);
                    entries.rotate_left(shift);
                }
                Value::Object(
                    entries
                        .into_iter()
                        .map(|(k, v)| (k.clone(), permuted(v, seed / 2 + 1)))
                        .collect(),
                )
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| permuted(v, seed)).collect())
            }
            other => other.clone(),
        }
    }

    proptest! {
        #[test]
        fn hash_stable_across_key_order(
            entries in prop::collection::btree_map("[a-f]{1,3}", any::<i64>(), 0..8),
            nested in prop::collection::btree_map("[g-k]{1,2}", "[a-z]{0,4}", 0..5),
            seed in any::<u64>(),
        ) {
            let mut map: Map<String, Value> = entries.into_iter().map(|(k, v)| (k, json!(v))).collect();
            map.insert("nested".to_string(), Value::Object(
                nested.into_iter().map(|(k, v)| (k, Value::String(v))).collect()
            ));
            let value = Value::Object(map);
            prop_assert_eq!(hash(&value), hash(&permuted(&value, seed)));
        }
    }
}
