//! Declaration normalization
//!
//! Turns a raw `Declaration` into a `Contract`, or reports every problem it
//! finds. Nothing is partially built: one problem fails the whole build.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use super::declaration::{Declaration, InputDeclaration, OutcomeDeclaration, OutputSource};
use super::identity::derive_identity;
use super::spec::{describe, InputSpec, OutcomeSpec, OutputSchema};
use super::{Contract, RuntimeOptions, ERROR, SUCCESS};
use crate::config::RuntimeConfig;
use crate::error::{ContractError, DeclarationProblem};
use crate::schema::{infer, validate, Schema, ValidationMode};

pub(crate) fn normalize(declaration: Declaration, config: &RuntimeConfig) -> Result<Contract, ContractError> {
    let mut problems = Vec::new();

    let identity = match derive_identity(
        declaration.identity.as_deref(),
        declaration.friendly_name.as_deref(),
        declaration.implementation.as_ref().and_then(|i| i.name()),
    ) {
        Ok(identity) => Some(identity),
        Err(problem) => {
            problems.push(problem);
            None
        }
    };

    match &declaration.implementation {
        None => problems.push(DeclarationProblem::new(
            "implementation",
            "no implementation supplied",
        )),
        Some(implementation) if declaration.sync && !implementation.is_sync() => {
            problems.push(DeclarationProblem::new(
                "implementation",
                "a synchronous contract requires a synchronous implementation",
            ))
        }
        Some(_) => {}
    }

    let mut inputs = IndexMap::with_capacity(declaration.inputs.len());
    for (name, input) in &declaration.inputs {
        if let Some(spec) = normalize_input(name, input, config.validation_mode, &mut problems) {
            inputs.insert(name.clone(), spec);
        }
    }

    let mut outcomes = IndexMap::with_capacity(declaration.outcomes.len() + 2);
    for (name, outcome) in &declaration.outcomes {
        if let Some(spec) = normalize_outcome(name, outcome, &declaration, &mut problems) {
            outcomes.insert(name.clone(), spec);
        }
    }
    // An undeclared `success` passes any payload through; `error` is normalized on delivery.
    if !declaration.outcomes.contains_key(SUCCESS) {
        outcomes.insert(SUCCESS.to_string(), OutcomeSpec::with_schema(Schema::Json));
    }
    if !declaration.outcomes.contains_key(ERROR) {
        outcomes.insert(ERROR.to_string(), OutcomeSpec::void());
    }

    if let Some(order) = &declaration.args_order {
        let mut seen = HashSet::new();
        for name in order {
            if !declaration.inputs.contains_key(name) {
                problems.push(DeclarationProblem::new(
                    "args_order",
                    format!("`{}` is not a declared input", name),
                ));
            } else if !seen.insert(name.as_str()) {
                problems.push(DeclarationProblem::new(
                    "args_order",
                    format!("`{}` is listed more than once", name),
                ));
            }
        }
    }

    let cache = declaration.cache.clone().map(|mut policy| {
        if policy.outcome == ERROR {
            problems.push(DeclarationProblem::new(
                "cache.outcome",
                "the error outcome cannot be cached",
            ));
        } else if !declaration.outcomes.contains_key(&policy.outcome) && policy.outcome != SUCCESS {
            problems.push(DeclarationProblem::new(
                "cache.outcome",
                format!("`{}` is not a declared outcome", policy.outcome),
            ));
        }
        policy.ttl = policy.ttl.or(Some(Duration::from_millis(config.cache_ttl_ms)));
        policy.gc_buffer = policy.gc_buffer.or(Some(config.cache_gc_buffer));
        policy
    });

    let timeout_ms = declaration
        .timeout_ms
        .or(Some(config.default_timeout_ms))
        .filter(|ms| *ms > 0);
    if declaration.sync && timeout_ms.is_some() {
        debug!(identity = ?identity, "Deadline ignored for synchronous contract");
    }

    let (Some(identity), Some(implementation), true) =
        (identity, declaration.implementation.clone(), problems.is_empty())
    else {
        return Err(ContractError::Malformed(problems));
    };

    debug!(
        contract = %identity,
        inputs = inputs.len(),
        outcomes = outcomes.len(),
        "Contract normalized"
    );

    Ok(Contract {
        identity,
        friendly_name: declaration.friendly_name,
        description: declaration.description,
        inputs,
        outcomes,
        implementation,
        synchronous: declaration.sync,
        timeout_ms: if declaration.sync { None } else { timeout_ms },
        cache,
        args_order: declaration.args_order,
        binding: declaration.binding,
        triggering: declaration.triggering,
        options: RuntimeOptions {
            validation_mode: config.validation_mode,
            unknown_keys: config.unknown_keys,
            unchecked: false,
            caching: true,
        },
        metrics: declaration.metrics.filter(|_| config.metrics),
        customizations: Mutex::new(Default::default()),
    })
}

fn normalize_input(
    name: &str,
    input: &InputDeclaration,
    mode: ValidationMode,
    problems: &mut Vec<DeclarationProblem>,
) -> Option<InputSpec> {
    let path = format!("inputs.{}", name);
    let before = problems.len();

    if name.is_empty() {
        problems.push(DeclarationProblem::new("inputs", "input names must not be empty"));
    }
    for problem in &input.problems {
        problems.push(DeclarationProblem::new(&path, problem.clone()));
    }

    let schema = match (&input.schema, &input.example) {
        (Some(schema), _) => Some(schema.clone()),
        (None, Some(example)) => match infer(example) {
            Ok(schema) => Some(schema),
            Err(e) => {
                problems.push(DeclarationProblem::new(&path, format!("example is unusable: {}", e)));
                None
            }
        },
        (None, None) => implied_schema(input, &path, problems),
    };
    let schema = schema?;

    let default_value = match &input.default_value {
        Some(Value::Null) if !input.nullable => {
            problems.push(DeclarationProblem::new(
                &path,
                "default is null but the input is not nullable",
            ));
            None
        }
        Some(Value::Null) => Some(Value::Null),
        Some(default) => match validate(&schema, default, mode) {
            Ok(coerced) => Some(coerced),
            Err(violations) => {
                let details: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
                problems.push(DeclarationProblem::new(
                    &path,
                    format!(
                        "default {} does not match {}: {}",
                        describe(default),
                        schema,
                        details.join("; ")
                    ),
                ));
                None
            }
        },
        None => None,
    };

    if problems.len() > before {
        return None;
    }

    Some(InputSpec {
        schema,
        required: input.required,
        nullable: input.nullable,
        default_value,
        rules: input.rules.clone(),
        read_only: input.read_only,
        description: input.description.clone(),
    })
}

/// Schema implied by shorthand rules; all typed rules must agree
fn implied_schema(
    input: &InputDeclaration,
    path: &str,
    problems: &mut Vec<DeclarationProblem>,
) -> Option<Schema> {
    let implied: Vec<Schema> = input.rules.iter().filter_map(|r| r.implied_schema()).collect();
    let Some(first) = implied.first() else {
        problems.push(DeclarationProblem::new(
            path,
            "no schema, example or typed rule to derive a schema from",
        ));
        return None;
    };
    if implied.iter().any(|s| s != first) {
        problems.push(DeclarationProblem::new(
            path,
            "rules imply conflicting types",
        ));
        return None;
    }
    Some(first.clone())
}

fn normalize_outcome(
    name: &str,
    outcome: &OutcomeDeclaration,
    declaration: &Declaration,
    problems: &mut Vec<DeclarationProblem>,
) -> Option<OutcomeSpec> {
    let path = format!("outcomes.{}", name);
    let base = || outcome.base.clone().unwrap_or(Schema::Json);
    let check_input = |input: &str, problems: &mut Vec<DeclarationProblem>| {
        let known = declaration.inputs.contains_key(input);
        if !known {
            problems.push(DeclarationProblem::new(
                &path,
                format!("output refers to undeclared input `{}`", input),
            ));
        }
        known
    };

    let output = match &outcome.output {
        None => None,
        Some(OutputSource::Schema(schema)) => Some(OutputSchema::Static(schema.clone())),
        Some(OutputSource::Example(example)) => match infer(example) {
            Ok(schema) => Some(OutputSchema::Static(schema)),
            Err(e) => {
                problems.push(DeclarationProblem::new(&path, format!("example is unusable: {}", e)));
                return None;
            }
        },
        Some(OutputSource::Like(input)) => {
            if !check_input(input.as_str(), problems) {
                return None;
            }
            Some(OutputSchema::Like {
                input: input.clone(),
                base: base(),
            })
        }
        Some(OutputSource::ItemOf(input)) => {
            if !check_input(input.as_str(), problems) {
                return None;
            }
            Some(OutputSchema::ItemOf {
                input: input.clone(),
                base: base(),
            })
        }
        Some(OutputSource::Computed(compute)) => Some(OutputSchema::Computed(compute.clone())),
    };

    Some(OutcomeSpec {
        output,
        description: outcome.description.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{CachePolicy, Implementation};
    use serde_json::json;

    fn noop() -> Implementation {
        Implementation::asynchronous(|_, exits, _| async move {
            exits.success(Value::Null);
            Ok(())
        })
    }

    fn problems_of(declaration: Declaration) -> Vec<DeclarationProblem> {
        match declaration.build() {
            Err(ContractError::Malformed(problems)) => problems,
            Ok(contract) => panic!("expected malformed declaration, built {}", contract.identity()),
        }
    }

    #[test]
    fn test_schema_priority() {
        let contract = Declaration::new()
            .identity("pick")
            .input("explicit", InputDeclaration::new().schema(Schema::String).example(json!(1)))
            .input("inferred", InputDeclaration::new().example(json!([1])))
            .input("implied", InputDeclaration::new().max_length(5))
            .input("ranged", InputDeclaration::new().min(0.0).max(9.0))
            .implementation(noop())
            .build()
            .unwrap();

        assert_eq!(contract.input("explicit").unwrap().schema, Schema::String);
        assert_eq!(contract.input("inferred").unwrap().schema, Schema::list(Schema::Number));
        assert_eq!(contract.input("implied").unwrap().schema, Schema::String);
        assert_eq!(contract.input("ranged").unwrap().schema, Schema::Number);
    }

    #[test]
    fn test_all_problems_reported_at_once() {
        let problems = problems_of(
            Declaration::new()
                .identity("run")
                .input("untyped", InputDeclaration::new())
                .input("ambiguous", InputDeclaration::new().example(json!([1, "x"])))
                .input("bad", InputDeclaration::new().pattern("(unclosed"))
                .input("conflict", InputDeclaration::new().min(1.0).max_length(2))
                .outcome("mirror", OutcomeDeclaration::new().like("missing"))
                .args_order(["nope"]),
        );

        let paths: Vec<&str> = problems.iter().map(|p| p.path.as_str()).collect();
        assert!(paths.contains(&"identity"));
        assert!(paths.contains(&"implementation"));
        assert!(paths.contains(&"inputs.untyped"));
        assert!(paths.contains(&"inputs.ambiguous"));
        assert!(paths.contains(&"inputs.bad"));
        assert!(paths.contains(&"inputs.conflict"));
        assert!(paths.contains(&"outcomes.mirror"));
        assert!(paths.contains(&"args_order"));
    }

    #[test]
    fn test_default_checked_against_schema() {
        let problems = problems_of(
            Declaration::new()
                .identity("defaults")
                .input("n", InputDeclaration::new().schema(Schema::Number).default_value(json!({})))
                .input("s", InputDeclaration::new().schema(Schema::String).default_value(Value::Null))
                .implementation(noop()),
        );
        assert_eq!(problems.len(), 2);
        assert!(problems[0].message.contains("does not match number"));
        assert!(problems[1].message.contains("not nullable"));
    }

    #[test]
    fn test_lenient_default_is_coerced() {
        let contract = Declaration::new()
            .identity("defaults")
            .input("n", InputDeclaration::new().schema(Schema::Number).default_value(json!("3")))
            .implementation(noop())
            .build()
            .unwrap();
        assert_eq!(contract.input("n").unwrap().default_value, Some(json!(3)));
    }

    #[test]
    fn test_sync_contract_needs_sync_implementation() {
        let problems = problems_of(Declaration::new().identity("s").sync(true).implementation(noop()));
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].path, "implementation");
    }

    #[test]
    fn test_cache_outcome_checks() {
        let error_cached = problems_of(
            Declaration::new()
                .identity("c")
                .implementation(noop())
                .cache(CachePolicy::new().outcome("error")),
        );
        assert_eq!(error_cached[0].path, "cache.outcome");

        let undeclared = problems_of(
            Declaration::new()
                .identity("c")
                .implementation(noop())
                .cache(CachePolicy::new().outcome("found")),
        );
        assert!(undeclared[0].message.contains("found"));
    }

    #[test]
    fn test_cache_policy_inherits_config() {
        let config = RuntimeConfig::builder().with_cache(5_000, 2).build();
        let contract = Declaration::new()
            .identity("c")
            .implementation(noop())
            .cache(CachePolicy::new())
            .build_with(&config)
            .unwrap();
        let policy = contract.cache_policy().unwrap();
        assert_eq!(policy.ttl, Some(Duration::from_millis(5_000)));
        assert_eq!(policy.gc_buffer, Some(2));
    }

    #[test]
    fn test_identity_from_implementation_name() {
        let contract = Declaration::new()
            .implementation(noop().named("lookupUser"))
            .build()
            .unwrap();
        assert_eq!(contract.identity(), "lookup-user");
    }

    #[test]
    fn test_timeout_defaults() {
        let config = RuntimeConfig::builder().default_timeout_ms(300).build();
        let contract = Declaration::new()
            .identity("t")
            .implementation(noop())
            .build_with(&config)
            .unwrap();
        assert_eq!(contract.timeout_ms(), Some(300));

        let disabled = Declaration::new()
            .identity("t")
            .timeout_ms(0)
            .implementation(noop())
            .build_with(&config)
            .unwrap();
        assert_eq!(disabled.timeout_ms(), None);
    }
}
