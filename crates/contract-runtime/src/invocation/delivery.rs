//! Outcome delivery pipeline
//!
//! Turns the winning exit signal into the terminal `Outcome`: output
//! coercion, void outcomes, `error` payload normalization and undeclared
//! outcome detection. Forwarding of unbound named outcomes happens later,
//! on the caller side (`Outcome::into_result`, `OutcomeHandlers`).

use serde_json::Value;
use tracing::{debug, error};

use super::exits::{Payload, Signal};
use super::outcome::Outcome;
use crate::arguments::ArgumentBag;
use crate::contract::{Contract, OutcomeSpec, ERROR, SUCCESS};
use crate::error::{codes, Failure, FailureKind};
use crate::schema::{validate, Violation};

/// Resolve a signal into the outcome delivered to the caller
pub(crate) fn resolve(contract: &Contract, signal: Signal, arguments: Option<&ArgumentBag>) -> Outcome {
    let outcome = match signal {
        Signal::Fault(message) => {
            error!(contract = %contract.identity(), fault = %message, "Implementation fault captured");
            Outcome::Error(Failure::implementation(format!("Implementation failed: {}", message)))
        }
        Signal::Timeout { after_ms } => Outcome::Error(Failure::timeout(after_ms)),
        Signal::Abandoned => Outcome::Error(Failure::implementation(
            "Implementation finished without signaling an outcome",
        )),
        Signal::Exit { outcome, payload } => deliver(contract, outcome, payload, arguments),
        Signal::Cached { outcome, payload } => {
            deliver(contract, outcome, Payload::from(payload), arguments)
        }
    };
    outcome.with_contract(contract.identity())
}

fn deliver(contract: &Contract, name: String, payload: Payload, arguments: Option<&ArgumentBag>) -> Outcome {
    let Some(spec) = contract.outcome(&name) else {
        return Outcome::Error(
            Failure::implementation(format!("Implementation signaled undeclared outcome `{}`", name))
                .with_raw(payload.into_value()),
        );
    };

    if name == ERROR {
        return Outcome::Error(normalize_error(contract, spec, payload, arguments));
    }

    let Some(output) = &spec.output else {
        if !payload.is_empty() {
            debug!(contract = %contract.identity(), outcome = %name, "Discarding payload of void outcome");
        }
        return named(name, Value::Null);
    };

    let value = payload.into_value();
    if contract.options().unchecked {
        return named(name, value);
    }

    let schema = match output.resolve(arguments) {
        Ok(schema) => schema,
        Err(e) => {
            return Outcome::Error(
                Failure::implementation(format!("Output schema of `{}` is invalid: {}", name, e))
                    .with_raw(value),
            )
        }
    };

    match validate(&schema, &value, contract.options().validation_mode) {
        Ok(coerced) => named(name, coerced),
        Err(violations) => Outcome::Error(
            Failure::implementation(format!(
                "Implementation returned an invalid `{}` payload: {}",
                name,
                summarize(&violations)
            ))
            .with_violations(violations)
            .with_raw(value),
        ),
    }
}

fn named(name: String, payload: Value) -> Outcome {
    if name == SUCCESS {
        Outcome::Success(payload)
    } else {
        Outcome::Other { name, payload }
    }
}

/// Normalize whatever reached `error` into a structured failure
///
/// The `error` outcome never recurses: if its own schema cannot be resolved,
/// a generic failure is synthesized instead.
fn normalize_error(
    contract: &Contract,
    spec: &OutcomeSpec,
    payload: Payload,
    arguments: Option<&ArgumentBag>,
) -> Failure {
    let payload = match (&spec.output, payload) {
        (Some(output), Payload::Value(value)) if !contract.options().unchecked => {
            match output.resolve(arguments) {
                Err(e) => {
                    return Failure::generic(format!("Error payload could not be checked: {}", e))
                        .with_raw(value)
                }
                Ok(schema) => match validate(&schema, &value, contract.options().validation_mode) {
                    Ok(coerced) => Payload::Value(coerced),
                    Err(violations) => {
                        return Failure::implementation(format!(
                            "Implementation returned an invalid `error` payload: {}",
                            summarize(&violations)
                        ))
                        .with_violations(violations)
                        .with_raw(value)
                    }
                },
            }
        }
        (_, payload) => payload,
    };

    match payload {
        Payload::Empty => Failure::generic("Implementation signaled error without a payload"),
        Payload::Failure(failure) => failure,
        Payload::Value(Value::String(message)) => {
            Failure::new(FailureKind::Implementation, codes::FAILED, message)
        }
        Payload::Value(value) => wrap_value(value),
    }
}

/// Wrap an arbitrary error payload, keeping it as `raw`
fn wrap_value(value: Value) -> Failure {
    let message = value.get("message").and_then(Value::as_str).map(str::to_string);
    let code = value.get("code").and_then(Value::as_str).map(str::to_string);

    let failure = match message {
        Some(message) => Failure::new(
            FailureKind::Implementation,
            code.unwrap_or_else(|| codes::FAILED.to_string()),
            message,
        ),
        None => Failure::generic("Implementation signaled error with an unstructured payload"),
    };
    failure.with_raw(value)
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
