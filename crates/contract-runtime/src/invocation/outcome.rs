//! Terminal outcomes and caller-side dispatch

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::contract::{ERROR, SUCCESS};
use crate::error::{Failure, InvocationError};

/// The single terminal outcome of an invocation
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    Error(Failure),
    /// A declared outcome other than `success` or `error`
    Other { name: String, payload: Value },
}

impl Outcome {
    pub fn name(&self) -> &str {
        match self {
            Outcome::Success(_) => SUCCESS,
            Outcome::Error(_) => ERROR,
            Outcome::Other { name, .. } => name,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Payload of a non-error outcome
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Outcome::Success(value) | Outcome::Other { payload: value, .. } => Some(value),
            Outcome::Error(_) => None,
        }
    }

    /// Completion view: only `success` is bound, every other outcome is
    /// forwarded to the error slot
    pub fn into_result(self) -> Result<Value, Failure> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Error(failure) => Err(failure),
            Outcome::Other { name, payload } => Err(Failure::named_outcome(name, payload)),
        }
    }

    pub(crate) fn with_contract(self, contract: &str) -> Self {
        match self {
            Outcome::Error(failure) if failure.contract.is_none() => {
                Outcome::Error(failure.with_contract(contract))
            }
            other => other,
        }
    }
}

type ValueHandler<'a, R> = Box<dyn FnOnce(Value) -> R + Send + 'a>;
type FailureHandler<'a, R> = Box<dyn FnOnce(Failure) -> R + Send + 'a>;

/// Named dispatch table for `Invocation::run_with`
///
/// Requires both `success` and `error`; named outcomes without a handler are
/// forwarded to `error` as a `NamedOutcome` failure.
pub struct OutcomeHandlers<'a, R> {
    success: Option<ValueHandler<'a, R>>,
    error: Option<FailureHandler<'a, R>>,
    named: HashMap<String, ValueHandler<'a, R>>,
}

impl<'a, R> OutcomeHandlers<'a, R> {
    pub fn new() -> Self {
        Self {
            success: None,
            error: None,
            named: HashMap::new(),
        }
    }

    pub fn on_success<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(Value) -> R + Send + 'a,
    {
        self.success = Some(Box::new(handler));
        self
    }

    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(Failure) -> R + Send + 'a,
    {
        self.error = Some(Box::new(handler));
        self
    }

    /// Bind a named outcome
    pub fn on<F>(mut self, outcome: impl Into<String>, handler: F) -> Self
    where
        F: FnOnce(Value) -> R + Send + 'a,
    {
        self.named.insert(outcome.into(), Box::new(handler));
        self
    }

    pub fn binds(&self, outcome: &str) -> bool {
        match outcome {
            SUCCESS => self.success.is_some(),
            ERROR => self.error.is_some(),
            other => self.named.contains_key(other),
        }
    }

    /// Reject tables missing a required slot
    pub fn check(&self) -> Result<(), InvocationError> {
        if self.error.is_none() {
            return Err(InvocationError::usage("outcome handlers must bind `error`"));
        }
        if self.success.is_none() {
            return Err(InvocationError::usage("outcome handlers must bind `success`"));
        }
        Ok(())
    }

    /// Deliver `outcome` to exactly one handler
    pub fn dispatch(mut self, outcome: Outcome) -> Result<R, InvocationError> {
        self.check()?;
        match outcome {
            Outcome::Success(value) => match self.success.take() {
                Some(handler) => Ok(handler(value)),
                None => Err(InvocationError::consistency("success handler vanished")),
            },
            Outcome::Error(failure) => self.deliver_error(failure),
            Outcome::Other { name, payload } => match self.named.remove(&name) {
                Some(handler) => Ok(handler(payload)),
                None => self.deliver_error(Failure::named_outcome(name, payload)),
            },
        }
    }

    fn deliver_error(mut self, failure: Failure) -> Result<R, InvocationError> {
        match self.error.take() {
            Some(handler) => Ok(handler(failure)),
            None => Err(InvocationError::consistency("error handler vanished")),
        }
    }
}

impl<R> Default for OutcomeHandlers<'_, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for OutcomeHandlers<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut named: Vec<&String> = self.named.keys().collect();
        named.sort();
        f.debug_struct("OutcomeHandlers")
            .field("success", &self.success.is_some())
            .field("error", &self.error.is_some())
            .field("named", &named)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> OutcomeHandlers<'static, String> {
        OutcomeHandlers::new()
            .on_success(|v| format!("ok {}", v))
            .on_error(|f| format!("err {}", f.code))
    }

    #[test]
    fn test_into_result_forwards_named_outcomes() {
        let failure = Outcome::Other {
            name: "notFound".to_string(),
            payload: json!({"id": 3}),
        }
        .into_result()
        .unwrap_err();
        assert!(failure.is_outcome("notFound"));
        assert_eq!(failure.raw, Some(json!({"id": 3})));
    }

    #[test]
    fn test_dispatch_named_and_forwarded() {
        let bound = table().on("notFound", |_| "missing".to_string());
        let out = bound
            .dispatch(Outcome::Other {
                name: "notFound".to_string(),
                payload: Value::Null,
            })
            .unwrap();
        assert_eq!(out, "missing");

        let out = table()
            .dispatch(Outcome::Other {
                name: "notFound".to_string(),
                payload: Value::Null,
            })
            .unwrap();
        assert_eq!(out, "err notFound");
    }

    #[test]
    fn test_missing_slots_are_usage_errors() {
        let no_error: OutcomeHandlers<'_, ()> = OutcomeHandlers::new().on_success(|_| ());
        assert!(no_error.check().unwrap_err().is_usage());

        let no_success: OutcomeHandlers<'_, ()> = OutcomeHandlers::new().on_error(|_| ());
        assert!(no_success.dispatch(Outcome::Success(json!(1))).unwrap_err().is_usage());
    }

    #[test]
    fn test_outcome_names() {
        assert_eq!(Outcome::Success(json!(1)).name(), "success");
        assert_eq!(Outcome::Error(Failure::usage("x")).name(), "error");
    }
}
