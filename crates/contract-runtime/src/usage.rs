//! Binding and triggering styles
//!
//! A contract declares how callers hand it arguments (`BindingStyle`) and
//! whether binding returns a handle or starts running right away
//! (`TriggeringStyle`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::arguments::ArgumentBag;
use crate::contract::Contract;
use crate::error::{Failure, InvocationError};
use crate::invocation::{Invocation, PendingOutcome};

/// How arguments are matched to declared inputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingStyle {
    /// Key → value map matched by input name
    #[default]
    Named,
    /// Values matched by the contract's `args_order`
    Positional,
}

impl fmt::Display for BindingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingStyle::Named => write!(f, "named"),
            BindingStyle::Positional => write!(f, "positional"),
        }
    }
}

/// What binding returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggeringStyle {
    /// A handle to run later
    #[default]
    Deferred,
    /// Runs as soon as bound
    Immediate,
}

/// Caller-supplied arguments before binding
#[derive(Debug, Clone, PartialEq)]
pub enum Arguments {
    Named(Map<String, Value>),
    Positional(Vec<Value>),
    /// Untyped JSON: an object binds by name, an array by position
    Value(Value),
}

impl From<Map<String, Value>> for Arguments {
    fn from(map: Map<String, Value>) -> Self {
        Arguments::Named(map)
    }
}

impl From<Vec<Value>> for Arguments {
    fn from(values: Vec<Value>) -> Self {
        Arguments::Positional(values)
    }
}

impl From<Value> for Arguments {
    fn from(value: Value) -> Self {
        Arguments::Value(value)
    }
}

impl From<ArgumentBag> for Arguments {
    fn from(bag: ArgumentBag) -> Self {
        Arguments::Named(bag.into_inner().into_iter().collect())
    }
}

/// Result of `Contract::trigger`
#[derive(Debug)]
pub enum Triggered {
    Deferred(Invocation),
    Immediate(Completion),
}

/// Result of an immediately triggered invocation
#[derive(Debug)]
pub enum Completion {
    /// A synchronous contract, already finished
    Ready(Result<Value, Failure>),
    /// Running on the runtime
    Pending(PendingOutcome),
}

impl Completion {
    /// Wait for the result, whichever way it was produced
    pub async fn wait(self) -> Result<Value, Failure> {
        match self {
            Completion::Ready(result) => result,
            Completion::Pending(pending) => pending.await,
        }
    }
}

impl Contract {
    /// Create a deferred invocation from a named argument bag
    pub fn invoke(self: &Arc<Self>, arguments: impl Into<ArgumentBag>) -> Invocation {
        Invocation::new(Arc::clone(self), arguments.into())
    }

    /// Bind arguments according to the contract's binding style
    pub fn bind(self: &Arc<Self>, arguments: impl Into<Arguments>) -> Result<Invocation, InvocationError> {
        let bag = match (self.binding(), arguments.into()) {
            (_, Arguments::Value(Value::Null)) => ArgumentBag::new(),
            (BindingStyle::Named, Arguments::Named(map))
            | (BindingStyle::Named, Arguments::Value(Value::Object(map))) => ArgumentBag::from(map),
            (BindingStyle::Positional, Arguments::Positional(values))
            | (BindingStyle::Positional, Arguments::Value(Value::Array(values))) => self.bind_positional(values)?,
            (style, other) => {
                return Err(InvocationError::usage(format!(
                    "contract `{}` takes {} arguments, got {}",
                    self.identity(),
                    style,
                    describe(&other)
                )))
            }
        };
        Ok(Invocation::new(Arc::clone(self), bag))
    }

    /// Bind, then run right away if the contract triggers immediately
    ///
    /// Immediate triggering of an asynchronous contract spawns onto the
    /// current tokio runtime.
    pub fn trigger(self: &Arc<Self>, arguments: impl Into<Arguments>) -> Result<Triggered, InvocationError> {
        let invocation = self.bind(arguments)?;
        match self.triggering() {
            TriggeringStyle::Deferred => Ok(Triggered::Deferred(invocation)),
            TriggeringStyle::Immediate if self.is_synchronous() => {
                Ok(Triggered::Immediate(Completion::Ready(invocation.run_sync()?)))
            }
            TriggeringStyle::Immediate => Ok(Triggered::Immediate(Completion::Pending(invocation.spawn()))),
        }
    }

    /// Bind and run in completion style; binding problems arrive as `Usage` failures
    pub async fn call(self: &Arc<Self>, arguments: impl Into<Arguments>) -> Result<Value, Failure> {
        match self.bind(arguments) {
            Ok(invocation) => invocation.run().await,
            Err(e) => Err(Failure::usage(e.to_string()).with_contract(self.identity())),
        }
    }

    fn bind_positional(&self, values: Vec<Value>) -> Result<ArgumentBag, InvocationError> {
        let order = match self.args_order() {
            Some(order) => order,
            None if self.inputs().values().any(|input| input.required) => {
                return Err(InvocationError::usage(format!(
                    "contract `{}` has required inputs but no argument order",
                    self.identity()
                )))
            }
            None => &[],
        };
        if values.len() > order.len() {
            return Err(InvocationError::usage(format!(
                "contract `{}` takes at most {} positional arguments, got {}",
                self.identity(),
                order.len(),
                values.len()
            )));
        }
        Ok(order.iter().cloned().zip(values).collect())
    }
}

fn describe(arguments: &Arguments) -> &'static str {
    match arguments {
        Arguments::Named(_) | Arguments::Value(Value::Object(_)) => "named arguments",
        Arguments::Positional(_) | Arguments::Value(Value::Array(_)) => "positional arguments",
        Arguments::Value(_) => "a scalar value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Declaration, Implementation, InputDeclaration, OutcomeDeclaration};
    use crate::schema::Schema;
    use serde_json::json;

    fn subtract(binding: BindingStyle, order: bool) -> Arc<Contract> {
        let mut declaration = Declaration::new()
            .identity("subtract")
            .binding(binding)
            .input("a", InputDeclaration::new().schema(Schema::Number).required(true))
            .input("b", InputDeclaration::new().schema(Schema::Number).default_value(json!(1)))
            .outcome("success", OutcomeDeclaration::new().schema(Schema::Number))
            .implementation(Implementation::asynchronous(|args, exits, _| async move {
                exits.success(args.get_f64("a").unwrap_or_default() - args.get_f64("b").unwrap_or_default());
                Ok(())
            }));
        if order {
            declaration = declaration.args_order(["a", "b"]);
        }
        declaration.build().unwrap()
    }

    #[tokio::test]
    async fn test_positional_binding() {
        let contract = subtract(BindingStyle::Positional, true);
        assert_eq!(contract.call(vec![json!(10), json!(4)]).await.unwrap(), json!(6.0));
        assert_eq!(contract.call(json!([10])).await.unwrap(), json!(9.0));
    }

    #[test]
    fn test_positional_without_order_rejected() {
        let contract = subtract(BindingStyle::Positional, false);
        assert!(contract.bind(vec![json!(1)]).unwrap_err().is_usage());
    }

    #[test]
    fn test_too_many_positional_values() {
        let contract = subtract(BindingStyle::Positional, true);
        let err = contract.bind(vec![json!(1), json!(2), json!(3)]).unwrap_err();
        assert!(err.to_string().contains("at most 2"));
    }

    #[tokio::test]
    async fn test_style_mismatch_is_usage() {
        let named = subtract(BindingStyle::Named, true);
        assert!(named.bind(json!([1, 2])).unwrap_err().is_usage());
        let failure = named.call(json!(5)).await.unwrap_err();
        assert_eq!(failure.kind, crate::error::FailureKind::Usage);

        let positional = subtract(BindingStyle::Positional, true);
        assert!(positional.bind(json!({"a": 1})).unwrap_err().is_usage());
    }

    #[tokio::test]
    async fn test_immediate_async_trigger_is_pending() {
        let contract = Declaration::new()
            .identity("now")
            .triggering(TriggeringStyle::Immediate)
            .implementation(Implementation::asynchronous(|_, exits, _| async move {
                exits.success(json!("ran"));
                Ok(())
            }))
            .build()
            .unwrap();
        match contract.trigger(json!({})).unwrap() {
            Triggered::Immediate(completion @ Completion::Pending(_)) => {
                assert_eq!(completion.wait().await.unwrap(), json!("ran"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_immediate_sync_trigger_is_ready() {
        let contract = Declaration::new()
            .identity("now-sync")
            .sync(true)
            .triggering(TriggeringStyle::Immediate)
            .implementation(Implementation::synchronous(|_, exits, _| {
                exits.success(json!(1));
                Ok(())
            }))
            .build()
            .unwrap();
        match contract.trigger(Map::new()).unwrap() {
            Triggered::Immediate(Completion::Ready(result)) => assert_eq!(result.unwrap(), json!(1)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_deferred_trigger_returns_handle() {
        let contract = subtract(BindingStyle::Named, false);
        assert!(matches!(
            contract.trigger(json!({"a": 1})).unwrap(),
            Triggered::Deferred(_)
        ));
    }
}
