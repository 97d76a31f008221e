//! Invocation state machine
//!
//! `Created → Validating → [CacheLookup] → Executing → Exited(outcome)`.
//! Whatever happens during `Executing`, exactly one signal reaches the
//! delivery pipeline: the exit guard hands the first claim to the engine
//! over a oneshot channel and drops every later one.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{debug, warn};

use super::delivery::resolve;
use super::exits::{CallContext, ExitGuard, Exits, Signal};
use super::memo::Memo;
use super::outcome::Outcome;
use super::timeout::TimeoutMonitor;
use super::Invocation;
use crate::arguments::{fill_defaults, process, ArgumentBag};
use crate::contract::implementation::{AsyncImplFn, SyncImplFn};
use crate::contract::{Contract, Implementation};
use crate::error::{Failure, InvocationError};

/// Run an invocation to its terminal outcome
pub(crate) async fn execute(invocation: Invocation) -> Outcome {
    let Invocation {
        contract,
        arguments,
        metadata,
        cache,
    } = invocation;
    let _timer = contract.metrics().map(|m| m.start_timer(contract.identity()));

    debug!(contract = %contract.identity(), state = "validating", "Invocation started");
    let arguments = match sanitize(&contract, arguments) {
        Ok(arguments) => arguments,
        Err(failure) => return finish(&contract, Outcome::Error(failure)),
    };

    let memo = Memo::prepare(&contract, cache.as_ref(), &arguments);
    if let Some(memo) = &memo {
        debug!(contract = %contract.identity(), state = "cache_lookup", key = %memo.key());
        if let Some(payload) = memo.lookup().await {
            let signal = Signal::Cached {
                outcome: memo.outcome().to_string(),
                payload,
            };
            let outcome = resolve(&contract, signal, Some(&arguments));
            return finish(&contract, outcome);
        }
    }

    let retained = contract.has_relative_outputs().then(|| arguments.clone());
    let ctx = CallContext::new(contract.identity(), metadata, contract.timeout_ms());
    let (guard, mut receiver) = ExitGuard::new(contract.identity(), contract.metrics.clone());

    debug!(
        contract = %contract.identity(),
        state = "executing",
        invocation_id = %ctx.invocation_id,
        timeout_ms = ?contract.timeout_ms()
    );
    let signal = match contract.implementation() {
        Implementation::Async { func, .. } => {
            run_async(&contract, func, arguments, guard, receiver, ctx).await
        }
        Implementation::Sync { func, .. } => {
            run_inline(func, arguments, &guard, &mut receiver, ctx).unwrap_or(Signal::Abandoned)
        }
    };

    let cacheable = matches!(
        (&memo, &signal),
        (Some(memo), Signal::Exit { outcome, .. }) if outcome == memo.outcome()
    );
    let outcome = resolve(&contract, signal, retained.as_ref());

    if let (true, Some(memo)) = (cacheable, &memo) {
        if outcome.name() == memo.outcome() {
            if let Some(payload) = outcome.payload() {
                memo.write_through(payload.clone()).await;
            }
        }
    }

    finish(&contract, outcome)
}

/// Run a synchronous contract to completion on the calling thread
///
/// No cache and no deadline: the implementation must signal before it
/// returns, otherwise the run is a consistency fault.
pub(crate) fn execute_sync(invocation: Invocation) -> Result<Outcome, InvocationError> {
    let Invocation {
        contract,
        arguments,
        metadata,
        ..
    } = invocation;

    let Implementation::Sync { func, .. } = contract.implementation() else {
        return Err(InvocationError::usage(format!(
            "contract `{}` is asynchronous and cannot run synchronously",
            contract.identity()
        )));
    };
    if !contract.is_synchronous() {
        return Err(InvocationError::usage(format!(
            "contract `{}` is not declared synchronous",
            contract.identity()
        )));
    }
    let _timer = contract.metrics().map(|m| m.start_timer(contract.identity()));

    let arguments = match sanitize(&contract, arguments) {
        Ok(arguments) => arguments,
        Err(failure) => return Ok(finish(&contract, Outcome::Error(failure))),
    };

    let retained = contract.has_relative_outputs().then(|| arguments.clone());
    let ctx = CallContext::new(contract.identity(), metadata, None);
    let (guard, mut receiver) = ExitGuard::new(contract.identity(), contract.metrics.clone());

    let signal = run_inline(func, arguments, &guard, &mut receiver, ctx).ok_or_else(|| {
        InvocationError::consistency(format!(
            "synchronous contract `{}` returned without signaling an outcome",
            contract.identity()
        ))
    })?;

    Ok(finish(&contract, resolve(&contract, signal, retained.as_ref())))
}

/// Argument processing, or defaults only on the unchecked path
fn sanitize(contract: &Contract, arguments: ArgumentBag) -> Result<ArgumentBag, Failure> {
    let options = contract.options();
    if options.unchecked {
        return Ok(fill_defaults(contract.inputs(), arguments));
    }
    process(
        contract.identity(),
        contract.inputs(),
        arguments,
        options.validation_mode,
        options.unknown_keys,
    )
    .map_err(|violations| {
        debug!(
            contract = %contract.identity(),
            violations = violations.len(),
            "Arguments rejected"
        );
        Failure::validation(violations)
    })
}

async fn run_async(
    contract: &Contract,
    func: &AsyncImplFn,
    arguments: ArgumentBag,
    guard: Arc<ExitGuard>,
    mut receiver: oneshot::Receiver<Signal>,
    ctx: CallContext,
) -> Signal {
    let mut timer = TimeoutMonitor::arm(contract.timeout_ms());
    let func = Arc::clone(func);
    let exits = Exits::new(Arc::clone(&guard));
    let mut task = tokio::spawn(async move { func(arguments, exits, ctx).await });
    let mut task_done = false;

    loop {
        tokio::select! {
            biased;

            received = &mut receiver => {
                timer.clear();
                return received.unwrap_or(Signal::Abandoned);
            }

            joined = &mut task, if !task_done => {
                task_done = true;
                match joined {
                    Ok(Ok(())) => {
                        // Handles still alive elsewhere may signal later.
                        if guard.live_handles() == 0 {
                            guard.claim(Signal::Abandoned);
                        }
                    }
                    Ok(Err(e)) => {
                        guard.claim(Signal::Fault(format!("{:#}", e)));
                    }
                    Err(join_error) => {
                        guard.claim(Signal::Fault(panic_message(join_error)));
                    }
                }
            }

            _ = guard.released(), if task_done => {
                if guard.live_handles() == 0 {
                    guard.claim(Signal::Abandoned);
                }
            }

            after_ms = timer.expired() => {
                if guard.claim(Signal::Timeout { after_ms }) {
                    warn!(contract = %contract.identity(), timeout_ms = after_ms, "Invocation timed out");
                }
            }
        }
    }
}

/// Call a synchronous implementation and collect its signal, if any
fn run_inline(
    func: &SyncImplFn,
    arguments: ArgumentBag,
    guard: &Arc<ExitGuard>,
    receiver: &mut oneshot::Receiver<Signal>,
    ctx: CallContext,
) -> Option<Signal> {
    let exits = Exits::new(Arc::clone(guard));
    match catch_unwind(AssertUnwindSafe(|| func(arguments, exits, ctx))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            guard.claim(Signal::Fault(format!("{:#}", e)));
        }
        Err(panic) => {
            guard.claim(Signal::Fault(panic_text(panic.as_ref())));
        }
    }
    receiver.try_recv().ok()
}

fn panic_message(error: JoinError) -> String {
    if error.is_cancelled() {
        return "implementation task was cancelled".to_string();
    }
    match error.try_into_panic() {
        Ok(panic) => panic_text(panic.as_ref()),
        Err(error) => error.to_string(),
    }
}

fn panic_text(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

fn finish(contract: &Contract, outcome: Outcome) -> Outcome {
    let outcome = outcome.with_contract(contract.identity());
    if let Some(metrics) = contract.metrics() {
        metrics.record_invocation(contract.identity(), outcome.name());
        if let Outcome::Error(failure) = &outcome {
            if failure.is_timeout() {
                metrics.record_timeout(contract.identity());
            }
        }
    }
    debug!(contract = %contract.identity(), outcome = %outcome.name(), "Invocation exited");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Customization, Declaration, InputDeclaration, OutcomeDeclaration};
    use crate::error::FailureKind;
    use crate::schema::Schema;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn invocation(contract: &Arc<Contract>, args: serde_json::Value) -> Invocation {
        let bag = match args {
            serde_json::Value::Object(map) => ArgumentBag::from(map),
            _ => ArgumentBag::new(),
        };
        Invocation::new(Arc::clone(contract), bag)
    }

    fn doubler() -> Arc<Contract> {
        Declaration::new()
            .identity("double")
            .input("n", InputDeclaration::new().schema(Schema::Number).required(true))
            .outcome("success", OutcomeDeclaration::new().schema(Schema::Number))
            .implementation(Implementation::asynchronous(|args, exits, _| async move {
                let n = args.get_f64("n").unwrap_or_default();
                exits.success(n * 2.0);
                Ok(())
            }))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_happy_path() {
        let outcome = execute(invocation(&doubler(), json!({"n": "4"}))).await;
        assert_eq!(outcome, Outcome::Success(json!(8.0)));
    }

    #[tokio::test]
    async fn test_validation_failure_skips_implementation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let contract = Declaration::new()
            .identity("counted")
            .input("n", InputDeclaration::new().schema(Schema::Number).required(true))
            .implementation(Implementation::asynchronous(move |_, exits, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    exits.success(json!(null));
                    Ok(())
                }
            }))
            .build()
            .unwrap();

        let Outcome::Error(failure) = execute(invocation(&contract, json!({}))).await else {
            panic!("expected error")
        };
        assert_eq!(failure.kind, FailureKind::Validation);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_error_return_is_fault() {
        let contract = Declaration::new()
            .identity("faulty")
            .implementation(Implementation::asynchronous(|_, _, _| async {
                anyhow::bail!("disk on fire")
            }))
            .build()
            .unwrap();
        let Outcome::Error(failure) = execute(invocation(&contract, json!({}))).await else {
            panic!("expected error")
        };
        assert!(failure.message.contains("disk on fire"));
    }

    fn explode() -> anyhow::Result<()> {
        panic!("kaboom")
    }

    #[tokio::test]
    async fn test_panic_is_fault() {
        let contract = Declaration::new()
            .identity("panicky")
            .implementation(Implementation::asynchronous(|_, _, _| async { explode() }))
            .build()
            .unwrap();
        let Outcome::Error(failure) = execute(invocation(&contract, json!({}))).await else {
            panic!("expected error")
        };
        assert!(failure.message.contains("kaboom"));
    }

    #[tokio::test]
    async fn test_returning_without_signal_is_abandoned() {
        let contract = Declaration::new()
            .identity("silent")
            .implementation(Implementation::asynchronous(|_, _, _| async { Ok(()) }))
            .build()
            .unwrap();
        let Outcome::Error(failure) = execute(invocation(&contract, json!({}))).await else {
            panic!("expected error")
        };
        assert_eq!(failure.kind, FailureKind::Implementation);
    }

    #[tokio::test]
    async fn test_detached_handle_signals_later() {
        let contract = Declaration::new()
            .identity("detached")
            .implementation(Implementation::asynchronous(|_, exits, _| async move {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    exits.success(json!("late but first"));
                });
                Ok(())
            }))
            .build()
            .unwrap();
        let outcome = execute(invocation(&contract, json!({}))).await;
        assert_eq!(outcome, Outcome::Success(json!("late but first")));
    }

    #[tokio::test]
    async fn test_detached_handle_dropped_without_signal_is_abandoned() {
        let contract = Declaration::new()
            .identity("forgetful")
            .implementation(Implementation::asynchronous(|_, exits, _| async move {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    drop(exits);
                });
                Ok(())
            }))
            .build()
            .unwrap();
        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            execute(invocation(&contract, json!({}))),
        )
        .await
        .expect("invocation completes once every handle is gone");
        let Outcome::Error(failure) = outcome else {
            panic!("expected error")
        };
        assert_eq!(failure.kind, FailureKind::Implementation);
    }

    #[tokio::test]
    async fn test_timeout_wins_over_slow_signal() {
        let contract = Declaration::new()
            .identity("slow")
            .timeout_ms(20)
            .implementation(Implementation::asynchronous(|_, exits, _| async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                exits.success(json!(1));
                Ok(())
            }))
            .build()
            .unwrap();
        let Outcome::Error(failure) = execute(invocation(&contract, json!({}))).await else {
            panic!("expected timeout")
        };
        assert!(failure.is_timeout());
    }

    #[tokio::test]
    async fn test_sync_implementation_in_async_path() {
        let contract = Declaration::new()
            .identity("inline")
            .sync(true)
            .implementation(Implementation::synchronous(|_, exits, _| {
                exits.success(json!("done"));
                Ok(())
            }))
            .build()
            .unwrap();
        assert_eq!(
            execute(invocation(&contract, json!({}))).await,
            Outcome::Success(json!("done"))
        );
    }

    #[test]
    fn test_execute_sync() {
        let contract = Declaration::new()
            .identity("sum")
            .sync(true)
            .input("a", InputDeclaration::new().schema(Schema::Number).required(true))
            .input("b", InputDeclaration::new().schema(Schema::Number).required(true))
            .outcome("success", OutcomeDeclaration::new().schema(Schema::Number))
            .implementation(Implementation::synchronous(|args, exits, _| {
                let sum = args.get_f64("a").unwrap_or_default() + args.get_f64("b").unwrap_or_default();
                exits.success(sum);
                Ok(())
            }))
            .build()
            .unwrap();
        let outcome = execute_sync(invocation(&contract, json!({"a": 1, "b": 2}))).unwrap();
        assert_eq!(outcome, Outcome::Success(json!(3.0)));
    }

    #[test]
    fn test_execute_sync_without_signal_is_consistency_fault() {
        let contract = Declaration::new()
            .identity("mute")
            .sync(true)
            .implementation(Implementation::synchronous(|_, _, _| Ok(())))
            .build()
            .unwrap();
        let err = execute_sync(invocation(&contract, json!({}))).unwrap_err();
        assert!(matches!(err, InvocationError::Consistency(_)));
    }

    #[test]
    fn test_execute_sync_rejects_async_contract() {
        let err = execute_sync(invocation(&doubler(), json!({"n": 1}))).unwrap_err();
        assert!(err.is_usage());
    }

    #[tokio::test]
    async fn test_unchecked_skips_argument_validation() {
        let contract = Declaration::new()
            .identity("echo")
            .input("n", InputDeclaration::new().schema(Schema::Number).required(true))
            .outcome("success", OutcomeDeclaration::new().schema(Schema::Json))
            .implementation(Implementation::asynchronous(|args, exits, _| async move {
                exits.success(args.to_value());
                Ok(())
            }))
            .build()
            .unwrap()
            .customize(&Customization::new().unchecked(true));
        let outcome = execute(invocation(&contract, json!({"n": "not a number"}))).await;
        assert_eq!(outcome, Outcome::Success(json!({"n": "not a number"})));
    }
}
