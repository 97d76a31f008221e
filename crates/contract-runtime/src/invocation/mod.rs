//! Invocation engine
//!
//! An `Invocation` is a deferred execution of a contract with concrete
//! arguments. Metadata and a cache store can be attached before it runs;
//! running consumes it, so each invocation delivers exactly once.
//!
//! # Example
//!
//! ```rust,no_run
//! use contract_runtime::{Declaration, Implementation, InputDeclaration, OutcomeDeclaration, Schema};
//! use serde_json::json;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let greet = Declaration::new()
//!     .identity("greet")
//!     .input("name", InputDeclaration::new().schema(Schema::String).required(true))
//!     .outcome("success", OutcomeDeclaration::new().schema(Schema::String))
//!     .implementation(Implementation::asynchronous(|args, exits, _| async move {
//!         exits.success(format!("hello {}", args.get_str("name").unwrap_or_default()));
//!         Ok(())
//!     }))
//!     .build()?;
//!
//! let greeting = greet
//!     .invoke([("name", json!("ada"))].into_iter().collect::<contract_runtime::ArgumentBag>())
//!     .with_metadata("request_id", json!("r-42"))
//!     .run()
//!     .await?;
//! assert_eq!(greeting, json!("hello ada"));
//! # Ok(())
//! # }
//! ```

mod delivery;
mod engine;
mod exits;
mod memo;
mod outcome;
mod timeout;

pub use exits::{CallContext, Exits, Payload, Signal};
pub use outcome::{Outcome, OutcomeHandlers};
pub use timeout::TimeoutMonitor;

use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;

use crate::arguments::ArgumentBag;
use crate::cache::CacheStore;
use crate::contract::Contract;
use crate::error::{Failure, InvocationError};

/// A contract bound to concrete arguments, not yet run
pub struct Invocation {
    pub(crate) contract: Arc<Contract>,
    pub(crate) arguments: ArgumentBag,
    pub(crate) metadata: Map<String, Value>,
    pub(crate) cache: Option<Arc<dyn CacheStore>>,
}

impl Invocation {
    pub fn new(contract: Arc<Contract>, arguments: ArgumentBag) -> Self {
        Self {
            contract,
            arguments,
            metadata: Map::new(),
            cache: None,
        }
    }

    pub fn contract(&self) -> &Arc<Contract> {
        &self.contract
    }

    pub fn arguments(&self) -> &ArgumentBag {
        &self.arguments
    }

    /// Attach call-scoped metadata visible to the implementation
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Attach the cache store; overrides the store of the contract's policy
    pub fn with_cache(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(store);
        self
    }

    /// Run and return the raw outcome, named outcomes included
    pub async fn outcome(self) -> Outcome {
        let outcome = engine::execute(self).await;
        // Delivery is never re-entrant with the caller's own frame.
        tokio::task::yield_now().await;
        outcome
    }

    /// Run with only `success` bound; every other outcome arrives as `Err`
    pub async fn run(self) -> Result<Value, Failure> {
        self.outcome().await.into_result()
    }

    /// Run and dispatch the outcome through a handler table
    ///
    /// The table is checked before anything runs.
    pub async fn run_with<R>(self, handlers: OutcomeHandlers<'_, R>) -> Result<R, InvocationError> {
        handlers.check()?;
        let outcome = self.outcome().await;
        handlers.dispatch(outcome)
    }

    /// Run a synchronous contract on the calling thread
    pub fn outcome_sync(self) -> Result<Outcome, InvocationError> {
        engine::execute_sync(self)
    }

    /// Synchronous completion style
    pub fn run_sync(self) -> Result<Result<Value, Failure>, InvocationError> {
        Ok(self.outcome_sync()?.into_result())
    }

    /// Synchronous dispatch through a handler table
    pub fn run_sync_with<R>(self, handlers: OutcomeHandlers<'_, R>) -> Result<R, InvocationError> {
        handlers.check()?;
        handlers.dispatch(self.outcome_sync()?)
    }

    /// Start running on the runtime and return a handle to the result
    pub fn spawn(self) -> PendingOutcome {
        PendingOutcome {
            handle: tokio::spawn(engine::execute(self)),
        }
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("contract", &self.contract.identity())
            .field("arguments", &self.arguments)
            .field("metadata", &self.metadata)
            .field("cache", &self.cache.as_ref().map(|store| store.name().to_string()))
            .finish()
    }
}

/// An invocation already running on the runtime
///
/// Awaiting it yields the completion-style result.
#[derive(Debug)]
pub struct PendingOutcome {
    handle: JoinHandle<Outcome>,
}

impl PendingOutcome {
    /// Wait for the raw outcome
    pub async fn outcome(self) -> Outcome {
        join_outcome(self.handle.await)
    }
}

impl Future for PendingOutcome {
    type Output = Result<Value, Failure>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle)
            .poll(cx)
            .map(|joined| join_outcome(joined).into_result())
    }
}

fn join_outcome(joined: Result<Outcome, tokio::task::JoinError>) -> Outcome {
    joined.unwrap_or_else(|e| {
        Outcome::Error(Failure::implementation(format!("Invocation task failed: {}", e)))
    })
}
