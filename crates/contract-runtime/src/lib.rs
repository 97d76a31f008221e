//! Contract Runtime
//!
//! A uniform invocation runtime for declared units of work. A contract
//! declares its inputs, its named outcomes and an implementation; the runtime
//! validates and coerces arguments, optionally memoizes outcomes through a
//! pluggable cache, enforces a deadline, and guarantees that every invocation
//! delivers exactly one terminal outcome.
//!
//! ## Features
//!
//! - **Schemas from examples**: infer, validate, coerce, intersect and hash
//! - **Named outcomes**: `success` and `error` always exist; any other declared
//!   outcome is forwarded to `error` when the caller does not bind it
//! - **Exactly-once delivery**: one guard for signals, faults and timeouts
//! - **Memoization**: write-through caching of one outcome with TTL eviction
//! - **Binding styles**: named or positional arguments, deferred or immediate
//! - **Telemetry**: Prometheus metrics and `tracing` spans of the state machine
//!
//! ## Architecture
//!
//! 1. **Schema** (`schema/`): inference, validation, intersection and hashing.
//! 2. **Contracts** (`contract/`): declarations and their normalization.
//! 3. **Arguments** (`arguments.rs`): defaults, required/nullable, rules.
//! 4. **Invocation** (`invocation/`): the state machine, exit guard, deadline
//!    and delivery pipeline.
//! 5. **Usage** (`usage.rs`): binding and triggering styles.
//! 6. **Cache** (`cache.rs`): the store interface; see `contract-cache` for an
//!    in-memory store.
//! 7. **CLI** (`cli/`): `contract-tool` over the schema engine.
//!
//! ## Example
//!
//! ```rust,no_run
//! use contract_runtime::{Declaration, Implementation, InputDeclaration, OutcomeDeclaration};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let find_user = Declaration::new()
//!         .identity("find-user")
//!         .input("id", InputDeclaration::new().example(json!(1)).required(true))
//!         .outcome("success", OutcomeDeclaration::new().example(json!({"id": 1, "name": "ada"})))
//!         .outcome("notFound", OutcomeDeclaration::new())
//!         .implementation(Implementation::asynchronous(|args, exits, _| async move {
//!             match args.get_i64("id") {
//!                 Some(1) => exits.success(json!({"id": 1, "name": "ada"})),
//!                 _ => exits.exit("notFound", json!(null)),
//!             };
//!             Ok(())
//!         }))
//!         .build()?;
//!
//!     let user = find_user.call(json!({"id": "1"})).await?;
//!     assert_eq!(user["name"], json!("ada"));
//!
//!     let missing = find_user.call(json!({"id": 2})).await.unwrap_err();
//!     assert!(missing.is_outcome("notFound"));
//!     Ok(())
//! }
//! ```

pub mod arguments;
pub mod cache;
pub mod cli;
pub mod config;
pub mod contract;
pub mod error;
pub mod invocation;
pub mod schema;
pub mod telemetry;
pub mod usage;

pub use arguments::{ArgumentBag, UnknownKeyPolicy};
pub use cache::{CacheCriteria, CacheEntry, CacheError, CacheResult, CacheStore};
pub use config::{RuntimeConfig, RuntimeConfigBuilder};
pub use contract::{
    CachePolicy, Contract, Customization, Declaration, Implementation, InputDeclaration,
    InputSpec, OutcomeDeclaration, OutcomeSpec, OutputSchema, Rule, RuntimeOptions, ERROR,
    SUCCESS,
};
pub use error::{
    ContractError, DeclarationProblem, Failure, FailureKind, InvocationError, SchemaError,
    ToolError,
};
pub use invocation::{
    CallContext, Exits, Invocation, Outcome, OutcomeHandlers, Payload, PendingOutcome,
};
pub use schema::{Schema, ValidationMode, Violation};
pub use telemetry::{InvocationMetrics, RuntimeMetricsRegistry, TelemetryError};
pub use usage::{Arguments, BindingStyle, Completion, Triggered, TriggeringStyle};

pub use cli::{ExitCode, OutputFormat, ToolCli, ToolCommands};

/// Runtime version (from Cargo.toml)
pub const RUNTIME_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the CLI application
///
/// This is the main entry point for the `contract-tool` binary.
///
/// # Example
///
/// ```rust,no_run
/// use clap::Parser;
/// use contract_runtime::{run_cli, ToolCli};
///
/// fn main() {
///     let cli = ToolCli::parse();
///     let exit_code = run_cli(cli);
///     std::process::exit(exit_code.into());
/// }
/// ```
pub fn run_cli(cli: ToolCli) -> ExitCode {
    match cli::run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from_error(&e)
        }
    }
}
