//! Contract runtime schema tool
//!
//! # Usage
//!
//! ```bash
//! # Infer a schema from an example
//! contract-tool infer '{"id": 1, "tags": ["a"]}'
//!
//! # Validate a value (file or inline JSON) against a schema inferred from an example
//! contract-tool validate --schema '{"id": 1}' --example --value payload.yaml
//!
//! # Stable hash of a value
//! contract-tool --format json hash '{"b": 2, "a": 1}'
//!
//! # Intersect two schemas
//! contract-tool intersect --example '{"a": 1}' '{"b": "x"}'
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Validation failed (or the schemas are disjoint)
//! - 3: Invalid input or arguments
//! - 4: File not found or inaccessible
//! - 10: Internal error

use clap::Parser;
use contract_runtime::{run_cli, ToolCli};

fn main() {
    let cli = ToolCli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_target(false)
        .init();

    let exit_code = run_cli(cli);
    std::process::exit(exit_code.into());
}
