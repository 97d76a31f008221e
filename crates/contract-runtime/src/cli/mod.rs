//! CLI module for `contract-tool`
//!
//! Exposes the schema engine on the command line so that declarations and
//! payloads can be checked without writing a contract.

pub mod commands;
pub mod output;

pub use commands::{ToolCli, ToolCommands};
pub use output::{OutputFormat, SchemaReport, ValidationReport};

use crate::error::ToolError;

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// A value did not conform, or two schemas share no value
    ValidationError = 1,
    /// Invalid input or arguments
    InvalidInput = 3,
    /// File not found or inaccessible
    FileError = 4,
    /// Internal error
    InternalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Exit code for an error that aborted a command
    pub fn from_error(error: &ToolError) -> Self {
        if error.is_file_error() {
            ExitCode::FileError
        } else if error.is_user_error() {
            ExitCode::InvalidInput
        } else {
            ExitCode::InternalError
        }
    }
}

/// Run the CLI with the given arguments and return the exit code
pub fn run(cli: ToolCli) -> Result<ExitCode, ToolError> {
    let format = cli.format;
    match cli.command {
        ToolCommands::Infer { example } => commands::execute_infer(&example, format),
        ToolCommands::Validate {
            schema,
            value,
            example,
            strict,
        } => commands::execute_validate(&schema, &value, example, strict, format),
        ToolCommands::Hash { value } => commands::execute_hash(&value, format),
        ToolCommands::Intersect {
            left,
            right,
            example,
        } => commands::execute_intersect(&left, &right, example, format),
    }
}
