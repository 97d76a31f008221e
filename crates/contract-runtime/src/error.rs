//! Error types for the contract runtime
//!
//! Recoverable failures (`Failure`) travel through the `error` outcome of an
//! invocation. Build-time problems (`ContractError`), caller misuse detected
//! before anything runs and broken runtime invariants (`InvocationError`) are
//! returned directly and never delivered as an outcome.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::schema::Violation;

/// Classification of a structured failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// An argument or output violated its declared schema
    Validation,
    /// The caller misused the invocation surface
    Usage,
    /// The implementation faulted or broke its own declared contract
    Implementation,
    /// A declared, non-default outcome reached a caller that did not bind it
    NamedOutcome,
    /// The execution deadline was exceeded
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Validation => write!(f, "validation"),
            FailureKind::Usage => write!(f, "usage"),
            FailureKind::Implementation => write!(f, "implementation"),
            FailureKind::NamedOutcome => write!(f, "named_outcome"),
            FailureKind::Timeout => write!(f, "timeout"),
        }
    }
}

/// Stable failure codes
pub mod codes {
    pub const INVALID_ARGUMENTS: &str = "E_INVALID_ARGUMENTS";
    pub const USAGE: &str = "E_USAGE";
    pub const IMPLEMENTATION: &str = "E_IMPLEMENTATION";
    pub const TIMEOUT: &str = "E_TIMEOUT";
    /// Generic failure used when an `error` payload could not be trusted
    pub const FAILED: &str = "E_FAILED";
}

/// Structured failure delivered through the `error` outcome
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct Failure {
    /// Failure classification
    pub kind: FailureKind,
    /// Stable code (or the originating outcome name for forwarded outcomes)
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Identity of the contract that produced the failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    /// One entry per violated field
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
    /// Outcome the failure originated from, when forwarded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    /// Raw payload retained for inspection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl Failure {
    /// Create a failure of the given kind
    pub fn new(kind: FailureKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            contract: None,
            violations: Vec::new(),
            outcome: None,
            raw: None,
        }
    }

    /// Argument (or output) validation failure enumerating every violation
    pub fn validation(violations: Vec<Violation>) -> Self {
        let details: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
        let message = match violations.len() {
            1 => format!("Invalid argument: {}", details.join("")),
            n => format!("{} invalid arguments: {}", n, details.join("; ")),
        };
        Self {
            violations,
            ..Self::new(FailureKind::Validation, codes::INVALID_ARGUMENTS, message)
        }
    }

    /// Caller misuse surfaced through the `error` outcome
    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Usage, codes::USAGE, message)
    }

    /// Fault raised by (or contract broken by) the implementation
    pub fn implementation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Implementation, codes::IMPLEMENTATION, message)
    }

    /// Deadline exceeded
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::new(
            FailureKind::Timeout,
            codes::TIMEOUT,
            format!("Invocation timed out after {}ms", timeout_ms),
        )
    }

    /// Generic failure used when the `error` payload was empty or unusable
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Implementation, codes::FAILED, message)
    }

    /// Wrap a declared outcome that the caller did not bind
    pub fn named_outcome(outcome: impl Into<String>, payload: Value) -> Self {
        let outcome = outcome.into();
        let raw = if payload.is_null() { None } else { Some(payload) };
        Self {
            outcome: Some(outcome.clone()),
            raw,
            ..Self::new(
                FailureKind::NamedOutcome,
                outcome.clone(),
                format!("Invocation exited through unhandled outcome `{}`", outcome),
            )
        }
    }

    /// Attach the contract identity
    pub fn with_contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = Some(contract.into());
        self
    }

    /// Attach the raw payload
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Attach violations
    pub fn with_violations(mut self, violations: Vec<Violation>) -> Self {
        self.violations = violations;
        self
    }

    /// Whether this failure was caused by the deadline
    pub fn is_timeout(&self) -> bool {
        self.kind == FailureKind::Timeout
    }

    /// Whether this failure wraps the named outcome `name`
    pub fn is_outcome(&self, name: &str) -> bool {
        self.kind == FailureKind::NamedOutcome && self.outcome.as_deref() == Some(name)
    }
}

/// A single problem found while normalizing a declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationProblem {
    /// Location inside the declaration (e.g. `inputs.name`)
    pub path: String,
    /// What is wrong
    pub message: String,
}

impl DeclarationProblem {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for DeclarationProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Build-time errors
#[derive(Error, Debug, Clone)]
pub enum ContractError {
    /// The declaration is malformed; every detected problem is listed
    #[error("Malformed declaration ({} problem(s)): {}", .0.len(), join_problems(.0))]
    Malformed(Vec<DeclarationProblem>),
}

impl ContractError {
    /// All problems carried by this error
    pub fn problems(&self) -> &[DeclarationProblem] {
        match self {
            ContractError::Malformed(problems) => problems,
        }
    }
}

fn join_problems(problems: &[DeclarationProblem]) -> String {
    problems
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised outside the outcome channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    /// Caller misuse detected before the invocation could run
    #[error("Usage error: {0}")]
    Usage(String),

    /// An internal invariant broke
    #[error("Consistency fault: {0}")]
    Consistency(String),
}

impl InvocationError {
    pub fn usage(msg: impl Into<String>) -> Self {
        InvocationError::Usage(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        InvocationError::Consistency(msg.into())
    }

    /// Check if this is caller misuse (vs a runtime fault)
    pub fn is_usage(&self) -> bool {
        matches!(self, InvocationError::Usage(_))
    }
}

/// Schema inference errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The example matches more than one schema shape, or none
    #[error("Ambiguous example at {path}: {reason}")]
    Ambiguous { path: String, reason: String },

    /// The schema could not be resolved
    #[error("Invalid schema: {0}")]
    Invalid(String),
}

impl SchemaError {
    pub fn ambiguous(path: impl Into<String>, reason: impl Into<String>) -> Self {
        SchemaError::Ambiguous {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Errors raised by the `contract-tool` binary
#[derive(Error, Debug)]
pub enum ToolError {
    /// Invalid input data or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File access or I/O error
    #[error("File error: {0}")]
    FileError(String),

    /// Input could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Schema could not be inferred or resolved
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Output could not be serialized
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ToolError {
    /// Check if this is a user-facing error (vs internal)
    pub fn is_user_error(&self) -> bool {
        !matches!(self, ToolError::SerializationError(_))
    }

    /// Check if this error came from the filesystem
    pub fn is_file_error(&self) -> bool {
        matches!(self, ToolError::FileError(_))
    }
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        ToolError::FileError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_display() {
        let failure = Failure::usage("wrong binding style");
        assert_eq!(failure.to_string(), "wrong binding style");
        assert_eq!(failure.code, codes::USAGE);
    }

    #[test]
    fn test_validation_failure_lists_every_violation() {
        let failure = Failure::validation(vec![
            Violation::new("E_REQUIRED", "a", "a is required"),
            Violation::new("E_REQUIRED", "b", "b is required"),
        ]);
        assert_eq!(failure.kind, FailureKind::Validation);
        assert_eq!(failure.violations.len(), 2);
        assert!(failure.message.contains("a is required"));
        assert!(failure.message.contains("b is required"));
    }

    #[test]
    fn test_named_outcome_wraps_name_and_payload() {
        let failure = Failure::named_outcome("notFound", json!({"id": 7}));
        assert!(failure.is_outcome("notFound"));
        assert_eq!(failure.code, "notFound");
        assert_eq!(failure.raw, Some(json!({"id": 7})));
        assert!(!failure.is_timeout());
    }

    #[test]
    fn test_contract_error_lists_problems() {
        let err = ContractError::Malformed(vec![
            DeclarationProblem::new("identity", "missing"),
            DeclarationProblem::new("inputs.a", "no schema"),
        ]);
        assert_eq!(err.problems().len(), 2);
        let text = err.to_string();
        assert!(text.contains("2 problem(s)"));
        assert!(text.contains("inputs.a: no schema"));
    }

    #[test]
    fn test_tool_error_classification() {
        assert!(ToolError::InvalidInput("x".into()).is_user_error());
        assert!(ToolError::from(SchemaError::Invalid("x".into())).is_user_error());
        assert!(!ToolError::SerializationError("x".into()).is_user_error());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(ToolError::from(io).is_file_error());
    }

    #[test]
    fn test_is_usage() {
        assert!(InvocationError::usage("x").is_usage());
        assert!(!InvocationError::consistency("x").is_usage());
    }
}
