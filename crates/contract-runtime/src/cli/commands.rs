//! CLI command definitions for `contract-tool`
//!
//! Clap-based commands exposing the schema engine: inference from examples,
//! validation with coercion, stable hashing and intersection.

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::Path;

use super::output::{OutputFormat, SchemaReport, ValidationReport};
use super::ExitCode;
use crate::error::ToolError;
use crate::schema::{canonical_json, hash, infer, intersect, validate, Schema, ValidationMode};

/// Contract runtime schema tool
///
/// Inputs are inline JSON or a path to a `.json`, `.yaml` or `.yml` file.
#[derive(Parser, Debug)]
#[command(name = "contract-tool")]
#[command(about = "Inspect and check values with the contract schema engine", long_about = None)]
#[command(version)]
pub struct ToolCli {
    /// Output verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value = "table", global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: ToolCommands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum ToolCommands {
    /// Infer a schema from a representative example
    ///
    /// `"*"` stands for any JSON value, `"==="` for an opaque reference and
    /// `{"$exact": v}` for structural equality with `v`.
    Infer {
        /// Example value
        example: String,
    },

    /// Check a value against a schema, applying coercion
    Validate {
        /// Schema (serialized form), or an example with `--example`
        #[arg(short, long)]
        schema: String,

        /// Value to check
        #[arg(long)]
        value: String,

        /// Treat `--schema` as an example to infer from
        #[arg(long)]
        example: bool,

        /// Require values to already conform (no coercion)
        #[arg(long)]
        strict: bool,
    },

    /// Print the canonical encoding and stable hash of a value
    Hash {
        /// Value to hash
        value: String,
    },

    /// Intersect two schemas
    Intersect {
        /// First schema
        left: String,

        /// Second schema
        right: String,

        /// Treat both inputs as examples to infer from
        #[arg(long)]
        example: bool,
    },
}

/// Execute the infer command
pub fn execute_infer(example: &str, format: OutputFormat) -> Result<ExitCode, ToolError> {
    let example = load_value(example)?;
    let schema = infer(&example)?;
    SchemaReport::Infer { schema }.render(format)?;
    Ok(ExitCode::Success)
}

/// Execute the validate command
pub fn execute_validate(
    schema: &str,
    value: &str,
    from_example: bool,
    strict: bool,
    format: OutputFormat,
) -> Result<ExitCode, ToolError> {
    let schema = load_schema(schema, from_example)?;
    let value = load_value(value)?;
    let mode = if strict {
        ValidationMode::Strict
    } else {
        ValidationMode::Lenient
    };

    let report = match validate(&schema, &value, mode) {
        Ok(coerced) => ValidationReport {
            valid: true,
            mode: mode.to_string(),
            schema,
            coerced: Some(coerced),
            violations: Vec::new(),
        },
        Err(violations) => ValidationReport {
            valid: false,
            mode: mode.to_string(),
            schema,
            coerced: None,
            violations,
        },
    };
    report.render(format)?;

    Ok(if report.valid {
        ExitCode::Success
    } else {
        ExitCode::ValidationError
    })
}

/// Execute the hash command
pub fn execute_hash(value: &str, format: OutputFormat) -> Result<ExitCode, ToolError> {
    let value = load_value(value)?;
    SchemaReport::Hash {
        canonical: canonical_json(&value),
        hash: hash(&value),
    }
    .render(format)?;
    Ok(ExitCode::Success)
}

/// Execute the intersect command
pub fn execute_intersect(
    left: &str,
    right: &str,
    from_example: bool,
    format: OutputFormat,
) -> Result<ExitCode, ToolError> {
    let left = load_schema(left, from_example)?;
    let right = load_schema(right, from_example)?;
    let intersection = intersect(&left, &right);
    let disjoint = intersection.is_none();

    SchemaReport::Intersect {
        left,
        right,
        intersection,
    }
    .render(format)?;

    Ok(if disjoint {
        ExitCode::ValidationError
    } else {
        ExitCode::Success
    })
}

/// Load a schema, either serialized or inferred from an example
fn load_schema(input: &str, from_example: bool) -> Result<Schema, ToolError> {
    let value = load_value(input)?;
    if from_example {
        return Ok(infer(&value)?);
    }
    serde_json::from_value(value)
        .map_err(|e| ToolError::InvalidInput(format!("Not a serialized schema: {}", e)))
}

/// Inline JSON, or the contents of a JSON/YAML file
pub(crate) fn load_value(input: &str) -> Result<Value, ToolError> {
    let path = Path::new(input);
    if path.is_file() {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ToolError::FileError(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        return parse_file(path, &content);
    }
    if looks_like_path(input) {
        return Err(ToolError::FileError(format!("File not found: '{}'", input)));
    }
    serde_json::from_str(input).map_err(|e| ToolError::ParseError(format!("Invalid JSON: {}", e)))
}

fn looks_like_path(input: &str) -> bool {
    let lower = input.to_lowercase();
    [".json", ".yaml", ".yml"].iter().any(|ext| lower.ends_with(ext))
}

/// Parse a file based on its extension
fn parse_file(path: &Path, content: &str) -> Result<Value, ToolError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "json" => serde_json::from_str(content)
            .map_err(|e| ToolError::ParseError(format!("Invalid JSON: {}", e))),
        "yaml" | "yml" => serde_yaml::from_str(content)
            .map_err(|e| ToolError::ParseError(format!("Invalid YAML: {}", e))),
        _ => Err(ToolError::InvalidInput(format!(
            "Unsupported file format: {}. Supported formats: json, yaml, yml",
            extension
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn test_cli_definition() {
        ToolCli::command().debug_assert();
    }

    #[test]
    fn test_parse_validate_args() {
        let cli = ToolCli::parse_from([
            "contract-tool",
            "--format",
            "json",
            "validate",
            "--schema",
            "{\"type\":\"number\"}",
            "--value",
            "\"5\"",
            "--strict",
        ]);
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            ToolCommands::Validate { strict, example, .. } => {
                assert!(strict);
                assert!(!example);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_load_inline_value() {
        assert_eq!(load_value("{\"a\": [1, 2]}").unwrap(), json!({"a": [1, 2]}));
        assert!(matches!(load_value("{oops"), Err(ToolError::ParseError(_))));
        assert!(matches!(
            load_value("missing-file.yaml"),
            Err(ToolError::FileError(_))
        ));
    }

    #[test]
    fn test_load_schema_both_ways() {
        assert_eq!(load_schema("{\"type\":\"string\"}", false).unwrap(), Schema::String);
        assert_eq!(load_schema("\"text\"", true).unwrap(), Schema::String);
        assert!(load_schema("\"text\"", false).is_err());
    }

    #[test]
    fn test_parse_file_by_extension() {
        let yaml = parse_file(Path::new("value.yaml"), "a: 1\nb: [x]\n").unwrap();
        assert_eq!(yaml, json!({"a": 1, "b": ["x"]}));
        assert!(parse_file(Path::new("value.toml"), "a = 1").is_err());
    }

    #[test]
    fn test_validate_exit_codes() {
        let ok = execute_validate("{\"type\":\"number\"}", "\"5\"", false, false, OutputFormat::Json).unwrap();
        assert_eq!(ok, ExitCode::Success);
        let strict = execute_validate("{\"type\":\"number\"}", "\"5\"", false, true, OutputFormat::Json).unwrap();
        assert_eq!(strict, ExitCode::ValidationError);
    }

    #[test]
    fn test_intersect_exit_codes() {
        let overlap = execute_intersect("{\"a\": 1}", "{\"b\": \"x\"}", true, OutputFormat::Json).unwrap();
        assert_eq!(overlap, ExitCode::Success);
        let disjoint = execute_intersect("1", "\"x\"", true, OutputFormat::Json).unwrap();
        assert_eq!(disjoint, ExitCode::ValidationError);
    }
}
