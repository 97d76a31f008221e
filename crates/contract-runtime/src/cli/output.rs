//! Output formatting for `contract-tool`
//!
//! JSON and YAML for machines, a colored table for people.

use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, Write};

use crate::error::ToolError;
use crate::schema::{Schema, Violation};

/// Output format options for CLI results
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Human-readable table format with colors
    #[default]
    Table,
    /// JSON format for machine processing
    Json,
    /// YAML format
    Yaml,
}

/// Result of checking a value against a schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub mode: String,
    pub schema: Schema,
    /// The value after coercion, when valid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coerced: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

/// Result of `infer`, `hash` or `intersect`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum SchemaReport {
    Infer {
        schema: Schema,
    },
    Hash {
        canonical: String,
        hash: String,
    },
    Intersect {
        left: Schema,
        right: Schema,
        #[serde(skip_serializing_if = "Option::is_none")]
        intersection: Option<Schema>,
    },
}

impl ValidationReport {
    /// Render output in the specified format
    pub fn render(&self, format: OutputFormat) -> Result<(), ToolError> {
        match format {
            OutputFormat::Json => render_json(self),
            OutputFormat::Yaml => render_yaml(self),
            OutputFormat::Table => self.render_table(),
        }
    }

    fn render_table(&self) -> Result<(), ToolError> {
        let mut stdout = io::stdout();

        writeln!(stdout).ok();
        writeln!(stdout, "{}", "Validation Results".cyan().bold()).ok();
        writeln!(stdout, "{}", "=".repeat(60)).ok();
        writeln!(stdout).ok();

        let status = if self.valid { "+".green() } else { "x".red() };
        let summary = if self.valid {
            format!("Value conforms to `{}` ({} mode)", self.schema, self.mode)
        } else {
            format!(
                "Value has {} violation(s) against `{}` ({} mode)",
                self.violations.len(),
                self.schema,
                self.mode
            )
        };
        writeln!(stdout, "{} {}", status, summary).ok();
        writeln!(stdout).ok();

        if let Some(coerced) = &self.coerced {
            writeln!(stdout, "{}", "Coerced value:".cyan().bold()).ok();
            writeln!(stdout, "  {}", coerced).ok();
            writeln!(stdout).ok();
        }

        if !self.violations.is_empty() {
            writeln!(stdout, "{}", "Violations:".cyan().bold()).ok();
            writeln!(stdout, "{}", "-".repeat(60)).ok();
            for (index, violation) in self.violations.iter().enumerate() {
                writeln!(
                    stdout,
                    "{}. [{}] {}",
                    index + 1,
                    violation.code.red(),
                    violation.message
                )
                .ok();
                writeln!(stdout, "   {} {}", "Path:".dimmed(), violation.path).ok();
                if let Some(expected) = &violation.expected {
                    writeln!(stdout, "   {} {}", "Expected:".dimmed(), expected).ok();
                }
                if let Some(actual) = &violation.actual {
                    writeln!(stdout, "   {} {}", "Actual:".dimmed(), actual).ok();
                }
            }
            writeln!(stdout).ok();
        }

        Ok(())
    }
}

impl SchemaReport {
    /// Render output in the specified format
    pub fn render(&self, format: OutputFormat) -> Result<(), ToolError> {
        match format {
            OutputFormat::Json => render_json(self),
            OutputFormat::Yaml => render_yaml(self),
            OutputFormat::Table => {
                self.render_table();
                Ok(())
            }
        }
    }

    fn render_table(&self) {
        match self {
            SchemaReport::Infer { schema } => {
                println!("{}", "Inferred Schema".cyan().bold());
                print_schema_tree(schema, "", "$");
            }
            SchemaReport::Hash { canonical, hash } => {
                println!("{} {}", "Canonical:".cyan().bold(), canonical);
                println!("{} {}", "Hash:".cyan().bold(), hash.green());
            }
            SchemaReport::Intersect {
                left,
                right,
                intersection,
            } => {
                println!("{} {}", "Left:".cyan().bold(), left);
                println!("{} {}", "Right:".cyan().bold(), right);
                match intersection {
                    Some(schema) => {
                        println!("{}", "Intersection:".cyan().bold());
                        print_schema_tree(schema, "", "$");
                    }
                    None => println!("{} no value satisfies both schemas", "x".red()),
                }
            }
        }
    }
}

fn render_json<T: Serialize>(report: &T) -> Result<(), ToolError> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| ToolError::SerializationError(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

fn render_yaml<T: Serialize>(report: &T) -> Result<(), ToolError> {
    let yaml =
        serde_yaml::to_string(report).map_err(|e| ToolError::SerializationError(e.to_string()))?;
    println!("{}", yaml);
    Ok(())
}

/// Recursively print a schema as a tree
fn print_schema_tree(schema: &Schema, prefix: &str, label: &str) {
    let kind = match schema {
        Schema::String => "string".yellow(),
        Schema::Number => "number".cyan(),
        Schema::Boolean => "boolean".magenta(),
        Schema::Json => "json".white(),
        Schema::Opaque => "opaque".dimmed(),
        Schema::Exact { value } => format!("exact({})", value).red(),
        Schema::List { .. } => "list".blue(),
        Schema::Dictionary => "dictionary".green(),
        Schema::Record { .. } => "record".green(),
    };
    println!("{}{}: {}", prefix, label, kind);

    let nested = format!("{}    ", prefix);
    match schema {
        Schema::List { items } => print_schema_tree(items, &nested, "[]"),
        Schema::Record { fields } => {
            for (name, field) in fields {
                print_schema_tree(field, &nested, name);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Table);
    }

    #[test]
    fn test_report_serialization() {
        let report = SchemaReport::Hash {
            canonical: "{\"a\":1}".to_string(),
            hash: "ff".to_string(),
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["command"], json!("hash"));
        assert_eq!(value["hash"], json!("ff"));

        let validation = ValidationReport {
            valid: true,
            mode: "lenient".to_string(),
            schema: Schema::Number,
            coerced: Some(json!(3)),
            violations: vec![],
        };
        let value = serde_json::to_value(&validation).unwrap();
        assert!(value.get("violations").is_none());
        assert_eq!(value["schema"], json!({"type": "number"}));
    }
}
