//! Normalized input, outcome and cache specifications

use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::arguments::ArgumentBag;
use crate::cache::CacheStore;
use crate::error::{Result, SchemaError};
use crate::schema::validate::codes;
use crate::schema::{infer, intersect, value_type_name, Schema, Violation};

/// Predicate used by `Rule::Custom`
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Secondary validation rule, applied after schema validation
#[derive(Clone)]
pub enum Rule {
    /// String must match the pattern
    Pattern(Regex),
    /// Number must be >= bound
    Min(f64),
    /// Number must be <= bound
    Max(f64),
    /// String (chars) or list length must be >= bound
    MinLength(usize),
    /// String (chars) or list length must be <= bound
    MaxLength(usize),
    /// Value must equal one of the listed values
    OneOf(Vec<Value>),
    /// Named predicate
    Custom { name: String, predicate: Predicate },
}

impl Rule {
    pub fn custom<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Rule::Custom {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Check `value`, returning a violation at `path` when the rule fails
    pub fn check(&self, value: &Value, path: &str) -> Option<Violation> {
        let failed = |message: String| Some(Violation::new(codes::RULE, path, message));

        match self {
            Rule::Pattern(regex) => match value.as_str() {
                Some(s) if regex.is_match(s) => None,
                _ => failed(format!("{} must match /{}/", path, regex.as_str())),
            },
            Rule::Min(bound) => match value.as_f64() {
                Some(n) if n >= *bound => None,
                _ => failed(format!("{} must be at least {}", path, bound)),
            },
            Rule::Max(bound) => match value.as_f64() {
                Some(n) if n <= *bound => None,
                _ => failed(format!("{} must be at most {}", path, bound)),
            },
            Rule::MinLength(bound) => match length_of(value) {
                Some(len) if len >= *bound => None,
                _ => failed(format!("{} must have length at least {}", path, bound)),
            },
            Rule::MaxLength(bound) => match length_of(value) {
                Some(len) if len <= *bound => None,
                _ => failed(format!("{} must have length at most {}", path, bound)),
            },
            Rule::OneOf(allowed) => {
                if allowed.contains(value) {
                    None
                } else {
                    let listed: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                    failed(format!("{} must be one of {}", path, listed.join(", ")))
                }
            }
            Rule::Custom { name, predicate } => {
                if predicate(value) {
                    None
                } else {
                    failed(format!("{} failed check `{}`", path, name))
                }
            }
        }
    }

    /// Schema implied by this rule when an input declares nothing else
    pub fn implied_schema(&self) -> Option<Schema> {
        match self {
            Rule::Pattern(_) | Rule::MinLength(_) | Rule::MaxLength(_) => Some(Schema::String),
            Rule::Min(_) | Rule::Max(_) => Some(Schema::Number),
            Rule::OneOf(values) => {
                let mut schemas = values.iter().map(infer);
                let first = schemas.next()?.ok()?;
                for schema in schemas {
                    if schema.ok()? != first {
                        return None;
                    }
                }
                Some(first)
            }
            Rule::Custom { .. } => None,
        }
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
            Rule::Min(n) => f.debug_tuple("Min").field(n).finish(),
            Rule::Max(n) => f.debug_tuple("Max").field(n).finish(),
            Rule::MinLength(n) => f.debug_tuple("MinLength").field(n).finish(),
            Rule::MaxLength(n) => f.debug_tuple("MaxLength").field(n).finish(),
            Rule::OneOf(values) => f.debug_tuple("OneOf").field(values).finish(),
            Rule::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish_non_exhaustive(),
        }
    }
}

/// A normalized input
#[derive(Debug, Clone)]
pub struct InputSpec {
    pub schema: Schema,
    pub required: bool,
    pub nullable: bool,
    pub default_value: Option<Value>,
    pub rules: Vec<Rule>,
    /// Marks the default as shared read-only data; defaults are still cloned
    /// per invocation, so this is descriptive only
    pub read_only: bool,
    pub description: Option<String>,
}

impl InputSpec {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            required: false,
            nullable: false,
            default_value: None,
            rules: Vec::new(),
            read_only: false,
            description: None,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Schema resolver for `OutputSchema::Computed`
pub type SchemaFn = Arc<dyn Fn(&ArgumentBag) -> anyhow::Result<Schema> + Send + Sync>;

/// Output schema of an outcome
#[derive(Clone)]
pub enum OutputSchema {
    Static(Schema),
    /// Shaped like the runtime value of input `input`, within `base`
    Like { input: String, base: Schema },
    /// Shaped like one element of list input `input`, within `base`
    ItemOf { input: String, base: Schema },
    /// Computed from the sanitized arguments
    Computed(SchemaFn),
}

impl OutputSchema {
    /// Input this schema depends on, for relative schemas
    pub fn relative_input(&self) -> Option<&str> {
        match self {
            OutputSchema::Like { input, .. } | OutputSchema::ItemOf { input, .. } => Some(input),
            _ => None,
        }
    }

    /// Whether resolution needs the invocation's arguments
    pub fn needs_arguments(&self) -> bool {
        !matches!(self, OutputSchema::Static(_))
    }

    /// Resolve to a concrete schema for one invocation
    ///
    /// Relative schemas narrow `base` by the schema inferred from the
    /// argument. When the argument is absent, cannot be inferred, or does
    /// not overlap `base`, the broader `base` is used.
    pub fn resolve(&self, arguments: Option<&ArgumentBag>) -> Result<Schema> {
        match self {
            OutputSchema::Static(schema) => Ok(schema.clone()),
            OutputSchema::Like { input, base } => {
                let narrowed = arguments
                    .and_then(|args| args.get(input))
                    .and_then(|value| infer(value).ok())
                    .and_then(|inferred| intersect(base, &inferred));
                Ok(narrowed.unwrap_or_else(|| base.clone()))
            }
            OutputSchema::ItemOf { input, base } => {
                let narrowed = arguments
                    .and_then(|args| args.get(input))
                    .filter(|value| value.is_array())
                    .and_then(|value| infer(value).ok())
                    .and_then(|inferred| inferred.item_schema())
                    .and_then(|item| intersect(base, &item));
                Ok(narrowed.unwrap_or_else(|| base.clone()))
            }
            OutputSchema::Computed(compute) => {
                let Some(arguments) = arguments else {
                    return Err(SchemaError::Invalid(
                        "computed schema resolved without arguments".to_string(),
                    ));
                };
                compute(arguments).map_err(|e| SchemaError::Invalid(e.to_string()))
            }
        }
    }
}

impl fmt::Debug for OutputSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSchema::Static(schema) => f.debug_tuple("Static").field(schema).finish(),
            OutputSchema::Like { input, base } => f
                .debug_struct("Like")
                .field("input", input)
                .field("base", base)
                .finish(),
            OutputSchema::ItemOf { input, base } => f
                .debug_struct("ItemOf")
                .field("input", input)
                .field("base", base)
                .finish(),
            OutputSchema::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// A normalized outcome
#[derive(Debug, Clone, Default)]
pub struct OutcomeSpec {
    /// `None` marks a void outcome
    pub output: Option<OutputSchema>,
    pub description: Option<String>,
}

impl OutcomeSpec {
    pub fn void() -> Self {
        Self::default()
    }

    pub fn with_schema(schema: Schema) -> Self {
        Self {
            output: Some(OutputSchema::Static(schema)),
            description: None,
        }
    }

    pub fn is_void(&self) -> bool {
        self.output.is_none()
    }
}

/// Memoization policy
///
/// `ttl` of `None` inherits the runtime default while building; after
/// normalization it is always set, and `Duration::ZERO` means entries never
/// expire.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    /// Outcome whose payload is memoized
    pub outcome: String,
    pub ttl: Option<Duration>,
    /// Stale entries tolerated before eviction runs
    pub gc_buffer: Option<usize>,
    /// Store used when the invocation does not attach one
    pub store: Option<Arc<dyn CacheStore>>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            outcome: crate::contract::SUCCESS.to_string(),
            ttl: None,
            gc_buffer: None,
            store: None,
        }
    }
}

impl CachePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = outcome.into();
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn gc_buffer(mut self, buffer: usize) -> Self {
        self.gc_buffer = Some(buffer);
        self
    }

    pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Oldest creation instant still considered fresh, if entries expire
    pub fn freshness_cutoff(&self, now: chrono::DateTime<chrono::Utc>) -> Option<chrono::DateTime<chrono::Utc>> {
        let ttl = self.ttl.filter(|ttl| !ttl.is_zero())?;
        let ttl = chrono::Duration::from_std(ttl).ok()?;
        now.checked_sub_signed(ttl)
    }
}

/// Describe a value for messages (`string "abc"`, `object`)
pub(crate) fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("string {:?}", s),
        Value::Number(n) => format!("number {}", n),
        Value::Bool(b) => format!("boolean {}", b),
        other => value_type_name(other).to_string(),
    }
}
