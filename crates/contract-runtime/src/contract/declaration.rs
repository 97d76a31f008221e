//! Builder-style declarations
//!
//! A `Declaration` may be partial or wrong; nothing is checked until
//! `build()`, which reports every problem at once.
//!
//! ```rust,no_run
//! use contract_runtime::{Declaration, Implementation, InputDeclaration, OutcomeDeclaration};
//! use serde_json::json;
//!
//! let add = Declaration::new()
//!     .identity("add")
//!     .input("a", InputDeclaration::new().example(json!(1)).required(true))
//!     .input("b", InputDeclaration::new().example(json!(1)).required(true))
//!     .outcome("success", OutcomeDeclaration::new().example(json!(2)))
//!     .implementation(Implementation::asynchronous(|args, exits, _ctx| async move {
//!         let sum = args.get_f64("a").unwrap_or(0.0) + args.get_f64("b").unwrap_or(0.0);
//!         exits.success(json!(sum));
//!         Ok(())
//!     }))
//!     .build()
//!     .unwrap();
//! # let _ = add;
//! ```

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::implementation::Implementation;
use super::normalize::normalize;
use super::spec::{CachePolicy, Rule, SchemaFn};
use super::Contract;
use crate::arguments::ArgumentBag;
use crate::config::RuntimeConfig;
use crate::error::ContractError;
use crate::schema::Schema;
use crate::telemetry::InvocationMetrics;
use crate::usage::{BindingStyle, TriggeringStyle};

/// Raw contract declaration
#[derive(Debug, Default)]
pub struct Declaration {
    pub(crate) identity: Option<String>,
    pub(crate) friendly_name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) inputs: IndexMap<String, InputDeclaration>,
    pub(crate) outcomes: IndexMap<String, OutcomeDeclaration>,
    pub(crate) implementation: Option<Implementation>,
    pub(crate) sync: bool,
    pub(crate) timeout_ms: Option<u64>,
    pub(crate) cache: Option<CachePolicy>,
    pub(crate) args_order: Option<Vec<String>>,
    pub(crate) binding: BindingStyle,
    pub(crate) triggering: TriggeringStyle,
    pub(crate) metrics: Option<Arc<InvocationMetrics>>,
}

impl Declaration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare (or replace) an input
    pub fn input(mut self, name: impl Into<String>, input: InputDeclaration) -> Self {
        self.inputs.insert(name.into(), input);
        self
    }

    /// Declare (or replace) an outcome
    pub fn outcome(mut self, name: impl Into<String>, outcome: OutcomeDeclaration) -> Self {
        self.outcomes.insert(name.into(), outcome);
        self
    }

    pub fn implementation(mut self, implementation: Implementation) -> Self {
        self.implementation = Some(implementation);
        self
    }

    /// Mark the contract synchronous (requires a synchronous implementation)
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Execution deadline; 0 disables
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn cache(mut self, policy: CachePolicy) -> Self {
        self.cache = Some(policy);
        self
    }

    /// Input names in positional order
    pub fn args_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args_order = Some(order.into_iter().map(Into::into).collect());
        self
    }

    pub fn binding(mut self, binding: BindingStyle) -> Self {
        self.binding = binding;
        self
    }

    pub fn triggering(mut self, triggering: TriggeringStyle) -> Self {
        self.triggering = triggering;
        self
    }

    pub fn metrics(mut self, metrics: Arc<InvocationMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Normalize with default runtime settings
    pub fn build(self) -> Result<Arc<Contract>, ContractError> {
        self.build_with(&RuntimeConfig::default())
    }

    /// Normalize with explicit runtime settings
    pub fn build_with(self, config: &RuntimeConfig) -> Result<Arc<Contract>, ContractError> {
        normalize(self, config).map(Arc::new)
    }
}

/// Raw input declaration
#[derive(Debug, Clone, Default)]
pub struct InputDeclaration {
    pub(crate) schema: Option<Schema>,
    pub(crate) example: Option<Value>,
    pub(crate) required: bool,
    pub(crate) nullable: bool,
    pub(crate) default_value: Option<Value>,
    pub(crate) rules: Vec<Rule>,
    pub(crate) read_only: bool,
    pub(crate) description: Option<String>,
    /// Problems detected while declaring (bad patterns), reported at build
    pub(crate) problems: Vec<String>,
}

impl InputDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Representative value to infer the schema from
    pub fn example(mut self, example: Value) -> Self {
        self.example = Some(example);
        self
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

    pub fn pattern(mut self, pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(regex) => self.rules.push(Rule::Pattern(regex)),
            Err(e) => self.problems.push(format!("invalid pattern /{}/: {}", pattern, e)),
        }
        self
    }

    pub fn min(mut self, bound: f64) -> Self {
        self.rules.push(Rule::Min(bound));
        self
    }

    pub fn max(mut self, bound: f64) -> Self {
        self.rules.push(Rule::Max(bound));
        self
    }

    pub fn min_length(mut self, bound: usize) -> Self {
        self.rules.push(Rule::MinLength(bound));
        self
    }

    pub fn max_length(mut self, bound: usize) -> Self {
        self.rules.push(Rule::MaxLength(bound));
        self
    }

    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.rules.push(Rule::OneOf(values));
        self
    }

    pub fn custom<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.rules.push(Rule::custom(name, predicate));
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

/// Where an outcome's output schema comes from
#[derive(Clone)]
pub(crate) enum OutputSource {
    Schema(Schema),
    Example(Value),
    Like(String),
    ItemOf(String),
    Computed(SchemaFn),
}

impl fmt::Debug for OutputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSource::Schema(schema) => f.debug_tuple("Schema").field(schema).finish(),
            OutputSource::Example(example) => f.debug_tuple("Example").field(example).finish(),
            OutputSource::Like(input) => f.debug_tuple("Like").field(input).finish(),
            OutputSource::ItemOf(input) => f.debug_tuple("ItemOf").field(input).finish(),
            OutputSource::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Raw outcome declaration; no output source makes the outcome void
#[derive(Debug, Clone, Default)]
pub struct OutcomeDeclaration {
    pub(crate) output: Option<OutputSource>,
    /// Upper bound for relative outputs (defaults to any JSON value)
    pub(crate) base: Option<Schema>,
    pub(crate) description: Option<String>,
}

impl OutcomeDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.output = Some(OutputSource::Schema(schema));
        self
    }

    pub fn example(mut self, example: Value) -> Self {
        self.output = Some(OutputSource::Example(example));
        self
    }

    /// Output shaped like the runtime value of `input`
    pub fn like(mut self, input: impl Into<String>) -> Self {
        self.output = Some(OutputSource::Like(input.into()));
        self
    }

    /// Output shaped like one element of list input `input`
    pub fn item_of(mut self, input: impl Into<String>) -> Self {
        self.output = Some(OutputSource::ItemOf(input.into()));
        self
    }

    /// Bound a relative output by `base`
    pub fn within(mut self, base: Schema) -> Self {
        self.base = Some(base);
        self
    }

    pub fn computed<F>(mut self, compute: F) -> Self
    where
        F: Fn(&ArgumentBag) -> anyhow::Result<Schema> + Send + Sync + 'static,
    {
        self.output = Some(OutputSource::Computed(Arc::new(compute)));
        self
    }
}
