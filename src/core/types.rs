//! CV-001: Declaration types for module documents.
//!
//! Defines the YAML schema of a module file: providers, variables, locals,
//! resources, data sources, nested module calls and outputs. Every section is
//! an order-preserving map so declaration order survives into the graph.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw YAML value as written in a module file.
pub type Value = serde_yaml_ng::Value;

// ============================================================================
// Module document
// ============================================================================

/// One module document. A module directory may hold several of these; the
/// loader merges them into a single `ModuleConfig`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleConfig {
    /// Provider configurations, keyed by `name` or `name.alias`
    #[serde(default)]
    pub providers: IndexMap<String, IndexMap<String, Value>>,

    /// Input variables
    #[serde(default)]
    pub variables: IndexMap<String, VariableDecl>,

    /// Local values
    #[serde(default)]
    pub locals: IndexMap<String, Value>,

    /// Managed resources, keyed by resource name
    #[serde(default)]
    pub resources: IndexMap<String, ResourceDecl>,

    /// Data sources, keyed by data source name
    #[serde(default)]
    pub data: IndexMap<String, ResourceDecl>,

    /// Nested module calls
    #[serde(default)]
    pub modules: IndexMap<String, ModuleCall>,

    /// Module outputs
    #[serde(default)]
    pub outputs: IndexMap<String, OutputDecl>,
}

// ============================================================================
// Declarations
// ============================================================================

/// An input variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableDecl {
    /// Informational type name (string, number, bool, list, map)
    #[serde(rename = "type", default)]
    pub type_name: Option<String>,

    /// Literal default value
    #[serde(default)]
    pub default: Option<Value>,

    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
}

/// A managed resource or a data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDecl {
    /// Resource type, e.g. `aws_s3_bucket`
    #[serde(rename = "type")]
    pub resource_type: String,

    /// Explicit provider (`name` or `name.alias`)
    #[serde(default)]
    pub provider: Option<String>,

    /// Resource arguments
    #[serde(default)]
    pub properties: IndexMap<String, Value>,

    /// Explicit dependencies (`TYPE.NAME` or `data.TYPE.NAME`)
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ResourceDecl {
    /// Provider this resource uses: the explicit one, or the type prefix.
    pub fn provider_name(&self) -> String {
        match &self.provider {
            Some(p) => p.clone(),
            None => type_provider(&self.resource_type).to_string(),
        }
    }
}

/// A nested module call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleCall {
    /// Module source: a local path or `git::URL[?ref=REF]`
    pub source: String,

    /// Values for the child module's variables
    #[serde(default)]
    pub inputs: IndexMap<String, Value>,

    /// Explicit dependencies
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A module output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputDecl {
    pub value: Value,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub sensitive: bool,
}

// ============================================================================
// Sections
// ============================================================================

/// Top-level section of a module document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Providers,
    Variables,
    Locals,
    Resources,
    Data,
    Modules,
    Outputs,
}

impl Section {
    pub const ALL: [Section; 7] = [
        Self::Providers,
        Self::Variables,
        Self::Locals,
        Self::Resources,
        Self::Data,
        Self::Modules,
        Self::Outputs,
    ];

    /// The YAML key of this section.
    pub fn key(self) -> &'static str {
        match self {
            Self::Providers => "providers",
            Self::Variables => "variables",
            Self::Locals => "locals",
            Self::Resources => "resources",
            Self::Data => "data",
            Self::Modules => "modules",
            Self::Outputs => "outputs",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Provider prefix of a resource type (`aws_s3_bucket` → `aws`).
pub fn type_provider(resource_type: &str) -> &str {
    resource_type
        .split_once('_')
        .map(|(p, _)| p)
        .unwrap_or(resource_type)
}

/// Plugin name of a provider key (`aws.west` → `aws`).
pub fn provider_plugin(provider: &str) -> &str {
    provider.split_once('.').map(|(p, _)| p).unwrap_or(provider)
}

/// Convert a YAML scalar to a string for display.
pub fn yaml_value_to_string(val: &Value) -> String {
    match val {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => format!("{:?}", other),
    }
}
