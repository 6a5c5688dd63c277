//! CV-010: Error taxonomy.
//!
//! One error type per pipeline stage. `ConvertError` wraps each with the
//! short stage label reported to the user.

use std::path::PathBuf;

/// Failure while creating or loading the module tree.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("module directory {} does not exist", path.display())]
    NotFound { path: PathBuf },

    #[error("no module files (*.yaml, *.yml) in {}", path.display())]
    NoModuleFiles { path: PathBuf },

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid module {}: {}", path.display(), errors.join("; "))]
    Invalid { path: PathBuf, errors: Vec<String> },

    #[error("{section} '{name}' declared in both {first} and {second}")]
    Duplicate {
        section: String,
        name: String,
        first: String,
        second: String,
    },

    #[error("unsupported module source '{source_addr}'")]
    UnsupportedSource { source_addr: String },

    #[error("module '{name}' at {} includes itself", path.display())]
    Recursive { name: String, path: PathBuf },

    #[error("fetching '{source_addr}': {message}")]
    Fetch { source_addr: String, message: String },

    #[error("credentials for host '{host}': {message}")]
    Credentials { host: String, message: String },

    #[error("invalid file pattern: {0}")]
    Pattern(String),
}

/// Failure while binding one module into a graph.
#[derive(Debug, thiserror::Error)]
#[error("module {module}: {kind}")]
pub struct BindError {
    /// Display path of the module being bound (`<root>` for the root).
    pub module: String,
    pub kind: BindErrorKind,
}

impl BindError {
    pub fn new(module: &str, kind: BindErrorKind) -> Self {
        Self {
            module: module.to_string(),
            kind,
        }
    }
}

/// What went wrong during binding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindErrorKind {
    #[error("{referrer} references undeclared provider '{provider}'")]
    UnknownProvider { referrer: String, provider: String },

    #[error("{referrer} references undeclared variable '{name}'")]
    UnknownVariable { referrer: String, name: String },

    #[error("{referrer} references undeclared local '{name}'")]
    UnknownLocal { referrer: String, name: String },

    #[error("{referrer} references undeclared resource '{target}'")]
    UnknownResource { referrer: String, target: String },

    #[error("{referrer} references undeclared module '{name}'")]
    UnknownModule { referrer: String, name: String },

    #[error("{referrer} references unknown output '{output}' of module '{module}'")]
    UnknownModuleOutput {
        referrer: String,
        module: String,
        output: String,
    },

    #[error("module call '{module}' sets '{input}', which the module does not declare")]
    UnknownModuleInput { module: String, input: String },

    #[error("{referrer}: {message}")]
    InvalidExpression { referrer: String, message: String },

    #[error("default of variable '{variable}' must not contain references")]
    ReferenceInDefault { variable: String },

    #[error("cannot extract comments for {node}: {reason}")]
    MissingComments { node: String, reason: String },

    #[error("dependency cycle detected involving: {}", nodes.join(", "))]
    Cycle { nodes: Vec<String> },
}

/// Invalid generator configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "invalid language '{language}', expected one of {}",
        crate::gen::TargetLanguage::valid_names()
    )]
    InvalidLanguage { language: String },

    #[error("invalid target options of type {actual} for target '{target}'")]
    InvalidTargetOptions { target: String, actual: String },
}

/// Failure inside a generator backend.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("resource '{resource}' has unsupported type '{kind}'")]
    InvalidResourceType { resource: String, kind: String },

    #[error("module '{module}' has no generated graph")]
    MissingModule { module: String },
}

/// Top-level conversion failure, labelled by stage.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("creating tree module: {0}")]
    CreateTree(#[source] LoadError),

    #[error("loading module: {0}")]
    LoadModule(#[source] LoadError),

    #[error("importing project graphs: {0}")]
    ImportGraphs(#[source] BindError),

    #[error("creating generator: {0}")]
    CreateGenerator(#[source] ConfigError),

    #[error("generating code: {0}")]
    Generate(#[source] GenerateError),
}
