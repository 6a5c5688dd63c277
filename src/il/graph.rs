//! Graph and node types.

use super::bound::BoundNode;
use crate::core::schema::{PropertySchema, ProviderInfo, ResourceSchema};
use indexmap::IndexMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// Common node data
// ============================================================================

/// Original source position of a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    /// 1-based line; 0 marks an unknown position
    pub line: usize,
}

impl Location {
    pub fn new(file: &str, line: usize) -> Self {
        Self {
            file: file.to_string(),
            line,
        }
    }

    /// The invalid sentinel.
    pub fn unknown() -> Self {
        Self {
            file: String::new(),
            line: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.line > 0 && !self.file.is_empty()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Comments attached to a node. Each entry is one line without the comment
/// marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comments {
    pub leading: Vec<String>,
    pub trailing: Vec<String>,
}

/// Fields shared by every graph node.
pub trait Node {
    fn name(&self) -> &str;
    fn location(&self) -> &Location;
    fn comments(&self) -> Option<&Comments>;
    fn comments_mut(&mut self) -> &mut Option<Comments>;
}

macro_rules! impl_node {
    ($($ty:ty),* $(,)?) => {
        $(impl Node for $ty {
            fn name(&self) -> &str {
                &self.name
            }
            fn location(&self) -> &Location {
                &self.location
            }
            fn comments(&self) -> Option<&Comments> {
                self.comments.as_ref()
            }
            fn comments_mut(&mut self) -> &mut Option<Comments> {
                &mut self.comments
            }
        })*
    };
}

impl_node!(ModuleNode, ProviderNode, ResourceNode, OutputNode, LocalNode, VariableNode);

/// Identity of a node within its graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKey {
    Module(String),
    Provider(String),
    /// Resource or data source id
    Resource(String),
    Output(String),
    Local(String),
    Variable(String),
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module(n) => write!(f, "module.{}", n),
            Self::Provider(n) => write!(f, "provider.{}", n),
            Self::Resource(id) => write!(f, "{}", id),
            Self::Output(n) => write!(f, "output.{}", n),
            Self::Local(n) => write!(f, "local.{}", n),
            Self::Variable(n) => write!(f, "var.{}", n),
        }
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// A nested module call.
#[derive(Debug, Clone)]
pub struct ModuleNode {
    pub name: String,
    pub location: Location,
    pub comments: Option<Comments>,
    pub source: String,
    /// Module path of the called instance (key of its graph)
    pub path: Vec<String>,
    pub inputs: IndexMap<String, BoundNode>,
    pub depends_on: Vec<NodeKey>,
}

/// A provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderNode {
    /// `plugin` or `plugin.alias`
    pub name: String,
    pub location: Location,
    pub comments: Option<Comments>,
    pub plugin: String,
    pub alias: Option<String>,
    pub properties: IndexMap<String, BoundNode>,
}

/// Provider used by a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderRef {
    /// Declared in this module or an ancestor
    Declared(String),
    /// Undeclared, bound under `allow_missing_providers`
    Unknown(String),
}

impl ProviderRef {
    pub fn name(&self) -> &str {
        match self {
            Self::Declared(n) | Self::Unknown(n) => n,
        }
    }

    /// Plugin part of the provider name.
    pub fn plugin(&self) -> &str {
        crate::core::types::provider_plugin(self.name())
    }
}

/// A managed resource or data source.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    pub name: String,
    pub location: Location,
    pub comments: Option<Comments>,
    /// Resource type, e.g. `aws_s3_bucket`
    pub kind: String,
    pub provider: ProviderRef,
    pub properties: IndexMap<String, BoundNode>,
    pub depends_on: Vec<NodeKey>,
    pub is_data_source: bool,
    pub(crate) provider_info: Option<Arc<ProviderInfo>>,
}

impl ResourceNode {
    /// `TYPE.NAME`, or `data.TYPE.NAME` for data sources.
    pub fn id(&self) -> String {
        resource_id(&self.kind, &self.name, self.is_data_source)
    }

    /// Schema information for this resource.
    pub fn schemas(&self) -> Schemas<'_> {
        let resource = self.provider_info.as_deref().and_then(|info| {
            if self.is_data_source {
                info.data_sources.get(&self.kind)
            } else {
                info.resources.get(&self.kind)
            }
        });
        Schemas { resource }
    }

    /// Keep only the properties for which `keep` returns true.
    pub fn filter_properties(&mut self, mut keep: impl FnMut(&str, &BoundNode) -> bool) {
        self.properties.retain(|k, v| keep(k, v));
    }

    /// Nodes this resource depends on: its provider, explicit `depends_on`
    /// entries and every reference in its properties.
    pub fn dependencies(&self) -> Vec<NodeKey> {
        let mut deps = Vec::new();
        if let ProviderRef::Declared(p) = &self.provider {
            deps.push(NodeKey::Provider(p.clone()));
        }
        for key in self
            .depends_on
            .iter()
            .cloned()
            .chain(self.properties.values().flat_map(|v| v.dependencies()))
        {
            if !deps.contains(&key) {
                deps.push(key);
            }
        }
        deps
    }
}

/// Resource id for a type and name.
pub fn resource_id(kind: &str, name: &str, is_data_source: bool) -> String {
    if is_data_source {
        format!("data.{}.{}", kind, name)
    } else {
        format!("{}.{}", kind, name)
    }
}

/// Schema view of a resource.
#[derive(Debug, Clone, Copy)]
pub struct Schemas<'a> {
    pub resource: Option<&'a ResourceSchema>,
}

impl<'a> Schemas<'a> {
    pub fn property_schemas(&self, key: &str) -> Option<&'a PropertySchema> {
        self.resource.and_then(|r| r.properties.get(key))
    }

    /// Target type token, when the schema defines one.
    pub fn token(&self) -> Option<&'a str> {
        self.resource.and_then(|r| r.token.as_deref())
    }
}

/// A module output.
#[derive(Debug, Clone)]
pub struct OutputNode {
    pub name: String,
    pub location: Location,
    pub comments: Option<Comments>,
    pub value: BoundNode,
    pub description: Option<String>,
    pub sensitive: bool,
}

/// A local value.
#[derive(Debug, Clone)]
pub struct LocalNode {
    pub name: String,
    pub location: Location,
    pub comments: Option<Comments>,
    pub value: BoundNode,
}

/// An input variable.
#[derive(Debug, Clone)]
pub struct VariableNode {
    pub name: String,
    pub location: Location,
    pub comments: Option<Comments>,
    pub default: Option<BoundNode>,
    pub type_name: Option<String>,
    pub description: Option<String>,
}

// ============================================================================
// Graph
// ============================================================================

/// The bound representation of one module instance.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Module path from the root; empty for the root module
    pub path: Vec<String>,
    pub dir: PathBuf,
    pub is_root: bool,
    pub modules: IndexMap<String, ModuleNode>,
    pub providers: IndexMap<String, ProviderNode>,
    /// Keyed by resource id
    pub resources: IndexMap<String, ResourceNode>,
    pub outputs: IndexMap<String, OutputNode>,
    pub locals: IndexMap<String, LocalNode>,
    pub variables: IndexMap<String, VariableNode>,
    /// Every node, dependencies first
    pub order: Vec<NodeKey>,
}

impl Graph {
    /// Display name of the module (`<root>` or dotted path).
    pub fn display_name(&self) -> String {
        module_display_name(&self.path)
    }

    /// Dependencies of the node identified by `key`.
    pub fn dependencies(&self, key: &NodeKey) -> Vec<NodeKey> {
        match key {
            NodeKey::Module(n) => self.modules.get(n).map_or_else(Vec::new, |m| {
                let mut deps = m.depends_on.clone();
                for d in m.inputs.values().flat_map(|v| v.dependencies()) {
                    if !deps.contains(&d) {
                        deps.push(d);
                    }
                }
                deps
            }),
            NodeKey::Provider(n) => self.providers.get(n).map_or_else(Vec::new, |p| {
                let mut deps = Vec::new();
                for d in p.properties.values().flat_map(|v| v.dependencies()) {
                    if !deps.contains(&d) {
                        deps.push(d);
                    }
                }
                deps
            }),
            NodeKey::Resource(id) => self
                .resources
                .get(id)
                .map_or_else(Vec::new, |r| r.dependencies()),
            NodeKey::Output(n) => self
                .outputs
                .get(n)
                .map_or_else(Vec::new, |o| o.value.dependencies()),
            NodeKey::Local(n) => self
                .locals
                .get(n)
                .map_or_else(Vec::new, |l| l.value.dependencies()),
            NodeKey::Variable(_) => Vec::new(),
        }
    }

    /// Every node key in declaration order, collection by collection.
    pub fn node_keys(&self) -> Vec<NodeKey> {
        let mut keys = Vec::new();
        keys.extend(self.variables.keys().cloned().map(NodeKey::Variable));
        keys.extend(self.providers.keys().cloned().map(NodeKey::Provider));
        keys.extend(self.locals.keys().cloned().map(NodeKey::Local));
        keys.extend(self.resources.keys().cloned().map(NodeKey::Resource));
        keys.extend(self.modules.keys().cloned().map(NodeKey::Module));
        keys.extend(self.outputs.keys().cloned().map(NodeKey::Output));
        keys
    }
}

/// `<root>` for the root module, otherwise the dotted module path.
pub fn module_display_name(path: &[String]) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.join(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::DefaultInfo;

    fn bucket(info: Option<Arc<ProviderInfo>>) -> ResourceNode {
        let mut properties = IndexMap::new();
        properties.insert("bucket".to_string(), BoundNode::string("b"));
        properties.insert("acl".to_string(), BoundNode::string("private"));
        ResourceNode {
            name: "logs".to_string(),
            location: Location::unknown(),
            comments: None,
            kind: "aws_s3_bucket".to_string(),
            provider: ProviderRef::Declared("aws".to_string()),
            properties,
            depends_on: vec![NodeKey::Resource("aws_iam_role.r".to_string())],
            is_data_source: false,
            provider_info: info,
        }
    }

    #[test]
    fn test_graph_location_validity() {
        assert!(Location::new("main.yaml", 3).is_valid());
        assert!(!Location::unknown().is_valid());
        assert!(!Location::new("", 3).is_valid());
        assert_eq!(Location::new("main.yaml", 3).to_string(), "main.yaml:3");
    }

    #[test]
    fn test_graph_resource_ids() {
        assert_eq!(bucket(None).id(), "aws_s3_bucket.logs");
        assert_eq!(resource_id("aws_ami", "ubuntu", true), "data.aws_ami.ubuntu");
    }

    #[test]
    fn test_graph_resource_dependencies() {
        let deps = bucket(None).dependencies();
        assert_eq!(
            deps,
            vec![
                NodeKey::Provider("aws".to_string()),
                NodeKey::Resource("aws_iam_role.r".to_string())
            ]
        );
    }

    #[test]
    fn test_graph_unknown_provider_is_not_a_dependency() {
        let mut r = bucket(None);
        r.provider = ProviderRef::Unknown("aws".to_string());
        assert!(!r.dependencies().contains(&NodeKey::Provider("aws".to_string())));
        assert_eq!(r.provider.plugin(), "aws");
    }

    #[test]
    fn test_graph_schemas_lookup() {
        let mut info = ProviderInfo {
            name: "aws".to_string(),
            ..Default::default()
        };
        let mut schema = ResourceSchema::default();
        schema.properties.insert(
            "bucket".to_string(),
            PropertySchema {
                name: None,
                default: Some(DefaultInfo {
                    value: None,
                    auto_named: true,
                }),
            },
        );
        info.resources.insert("aws_s3_bucket".to_string(), schema);
        let r = bucket(Some(Arc::new(info)));
        let sch = r.schemas();
        assert!(sch.property_schemas("bucket").is_some());
        assert!(sch.property_schemas("acl").is_none());
        assert!(sch.token().is_none());

        assert!(bucket(None).schemas().property_schemas("bucket").is_none());
    }

    #[test]
    fn test_graph_filter_properties() {
        let mut r = bucket(None);
        r.filter_properties(|k, _| k != "bucket");
        assert_eq!(r.properties.keys().collect::<Vec<_>>(), vec!["acl"]);
    }

    #[test]
    fn test_graph_display_name() {
        assert_eq!(module_display_name(&[]), "<root>");
        assert_eq!(
            module_display_name(&["net".to_string(), "subnets".to_string()]),
            "net.subnets"
        );
    }
}
