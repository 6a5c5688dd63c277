//! Bound expressions.
//!
//! A `BoundNode` is a property value whose references have been resolved to
//! nodes of the same graph, to outputs of an already-built child graph, or to
//! a placeholder for a tolerated missing variable.

use super::graph::NodeKey;
use indexmap::IndexMap;

/// A resolved expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundNode {
    Literal(Literal),
    List(Vec<BoundNode>),
    Map(IndexMap<String, BoundNode>),
    /// String template; parts are literals and references
    Interpolation(Vec<BoundNode>),
    Reference(Reference),
}

/// A scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    /// Number kept in its source spelling
    Number(String),
    String(String),
}

/// A reference to another node, followed by an attribute path.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub target: RefTarget,
    pub attributes: Vec<String>,
}

/// What a reference points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    Variable(String),
    Local(String),
    /// Managed resource, by id (`TYPE.NAME`)
    Resource(String),
    /// Data source, by id (`data.TYPE.NAME`)
    DataSource(String),
    /// Output of a nested module call
    ModuleOutput { module: String, output: String },
    /// Undeclared variable bound under `allow_missing_variables`
    MissingVariable(String),
}

impl RefTarget {
    /// Graph node this target depends on, if any.
    pub fn node_key(&self) -> Option<NodeKey> {
        match self {
            Self::Variable(n) => Some(NodeKey::Variable(n.clone())),
            Self::Local(n) => Some(NodeKey::Local(n.clone())),
            Self::Resource(id) | Self::DataSource(id) => Some(NodeKey::Resource(id.clone())),
            Self::ModuleOutput { module, .. } => Some(NodeKey::Module(module.clone())),
            Self::MissingVariable(_) => None,
        }
    }
}

impl BoundNode {
    pub fn string(s: impl Into<String>) -> Self {
        Self::Literal(Literal::String(s.into()))
    }

    /// Call `f` on every reference in this tree, depth first.
    pub fn visit_references<'a>(&'a self, f: &mut impl FnMut(&'a Reference)) {
        match self {
            Self::Literal(_) => {}
            Self::List(items) | Self::Interpolation(items) => {
                for item in items {
                    item.visit_references(f);
                }
            }
            Self::Map(entries) => {
                for value in entries.values() {
                    value.visit_references(f);
                }
            }
            Self::Reference(r) => f(r),
        }
    }

    /// Graph nodes referenced from this tree.
    pub fn dependencies(&self) -> Vec<NodeKey> {
        let mut deps = Vec::new();
        self.visit_references(&mut |r| {
            if let Some(key) = r.target.node_key() {
                if !deps.contains(&key) {
                    deps.push(key);
                }
            }
        });
        deps
    }
}
