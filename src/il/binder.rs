//! CV-007: Graph binder.
//!
//! Turns one loaded module into a `Graph`: every declaration becomes a node,
//! every expression is bound with its references resolved, every resource is
//! paired with its provider and schema, and the nodes are put in dependency
//! order. Missing providers, missing variables and unrecoverable comments are
//! fatal unless the matching `BuildOptions` tolerance is set.

use super::bound::{BoundNode, Literal, RefTarget, Reference};
use super::graph::*;
use super::order;
use super::BuildOptions;
use crate::core::schema::ProviderInfo;
use crate::core::template::{self, TemplatePart, Traversal};
use crate::core::tree::ModuleTree;
use crate::core::types::{yaml_value_to_string, ResourceDecl, Section, Value};
use crate::error::{BindError, BindErrorKind};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::sync::Arc;

/// Build the graph for one module.
pub fn build_graph(tree: &ModuleTree, opts: &BuildOptions) -> Result<Graph, BindError> {
    let binder = Binder {
        tree,
        opts,
        module: module_display_name(tree.path()),
        provider_infos: RefCell::new(FxHashMap::default()),
    };
    binder.bind()
}

struct Binder<'a> {
    tree: &'a ModuleTree,
    opts: &'a BuildOptions,
    module: String,
    provider_infos: RefCell<FxHashMap<String, Option<Arc<ProviderInfo>>>>,
}

impl Binder<'_> {
    fn bind(&self) -> Result<Graph, BindError> {
        let config = self.tree.config();
        let mut graph = Graph {
            path: self.tree.path().to_vec(),
            dir: self.tree.dir().to_path_buf(),
            is_root: self.tree.path().is_empty(),
            ..Default::default()
        };

        for (name, decl) in &config.variables {
            let (location, comments) = self.header(Section::Variables, name)?;
            let default = match &decl.default {
                Some(v) => Some(self.bind_literal(name, v)?),
                None => None,
            };
            graph.variables.insert(
                name.clone(),
                VariableNode {
                    name: name.clone(),
                    location,
                    comments,
                    default,
                    type_name: decl.type_name.clone(),
                    description: decl.description.clone(),
                },
            );
        }

        for (name, props) in &config.providers {
            let referrer = format!("provider '{}'", name);
            let (location, comments) = self.header(Section::Providers, name)?;
            let (plugin, alias) = match name.split_once('.') {
                Some((p, a)) => (p.to_string(), Some(a.to_string())),
                None => (name.clone(), None),
            };
            graph.providers.insert(
                name.clone(),
                ProviderNode {
                    name: name.clone(),
                    location,
                    comments,
                    plugin,
                    alias,
                    properties: self.bind_map(&referrer, props)?,
                },
            );
        }

        for (name, value) in &config.locals {
            let referrer = format!("local '{}'", name);
            let (location, comments) = self.header(Section::Locals, name)?;
            graph.locals.insert(
                name.clone(),
                LocalNode {
                    name: name.clone(),
                    location,
                    comments,
                    value: self.bind_value(&referrer, value)?,
                },
            );
        }

        for (name, decl) in &config.resources {
            let node = self.bind_resource(Section::Resources, name, decl, false)?;
            graph.resources.insert(node.id(), node);
        }
        for (name, decl) in &config.data {
            let node = self.bind_resource(Section::Data, name, decl, true)?;
            graph.resources.insert(node.id(), node);
        }

        for (name, call) in &config.modules {
            let referrer = format!("module '{}'", name);
            let (location, comments) = self.header(Section::Modules, name)?;
            let child = self.child(&referrer, name)?;
            for input in call.inputs.keys() {
                if !child.config().variables.contains_key(input) {
                    return Err(self.error(BindErrorKind::UnknownModuleInput {
                        module: name.clone(),
                        input: input.clone(),
                    }));
                }
            }
            graph.modules.insert(
                name.clone(),
                ModuleNode {
                    name: name.clone(),
                    location,
                    comments,
                    source: call.source.clone(),
                    path: child.path().to_vec(),
                    inputs: self.bind_map(&referrer, &call.inputs)?,
                    depends_on: self.bind_depends_on(&referrer, &call.depends_on)?,
                },
            );
        }

        for (name, decl) in &config.outputs {
            let referrer = format!("output '{}'", name);
            let (location, comments) = self.header(Section::Outputs, name)?;
            graph.outputs.insert(
                name.clone(),
                OutputNode {
                    name: name.clone(),
                    location,
                    comments,
                    value: self.bind_value(&referrer, &decl.value)?,
                    description: decl.description.clone(),
                    sensitive: decl.sensitive,
                },
            );
        }

        graph.order = order::dependency_order(&graph).map_err(|cycle| {
            self.error(BindErrorKind::Cycle {
                nodes: cycle.iter().map(ToString::to_string).collect(),
            })
        })?;

        tracing::debug!(
            module = %self.module,
            resources = graph.resources.len(),
            modules = graph.modules.len(),
            "bound module graph"
        );
        Ok(graph)
    }

    fn bind_resource(
        &self,
        section: Section,
        name: &str,
        decl: &ResourceDecl,
        is_data_source: bool,
    ) -> Result<ResourceNode, BindError> {
        let id = resource_id(&decl.resource_type, name, is_data_source);
        let referrer = format!("resource '{}'", id);
        let (location, comments) = self.header(section, name)?;

        let provider_name = decl.provider_name();
        let provider = if self.provider_declared(&provider_name) {
            ProviderRef::Declared(provider_name)
        } else if self.opts.allow_missing_providers {
            self.warn(&format!(
                "{} references undeclared provider '{}'; using an unknown provider",
                referrer, provider_name
            ));
            ProviderRef::Unknown(provider_name)
        } else {
            return Err(self.error(BindErrorKind::UnknownProvider {
                referrer,
                provider: provider_name,
            }));
        };

        Ok(ResourceNode {
            name: name.to_string(),
            location,
            comments,
            kind: decl.resource_type.clone(),
            provider_info: self.provider_info(provider.plugin()),
            provider,
            properties: self.bind_map(&referrer, &decl.properties)?,
            depends_on: self.bind_depends_on(&referrer, &decl.depends_on)?,
            is_data_source,
        })
    }

    /// Provider declared here or in an ancestor module. Only the local
    /// declarations of the root count, since it has no ancestors.
    fn provider_declared(&self, name: &str) -> bool {
        self.tree.config().providers.contains_key(name)
            || self.tree.inherited_providers().iter().any(|p| p == name)
    }

    fn provider_info(&self, plugin: &str) -> Option<Arc<ProviderInfo>> {
        let source = self.opts.provider_info.as_ref()?;
        self.provider_infos
            .borrow_mut()
            .entry(plugin.to_string())
            .or_insert_with(|| source.provider_info(plugin))
            .clone()
    }

    /// Location and comments of a declaration.
    fn header(
        &self,
        section: Section,
        name: &str,
    ) -> Result<(Location, Option<Comments>), BindError> {
        let node = format!("{} '{}'", section, name);
        let result = match self.tree.source_of(section, name) {
            Some(file) => file.locate(section, name),
            None => Err(format!("no source file recorded for {}", node)),
        };
        match result {
            Ok(found) => Ok(found),
            Err(reason) if self.opts.allow_missing_comments => {
                self.warn(&format!("cannot extract comments for {}: {}", node, reason));
                Ok((Location::unknown(), None))
            }
            Err(reason) => Err(self.error(BindErrorKind::MissingComments { node, reason })),
        }
    }

    fn child(&self, referrer: &str, name: &str) -> Result<&ModuleTree, BindError> {
        self.tree.child(name).ok_or_else(|| {
            self.error(BindErrorKind::UnknownModule {
                referrer: referrer.to_string(),
                name: name.to_string(),
            })
        })
    }

    fn bind_map(
        &self,
        referrer: &str,
        map: &IndexMap<String, Value>,
    ) -> Result<IndexMap<String, BoundNode>, BindError> {
        map.iter()
            .map(|(k, v)| Ok((k.clone(), self.bind_value(referrer, v)?)))
            .collect()
    }

    fn bind_value(&self, referrer: &str, value: &Value) -> Result<BoundNode, BindError> {
        Ok(match value {
            Value::Null => BoundNode::Literal(Literal::Null),
            Value::Bool(b) => BoundNode::Literal(Literal::Bool(*b)),
            Value::Number(n) => BoundNode::Literal(Literal::Number(n.to_string())),
            Value::String(s) => self.bind_string(referrer, s)?,
            Value::Sequence(items) => BoundNode::List(
                items
                    .iter()
                    .map(|v| self.bind_value(referrer, v))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Mapping(entries) => BoundNode::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((yaml_value_to_string(k), self.bind_value(referrer, v)?)))
                    .collect::<Result<_, BindError>>()?,
            ),
            Value::Tagged(tagged) => self.bind_value(referrer, &tagged.value)?,
        })
    }

    fn bind_string(&self, referrer: &str, s: &str) -> Result<BoundNode, BindError> {
        let parts = template::parse_template(s).map_err(|message| {
            self.error(BindErrorKind::InvalidExpression {
                referrer: referrer.to_string(),
                message,
            })
        })?;

        match parts.as_slice() {
            [] => Ok(BoundNode::string("")),
            [TemplatePart::Literal(text)] => Ok(BoundNode::string(text.as_str())),
            [TemplatePart::Traversal(t)] => Ok(BoundNode::Reference(self.resolve(referrer, t)?)),
            _ => {
                let mut bound = Vec::with_capacity(parts.len());
                for part in &parts {
                    bound.push(match part {
                        TemplatePart::Literal(text) => BoundNode::string(text.as_str()),
                        TemplatePart::Traversal(t) => BoundNode::Reference(self.resolve(referrer, t)?),
                    });
                }
                Ok(BoundNode::Interpolation(bound))
            }
        }
    }

    /// Bind a variable default, which must be a literal.
    fn bind_literal(&self, variable: &str, value: &Value) -> Result<BoundNode, BindError> {
        let bound = self.bind_value(&format!("variable '{}'", variable), value);
        match bound {
            Ok(node) if node.dependencies().is_empty() && !has_placeholder(&node) => Ok(node),
            // A failed lookup still means the default referenced something.
            Ok(_) | Err(BindError { kind: BindErrorKind::UnknownVariable { .. }, .. }) => {
                Err(self.error(BindErrorKind::ReferenceInDefault {
                    variable: variable.to_string(),
                }))
            }
            Err(e) => Err(e),
        }
    }

    fn resolve(&self, referrer: &str, traversal: &Traversal) -> Result<Reference, BindError> {
        let segs = &traversal.segments;
        let invalid = |message: String| {
            self.error(BindErrorKind::InvalidExpression {
                referrer: referrer.to_string(),
                message,
            })
        };
        let config = self.tree.config();

        let min_len = match segs[0].as_str() {
            "var" | "local" => 2,
            "module" | "data" => 3,
            _ => 2,
        };
        if segs.len() < min_len {
            return Err(invalid(format!("incomplete reference '{}'", traversal)));
        }

        let (target, rest) = match segs[0].as_str() {
            "var" => {
                let name = &segs[1];
                let target = if config.variables.contains_key(name) {
                    RefTarget::Variable(name.clone())
                } else if self.opts.allow_missing_variables {
                    self.warn(&format!(
                        "{} references undeclared variable '{}'; binding a placeholder",
                        referrer, name
                    ));
                    RefTarget::MissingVariable(name.clone())
                } else {
                    return Err(self.error(BindErrorKind::UnknownVariable {
                        referrer: referrer.to_string(),
                        name: name.clone(),
                    }));
                };
                (target, &segs[2..])
            }
            "local" => {
                let name = &segs[1];
                if !config.locals.contains_key(name) {
                    return Err(self.error(BindErrorKind::UnknownLocal {
                        referrer: referrer.to_string(),
                        name: name.clone(),
                    }));
                }
                (RefTarget::Local(name.clone()), &segs[2..])
            }
            "module" => {
                let (module, output) = (&segs[1], &segs[2]);
                if !config.modules.contains_key(module) {
                    return Err(self.error(BindErrorKind::UnknownModule {
                        referrer: referrer.to_string(),
                        name: module.clone(),
                    }));
                }
                let child = self.child(referrer, module)?;
                if !child.config().outputs.contains_key(output) {
                    return Err(self.error(BindErrorKind::UnknownModuleOutput {
                        referrer: referrer.to_string(),
                        module: module.clone(),
                        output: output.clone(),
                    }));
                }
                (
                    RefTarget::ModuleOutput {
                        module: module.clone(),
                        output: output.clone(),
                    },
                    &segs[3..],
                )
            }
            "data" => {
                let (kind, name) = (&segs[1], &segs[2]);
                let found = config.data.get(name).is_some_and(|d| &d.resource_type == kind);
                let id = resource_id(kind, name, true);
                if !found {
                    return Err(self.error(BindErrorKind::UnknownResource {
                        referrer: referrer.to_string(),
                        target: id,
                    }));
                }
                (RefTarget::DataSource(id), &segs[3..])
            }
            kind => {
                let name = &segs[1];
                let found = config
                    .resources
                    .get(name)
                    .is_some_and(|r| r.resource_type == kind);
                let id = resource_id(kind, name, false);
                if !found {
                    return Err(self.error(BindErrorKind::UnknownResource {
                        referrer: referrer.to_string(),
                        target: id,
                    }));
                }
                (RefTarget::Resource(id), &segs[2..])
            }
        };

        Ok(Reference {
            target,
            attributes: rest.to_vec(),
        })
    }

    /// Resolve explicit `depends_on` entries to node keys.
    fn bind_depends_on(&self, referrer: &str, entries: &[String]) -> Result<Vec<NodeKey>, BindError> {
        let mut keys = Vec::with_capacity(entries.len());
        for entry in entries {
            let traversal = template::parse_traversal(entry).map_err(|message| {
                self.error(BindErrorKind::InvalidExpression {
                    referrer: referrer.to_string(),
                    message,
                })
            })?;
            let key = match traversal.segments.as_slice() {
                [m, name] if m == "module" => {
                    self.child(referrer, name)?;
                    NodeKey::Module(name.clone())
                }
                [_, _] | [_, _, _] => {
                    let reference = self.resolve(referrer, &traversal)?;
                    match reference.target {
                        RefTarget::Resource(id) | RefTarget::DataSource(id)
                            if reference.attributes.is_empty() =>
                        {
                            NodeKey::Resource(id)
                        }
                        _ => {
                            return Err(self.error(BindErrorKind::InvalidExpression {
                                referrer: referrer.to_string(),
                                message: format!("depends_on entry '{}' is not a resource or module", entry),
                            }))
                        }
                    }
                }
                _ => {
                    return Err(self.error(BindErrorKind::InvalidExpression {
                        referrer: referrer.to_string(),
                        message: format!("depends_on entry '{}' is not a resource or module", entry),
                    }))
                }
            };
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    fn error(&self, kind: BindErrorKind) -> BindError {
        BindError::new(&self.module, kind)
    }

    /// Report a tolerated binding problem to the diagnostic sink.
    fn warn(&self, message: &str) {
        match &self.opts.logger {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, || {
                tracing::warn!(module = %self.module, "{}", message)
            }),
            None => tracing::warn!(module = %self.module, "{}", message),
        }
    }
}

fn has_placeholder(node: &BoundNode) -> bool {
    let mut found = false;
    node.visit_references(&mut |r| {
        if matches!(r.target, RefTarget::MissingVariable(_)) {
            found = true;
        }
    });
    found
}
