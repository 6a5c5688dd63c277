//! CV-017: TypeScript backend.
//!
//! Emits one Pulumi TypeScript program. Child module graphs become functions
//! taking a name prefix and an args object and returning their outputs; the
//! root graph becomes top-level statements reading variables from stack
//! configuration.

use super::naming::{camel_case, data_function, is_identifier, resource_class, Names};
use super::{
    deferred_locals, graph_for, indent_continuation, inherited_provider_dropped, module_functions,
    provider_packages, uses_missing_variables, CodeWriter, Generator,
};
use crate::error::GenerateError;
use crate::il::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::io::Write;

const INDENT: &str = "    ";

const RESERVED: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "undefined", "var", "void", "while", "with", "yield",
    "pulumi", "config", "name", "args",
];

/// TypeScript backend options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeScriptOptions {
    /// Call data sources synchronously instead of wrapping them in
    /// `pulumi.output`
    pub use_prompt_data_sources: bool,
}

pub struct TypeScriptGenerator {
    project: String,
    sdk_version: String,
    options: TypeScriptOptions,
    writer: Box<dyn Write>,
}

impl TypeScriptGenerator {
    pub fn new(
        project: &str,
        sdk_version: &str,
        options: TypeScriptOptions,
        writer: Box<dyn Write>,
    ) -> Self {
        Self {
            project: project.to_string(),
            sdk_version: sdk_version.to_string(),
            options,
            writer,
        }
    }

    /// Render the whole program.
    pub fn render(&self, forest: &[Graph]) -> Result<String, GenerateError> {
        let mut w = CodeWriter::new(INDENT);
        w.line(&format!("// Generated by iacgen for project \"{}\".", self.project));
        if !self.sdk_version.is_empty() {
            w.line(&format!("// Target SDK version: {}", self.sdk_version));
        }
        w.line("import * as pulumi from \"@pulumi/pulumi\";");

        let packages = provider_packages(forest);
        for pkg in &packages {
            w.line(&format!("import * as {} from \"@pulumi/{}\";", camel_case(pkg), pkg));
        }

        let mut reserved: Vec<String> = RESERVED.iter().map(|s| s.to_string()).collect();
        reserved.extend(packages.iter().map(|p| camel_case(p)));
        let functions = module_functions(forest, &reserved, function_name);
        reserved.extend(functions.values().cloned());

        for graph in forest {
            w.blank();
            let emitter = GraphEmitter::new(forest, graph, &self.options, &functions, &reserved);
            emitter.emit(&mut w)?;
        }
        Ok(w.finish())
    }
}

impl Generator for TypeScriptGenerator {
    fn generate(&mut self, forest: &[Graph]) -> Result<(), GenerateError> {
        let text = self.render(forest)?;
        self.writer.write_all(text.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}

fn function_name(path: &[String]) -> String {
    format!("{}Module", camel_case(&path.join("_")))
}

fn string_literal(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn object_key(key: &str) -> String {
    if is_identifier(key) {
        key.to_string()
    } else {
        string_literal(key)
    }
}

/// Render `{ key: value, ... }` over several lines.
fn object(entries: impl IntoIterator<Item = (String, String)>) -> String {
    let mut out = String::from("{\n");
    let mut empty = true;
    for (key, value) in entries {
        empty = false;
        out.push_str(&format!(
            "{}{}: {},\n",
            INDENT,
            key,
            indent_continuation(&value, INDENT)
        ));
    }
    if empty {
        return "{}".to_string();
    }
    out.push('}');
    out
}

struct GraphEmitter<'a> {
    forest: &'a [Graph],
    graph: &'a Graph,
    options: &'a TypeScriptOptions,
    functions: &'a FxHashMap<Vec<String>, String>,
    names: Names,
    deferred: FxHashSet<String>,
}

impl<'a> GraphEmitter<'a> {
    fn new(
        forest: &'a [Graph],
        graph: &'a Graph,
        options: &'a TypeScriptOptions,
        functions: &'a FxHashMap<Vec<String>, String>,
        reserved: &[String],
    ) -> Self {
        let mut names = Names::new(reserved.iter().map(String::as_str));
        if graph.is_root {
            // Exported names are visible to stack consumers; claim them first.
            for name in graph.outputs.keys() {
                names.assign(NodeKey::Output(name.clone()), &camel_case(name));
            }
        }
        for key in graph.node_keys() {
            let base = match &key {
                NodeKey::Variable(n) | NodeKey::Local(n) | NodeKey::Module(n) => camel_case(n),
                NodeKey::Provider(n) => format!("{}Provider", camel_case(n)),
                NodeKey::Resource(id) => match graph.resources.get(id) {
                    Some(r) => camel_case(&r.name),
                    None => camel_case(id),
                },
                NodeKey::Output(_) => continue,
            };
            names.assign(key, &base);
        }

        let is_root = graph.is_root;
        let prompt = options.use_prompt_data_sources;
        let deferred = deferred_locals(graph, |t| deferred_target(t, is_root, prompt));
        Self {
            forest,
            graph,
            options,
            functions,
            names,
            deferred,
        }
    }

    fn emit(&self, w: &mut CodeWriter) -> Result<(), GenerateError> {
        if self.graph.is_root {
            if !self.graph.variables.is_empty() || uses_missing_variables(self.graph) {
                w.line("const config = new pulumi.Config();");
            }
            self.emit_body(w, &mut Vec::new())
        } else {
            let params = self
                .graph
                .variables
                .values()
                .map(|v| {
                    let optional = if v.default.is_some() { "?" } else { "" };
                    format!("{}{}: pulumi.Input<any>", camel_case(&v.name), optional)
                })
                .collect::<Vec<_>>();
            let args_type = if params.is_empty() {
                "{}".to_string()
            } else {
                format!("{{ {} }}", params.join(", "))
            };
            w.line(&format!(
                "function {}(name: string, args: {}) {{",
                self.function(&self.graph.path)?,
                args_type
            ));
            w.indent();
            let mut outputs = Vec::new();
            self.emit_body(w, &mut outputs)?;
            w.blank();
            w.line(&format!("return {};", object(outputs)));
            w.dedent();
            w.line("}");
            Ok(())
        }
    }

    /// Emit every node in dependency order. Outputs of child graphs are
    /// collected into `outputs` instead of being emitted.
    fn emit_body(
        &self,
        w: &mut CodeWriter,
        outputs: &mut Vec<(String, String)>,
    ) -> Result<(), GenerateError> {
        for key in &self.graph.order {
            match key {
                NodeKey::Variable(n) => {
                    if let Some(v) = self.graph.variables.get(n) {
                        w.statement("//", v.comments(), &self.variable(key, v));
                    }
                }
                NodeKey::Local(n) => {
                    if let Some(l) = self.graph.locals.get(n) {
                        let text = format!("const {} = {};", self.ident(key), self.expr(&l.value));
                        w.statement("//", l.comments(), &text);
                    }
                }
                NodeKey::Provider(n) => {
                    if let Some(p) = self.graph.providers.get(n) {
                        w.blank();
                        w.statement("//", p.comments(), &self.provider(key, p));
                    }
                }
                NodeKey::Resource(id) => {
                    if let Some(r) = self.graph.resources.get(id) {
                        w.blank();
                        w.statement("//", r.comments(), &self.resource(key, r)?);
                    }
                }
                NodeKey::Module(n) => {
                    if let Some(m) = self.graph.modules.get(n) {
                        w.blank();
                        w.statement("//", m.comments(), &self.module_call(key, m)?);
                    }
                }
                NodeKey::Output(n) => {
                    if let Some(o) = self.graph.outputs.get(n) {
                        let mut value = self.expr(&o.value);
                        if o.sensitive {
                            value = format!("pulumi.secret({})", value);
                        }
                        if self.graph.is_root {
                            w.blank();
                            let text = format!("export const {} = {};", self.ident(key), value);
                            w.statement("//", o.comments(), &text);
                        } else {
                            outputs.push((object_key(&camel_case(n)), value));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn variable(&self, key: &NodeKey, v: &VariableNode) -> String {
        let ident = self.ident(key);
        if !self.graph.is_root {
            let read = format!("args.{}", camel_case(&v.name));
            return match &v.default {
                Some(d) => format!("const {} = {} ?? {};", ident, read, self.expr(d)),
                None => format!("const {} = {};", ident, read),
            };
        }
        let (get, require) = match v.type_name.as_deref() {
            Some("number") => ("getNumber", "requireNumber"),
            Some("bool") => ("getBoolean", "requireBoolean"),
            Some("list") | Some("map") | Some("object") => ("getObject<any>", "requireObject<any>"),
            _ => ("get", "require"),
        };
        match &v.default {
            Some(d) => format!(
                "const {} = config.{}({}) ?? {};",
                ident,
                get,
                string_literal(&v.name),
                self.expr(d)
            ),
            None => format!(
                "const {} = config.{}({});",
                ident,
                require,
                string_literal(&v.name)
            ),
        }
    }

    fn provider(&self, key: &NodeKey, p: &ProviderNode) -> String {
        let args = object(
            p.properties
                .iter()
                .map(|(k, v)| (object_key(&camel_case(k)), self.expr(v))),
        );
        format!(
            "const {} = new {}.Provider({}, {});",
            self.ident(key),
            camel_case(&p.plugin),
            self.logical_name(&p.name),
            args
        )
    }

    fn resource(&self, key: &NodeKey, r: &ResourceNode) -> Result<String, GenerateError> {
        let schemas = r.schemas();
        let args = object(r.properties.iter().map(|(k, v)| {
            let name = schemas
                .property_schemas(k)
                .and_then(|s| s.name.clone())
                .unwrap_or_else(|| camel_case(k));
            (object_key(&name), self.expr(v))
        }));
        let pkg = camel_case(r.provider.plugin());
        let invalid = || GenerateError::InvalidResourceType {
            resource: r.id(),
            kind: r.kind.clone(),
        };

        let mut resource_opts = Vec::new();
        if let Some(provider) = self.provider_ident(&r.provider) {
            resource_opts.push(format!("provider: {}", provider));
        }

        if r.is_data_source {
            let function = data_function(&r.kind, schemas.token()).ok_or_else(invalid)?;
            let call = if self.options.use_prompt_data_sources {
                let invoke_opts = if resource_opts.is_empty() {
                    String::new()
                } else {
                    format!(", {{ {} }}", resource_opts.join(", "))
                };
                format!("{}.{}({}{})", pkg, function.qualified(), args, invoke_opts)
            } else {
                resource_opts.push("async: true".to_string());
                format!(
                    "pulumi.output({}.{}({}, {{ {} }}))",
                    pkg,
                    function.qualified(),
                    args,
                    resource_opts.join(", ")
                )
            };
            return Ok(format!("const {} = {};", self.ident(key), call));
        }

        let class = resource_class(&r.kind, schemas.token()).ok_or_else(invalid)?;
        let depends_on: Vec<String> = r
            .depends_on
            .iter()
            .filter(|k| matches!(k, NodeKey::Resource(_)))
            .map(|k| self.ident(k))
            .collect();
        if !depends_on.is_empty() {
            resource_opts.push(format!("dependsOn: [{}]", depends_on.join(", ")));
        }
        let opts = if resource_opts.is_empty() {
            String::new()
        } else {
            format!(", {{ {} }}", resource_opts.join(", "))
        };
        Ok(format!(
            "const {} = new {}.{}({}, {}{});",
            self.ident(key),
            pkg,
            class.qualified(),
            self.logical_name(&r.name),
            args,
            opts
        ))
    }

    fn module_call(&self, key: &NodeKey, m: &ModuleNode) -> Result<String, GenerateError> {
        if graph_for(self.forest, &m.path).is_none() {
            return Err(GenerateError::MissingModule {
                module: module_display_name(&m.path),
            });
        }
        let inputs = object(
            m.inputs
                .iter()
                .map(|(k, v)| (object_key(&camel_case(k)), self.expr(v))),
        );
        Ok(format!(
            "const {} = {}({}, {});",
            self.ident(key),
            self.function(&m.path)?,
            self.logical_name(&m.name),
            inputs
        ))
    }

    /// Variable of a provider configured in this graph. Inherited and
    /// unknown providers fall back to the default provider.
    fn provider_ident(&self, provider: &ProviderRef) -> Option<String> {
        match provider {
            ProviderRef::Declared(p) if self.graph.providers.contains_key(p) => {
                Some(self.ident(&NodeKey::Provider(p.clone())))
            }
            ProviderRef::Declared(p) => {
                inherited_provider_dropped(self.forest, self.graph, p);
                None
            }
            ProviderRef::Unknown(_) => None,
        }
    }

    /// Function generated for the child graph at `path`.
    fn function(&self, path: &[String]) -> Result<&str, GenerateError> {
        self.functions
            .get(path)
            .map(String::as_str)
            .ok_or_else(|| GenerateError::MissingModule {
                module: module_display_name(path),
            })
    }

    fn logical_name(&self, name: &str) -> String {
        if self.graph.is_root {
            string_literal(name)
        } else {
            format!("`${{name}}-{}`", escape_template(name))
        }
    }

    fn ident(&self, key: &NodeKey) -> String {
        self.names
            .get(key)
            .map(str::to_string)
            .unwrap_or_else(|| camel_case(&key.to_string()))
    }

    fn expr(&self, node: &BoundNode) -> String {
        match node {
            BoundNode::Literal(Literal::Null) => "undefined".to_string(),
            BoundNode::Literal(Literal::Bool(b)) => b.to_string(),
            BoundNode::Literal(Literal::Number(n)) => n.clone(),
            BoundNode::Literal(Literal::String(s)) => string_literal(s),
            BoundNode::List(items) => {
                let rendered: Vec<String> = items.iter().map(|i| self.expr(i)).collect();
                if rendered.iter().any(|r| r.contains('\n')) {
                    let mut out = String::from("[\n");
                    for r in rendered {
                        out.push_str(&format!("{}{},\n", INDENT, indent_continuation(&r, INDENT)));
                    }
                    out.push(']');
                    out
                } else {
                    format!("[{}]", rendered.join(", "))
                }
            }
            BoundNode::Map(entries) => {
                object(entries.iter().map(|(k, v)| (object_key(k), self.expr(v))))
            }
            BoundNode::Interpolation(parts) => {
                let mut body = String::new();
                for part in parts {
                    match part {
                        BoundNode::Literal(Literal::String(s)) => body.push_str(&escape_template(s)),
                        other => body.push_str(&format!("${{{}}}", self.expr(other))),
                    }
                }
                if self.is_deferred(node) {
                    format!("pulumi.interpolate`{}`", body)
                } else {
                    format!("`{}`", body)
                }
            }
            BoundNode::Reference(r) => self.reference(r),
        }
    }

    fn reference(&self, r: &Reference) -> String {
        let mut out = match &r.target {
            RefTarget::Variable(n) => self.ident(&NodeKey::Variable(n.clone())),
            RefTarget::Local(n) => self.ident(&NodeKey::Local(n.clone())),
            RefTarget::Resource(id) | RefTarget::DataSource(id) => {
                self.ident(&NodeKey::Resource(id.clone()))
            }
            RefTarget::ModuleOutput { module, output } => format!(
                "{}.{}",
                self.ident(&NodeKey::Module(module.clone())),
                camel_case(output)
            ),
            RefTarget::MissingVariable(n) if self.graph.is_root => {
                format!("config.require({})", string_literal(n))
            }
            RefTarget::MissingVariable(n) => format!("args.{}", camel_case(n)),
        };
        for attr in &r.attributes {
            if attr.chars().all(|c| c.is_ascii_digit()) {
                out.push_str(&format!("[{}]", attr));
            } else {
                out.push('.');
                out.push_str(&camel_case(attr));
            }
        }
        out
    }

    fn is_deferred(&self, node: &BoundNode) -> bool {
        let mut found = false;
        node.visit_references(&mut |r| {
            found |= match &r.target {
                RefTarget::Local(n) => self.deferred.contains(n),
                target => deferred_target(
                    target,
                    self.graph.is_root,
                    self.options.use_prompt_data_sources,
                ),
            };
        });
        found
    }
}

/// Targets whose values are only known during deployment.
fn deferred_target(target: &RefTarget, is_root: bool, prompt_data: bool) -> bool {
    match target {
        RefTarget::Resource(_) | RefTarget::ModuleOutput { .. } => true,
        RefTarget::DataSource(_) => !prompt_data,
        // Child module arguments may carry outputs of the caller.
        RefTarget::Variable(_) | RefTarget::MissingVariable(_) => !is_root,
        RefTarget::Local(_) => false,
    }
}

fn escape_template(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${")
}
