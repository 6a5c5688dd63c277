//! CV-018: Python backend.
//!
//! Emits one Pulumi Python program. Child module graphs become functions
//! returning a dict of outputs; the root graph becomes top-level statements.

use super::naming::{data_function, resource_class, snake_case, Names};
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
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield", "pulumi", "config", "name", "args",
];

/// Python backend options. The backend has no knobs yet; the type exists so
/// every target carries its own payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PythonOptions {}

pub struct PythonGenerator {
    project: String,
    sdk_version: String,
    writer: Box<dyn Write>,
}

impl PythonGenerator {
    pub fn new(
        project: &str,
        sdk_version: &str,
        _options: PythonOptions,
        writer: Box<dyn Write>,
    ) -> Self {
        Self {
            project: project.to_string(),
            sdk_version: sdk_version.to_string(),
            writer,
        }
    }

    pub fn render(&self, forest: &[Graph]) -> Result<String, GenerateError> {
        let mut w = CodeWriter::new(INDENT);
        w.line(&format!("# Generated by iacgen for project \"{}\".", self.project));
        if !self.sdk_version.is_empty() {
            w.line(&format!("# Target SDK version: {}", self.sdk_version));
        }
        w.line("import pulumi");

        let packages = provider_packages(forest);
        for pkg in &packages {
            let module = snake_case(pkg);
            w.line(&format!("import pulumi_{} as {}", module, module));
        }

        let mut reserved: Vec<String> = RESERVED.iter().map(|s| s.to_string()).collect();
        reserved.extend(packages.iter().map(|p| snake_case(p)));
        let functions = module_functions(forest, &reserved, function_name);
        reserved.extend(functions.values().cloned());

        for graph in forest {
            w.blank();
            GraphEmitter::new(forest, graph, &functions, &reserved).emit(&mut w)?;
        }
        Ok(w.finish())
    }
}

impl Generator for PythonGenerator {
    fn generate(&mut self, forest: &[Graph]) -> Result<(), GenerateError> {
        let text = self.render(forest)?;
        self.writer.write_all(text.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}

fn function_name(path: &[String]) -> String {
    format!("{}_module", snake_case(&path.join("_")))
}

fn string_literal(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Render a multi-line call or collection body. `open`/`close` delimit it.
fn block(open: &str, items: Vec<String>, close: &str) -> String {
    if items.is_empty() {
        return format!("{}{}", open, close);
    }
    let mut out = format!("{}\n", open);
    for item in items {
        out.push_str(&format!("{}{},\n", INDENT, indent_continuation(&item, INDENT)));
    }
    out.push_str(close);
    out
}

struct GraphEmitter<'a> {
    forest: &'a [Graph],
    graph: &'a Graph,
    functions: &'a FxHashMap<Vec<String>, String>,
    names: Names,
    deferred: FxHashSet<String>,
}

impl<'a> GraphEmitter<'a> {
    fn new(
        forest: &'a [Graph],
        graph: &'a Graph,
        functions: &'a FxHashMap<Vec<String>, String>,
        reserved: &[String],
    ) -> Self {
        let mut names = Names::new(reserved.iter().map(String::as_str));
        for key in graph.node_keys() {
            let base = match &key {
                NodeKey::Variable(n) | NodeKey::Local(n) | NodeKey::Module(n) => snake_case(n),
                NodeKey::Provider(n) => format!("{}_provider", snake_case(n)),
                NodeKey::Resource(id) => match graph.resources.get(id) {
                    Some(r) => snake_case(&r.name),
                    None => snake_case(id),
                },
                NodeKey::Output(_) => continue,
            };
            names.assign(key, &base);
        }
        let is_root = graph.is_root;
        let deferred = deferred_locals(graph, |t| deferred_target(t, is_root));
        Self {
            forest,
            graph,
            functions,
            names,
            deferred,
        }
    }

    fn emit(&self, w: &mut CodeWriter) -> Result<(), GenerateError> {
        if self.graph.is_root {
            if !self.graph.variables.is_empty() || uses_missing_variables(self.graph) {
                w.line("config = pulumi.Config()");
            }
            return self.emit_body(w, &mut Vec::new());
        }

        w.line(&format!("def {}(name, args):", self.function(&self.graph.path)?));
        w.indent();
        let mut outputs = Vec::new();
        self.emit_body(w, &mut outputs)?;
        w.line(&format!("return {}", block("{", outputs, "}")));
        w.dedent();
        Ok(())
    }

    fn emit_body(&self, w: &mut CodeWriter, outputs: &mut Vec<String>) -> Result<(), GenerateError> {
        for key in &self.graph.order {
            match key {
                NodeKey::Variable(n) => {
                    if let Some(v) = self.graph.variables.get(n) {
                        w.statement("#", v.comments(), &self.variable(key, v));
                    }
                }
                NodeKey::Local(n) => {
                    if let Some(l) = self.graph.locals.get(n) {
                        let text = format!("{} = {}", self.ident(key), self.expr(&l.value));
                        w.statement("#", l.comments(), &text);
                    }
                }
                NodeKey::Provider(n) => {
                    if let Some(p) = self.graph.providers.get(n) {
                        w.statement("#", p.comments(), &self.provider(key, p));
                    }
                }
                NodeKey::Resource(id) => {
                    if let Some(r) = self.graph.resources.get(id) {
                        w.statement("#", r.comments(), &self.resource(key, r)?);
                    }
                }
                NodeKey::Module(n) => {
                    if let Some(m) = self.graph.modules.get(n) {
                        w.statement("#", m.comments(), &self.module_call(key, m)?);
                    }
                }
                NodeKey::Output(n) => {
                    if let Some(o) = self.graph.outputs.get(n) {
                        let mut value = self.expr(&o.value);
                        if o.sensitive {
                            value = format!("pulumi.Output.secret({})", value);
                        }
                        if self.graph.is_root {
                            let text = format!("pulumi.export({}, {})", string_literal(n), value);
                            w.statement("#", o.comments(), &text);
                        } else {
                            outputs.push(format!("{}: {}", string_literal(n), value));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn variable(&self, key: &NodeKey, v: &VariableNode) -> String {
        let ident = self.ident(key);
        let quoted = string_literal(&v.name);
        if !self.graph.is_root {
            return match &v.default {
                Some(d) => format!("{} = args.get({}, {})", ident, quoted, self.expr(d)),
                None => format!("{} = args[{}]", ident, quoted),
            };
        }
        let (get, require) = match v.type_name.as_deref() {
            Some("number") => ("get_float", "require_float"),
            Some("bool") => ("get_bool", "require_bool"),
            Some("list") | Some("map") | Some("object") => ("get_object", "require_object"),
            _ => ("get", "require"),
        };
        match &v.default {
            Some(d) => {
                let default = self.expr(d);
                format!("{} = config.{}({})\nif {} is None:\n{}{} = {}", ident, get, quoted, ident, INDENT, ident, default)
            }
            None => format!("{} = config.{}({})", ident, require, quoted),
        }
    }

    fn provider(&self, key: &NodeKey, p: &ProviderNode) -> String {
        let mut items = vec![self.logical_name(&p.name)];
        items.extend(
            p.properties
                .iter()
                .map(|(k, v)| format!("{}={}", snake_case(k), self.expr(v))),
        );
        format!(
            "{} = {}",
            self.ident(key),
            block(&format!("{}.Provider(", snake_case(&p.plugin)), items, ")")
        )
    }

    fn resource(&self, key: &NodeKey, r: &ResourceNode) -> Result<String, GenerateError> {
        let schemas = r.schemas();
        let args: Vec<String> = r
            .properties
            .iter()
            .map(|(k, v)| {
                let name = schemas
                    .property_schemas(k)
                    .and_then(|s| s.name.as_deref())
                    .map(snake_case)
                    .unwrap_or_else(|| snake_case(k));
                format!("{}={}", name, self.expr(v))
            })
            .collect();
        let pkg = snake_case(r.provider.plugin());
        let invalid = || GenerateError::InvalidResourceType {
            resource: r.id(),
            kind: r.kind.clone(),
        };
        let provider = self.provider_ident(&r.provider);

        if r.is_data_source {
            let function = data_function(&r.kind, schemas.token()).ok_or_else(invalid)?;
            let member = snake_case(&function.member);
            let qualified = match &function.module {
                Some(m) => format!("{}.{}", m, member),
                None => member,
            };
            let mut items = args;
            if let Some(p) = provider {
                items.push(format!("opts=pulumi.InvokeOptions(provider={})", p));
            }
            return Ok(format!(
                "{} = {}",
                self.ident(key),
                block(&format!("{}.{}(", pkg, qualified), items, ")")
            ));
        }

        let class = resource_class(&r.kind, schemas.token()).ok_or_else(invalid)?;
        let mut opts = Vec::new();
        if let Some(p) = provider {
            opts.push(format!("provider={}", p));
        }
        let depends_on: Vec<String> = r
            .depends_on
            .iter()
            .filter(|k| matches!(k, NodeKey::Resource(_)))
            .map(|k| self.ident(k))
            .collect();
        if !depends_on.is_empty() {
            opts.push(format!("depends_on=[{}]", depends_on.join(", ")));
        }

        let mut items = vec![self.logical_name(&r.name)];
        items.extend(args);
        if !opts.is_empty() {
            items.push(format!("opts=pulumi.ResourceOptions({})", opts.join(", ")));
        }
        Ok(format!(
            "{} = {}",
            self.ident(key),
            block(&format!("{}.{}(", pkg, class.qualified()), items, ")")
        ))
    }

    fn module_call(&self, key: &NodeKey, m: &ModuleNode) -> Result<String, GenerateError> {
        if graph_for(self.forest, &m.path).is_none() {
            return Err(GenerateError::MissingModule {
                module: module_display_name(&m.path),
            });
        }
        let inputs = m
            .inputs
            .iter()
            .map(|(k, v)| format!("{}: {}", string_literal(k), self.expr(v)))
            .collect();
        Ok(format!(
            "{} = {}({}, {})",
            self.ident(key),
            self.function(&m.path)?,
            self.logical_name(&m.name),
            block("{", inputs, "}")
        ))
    }

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
            format!("f\"{{name}}-{}\"", escape_fstring(name))
        }
    }

    fn ident(&self, key: &NodeKey) -> String {
        self.names
            .get(key)
            .map(str::to_string)
            .unwrap_or_else(|| snake_case(&key.to_string()))
    }

    fn expr(&self, node: &BoundNode) -> String {
        match node {
            BoundNode::Literal(Literal::Null) => "None".to_string(),
            BoundNode::Literal(Literal::Bool(true)) => "True".to_string(),
            BoundNode::Literal(Literal::Bool(false)) => "False".to_string(),
            BoundNode::Literal(Literal::Number(n)) => n.clone(),
            BoundNode::Literal(Literal::String(s)) => string_literal(s),
            BoundNode::List(items) => {
                let rendered: Vec<String> = items.iter().map(|i| self.expr(i)).collect();
                if rendered.iter().any(|r| r.contains('\n')) {
                    block("[", rendered, "]")
                } else {
                    format!("[{}]", rendered.join(", "))
                }
            }
            BoundNode::Map(entries) => block(
                "{",
                entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", string_literal(k), self.expr(v)))
                    .collect(),
                "}",
            ),
            BoundNode::Interpolation(parts) => {
                if self.is_deferred(node) {
                    let args: Vec<String> = parts.iter().map(|p| self.expr(p)).collect();
                    format!("pulumi.Output.concat({})", args.join(", "))
                } else {
                    let mut body = String::new();
                    for part in parts {
                        match part {
                            BoundNode::Literal(Literal::String(s)) => body.push_str(&escape_fstring(s)),
                            other => body.push_str(&format!("{{{}}}", self.expr(other))),
                        }
                    }
                    format!("f\"{}\"", body)
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
                "{}['{}']",
                self.ident(&NodeKey::Module(module.clone())),
                output
            ),
            RefTarget::MissingVariable(n) if self.graph.is_root => {
                format!("config.require('{}')", n)
            }
            RefTarget::MissingVariable(n) => format!("args['{}']", n),
        };
        for attr in &r.attributes {
            if attr.chars().all(|c| c.is_ascii_digit()) {
                out.push_str(&format!("[{}]", attr));
            } else {
                out.push('.');
                out.push_str(&snake_case(attr));
            }
        }
        out
    }

    fn is_deferred(&self, node: &BoundNode) -> bool {
        let mut found = false;
        node.visit_references(&mut |r| {
            found |= match &r.target {
                RefTarget::Local(n) => self.deferred.contains(n),
                target => deferred_target(target, self.graph.is_root),
            };
        });
        found
    }
}

/// Targets whose values are outputs. Data source invokes return plain
/// results in Python.
fn deferred_target(target: &RefTarget, is_root: bool) -> bool {
    match target {
        RefTarget::Resource(_) | RefTarget::ModuleOutput { .. } => true,
        RefTarget::Variable(_) | RefTarget::MissingVariable(_) => !is_root,
        RefTarget::DataSource(_) | RefTarget::Local(_) => false,
    }
}

/// Escape literal text for a double-quoted f-string.
fn escape_fstring(s: &str) -> String {
    let quoted = string_literal(s);
    quoted[1..quoted.len() - 1].replace('{', "{{").replace('}', "}}")
}
