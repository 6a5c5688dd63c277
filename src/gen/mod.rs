//! CV-015: Generator dispatch.
//!
//! A generator consumes the finished forest (children before parents) and
//! writes one program. The target is a closed set of languages, each with its
//! own options payload.

pub mod naming;
pub mod python;
pub mod typescript;

use crate::convert::Options;
use crate::error::{ConfigError, GenerateError};
use crate::il::{BoundNode, Comments, Graph, NodeKey, RefTarget};
use naming::Names;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

pub use python::{PythonGenerator, PythonOptions};
pub use typescript::{TypeScriptGenerator, TypeScriptOptions};

/// A target-language backend.
pub trait Generator {
    /// Render the forest and write it to the output sink.
    fn generate(&mut self, forest: &[Graph]) -> Result<(), GenerateError>;
}

/// Supported target languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetLanguage {
    TypeScript,
    Python,
}

impl TargetLanguage {
    pub const ALL: [TargetLanguage; 2] = [Self::TypeScript, Self::Python];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::Python => "python",
        }
    }

    /// Comma-separated list of accepted identifiers.
    pub fn valid_names() -> String {
        Self::ALL.map(Self::as_str).join(", ")
    }
}

impl fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetLanguage {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|lang| lang.as_str() == s)
            .ok_or_else(|| ConfigError::InvalidLanguage {
                language: s.to_string(),
            })
    }
}

/// Options payload for the selected target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOptions {
    TypeScript(TypeScriptOptions),
    Python(PythonOptions),
}

impl TargetOptions {
    /// Name of the payload type, used in mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::TypeScript(_) => "TypeScriptOptions",
            Self::Python(_) => "PythonOptions",
        }
    }
}

/// Select the backend for `opts.target_language`. Fails before any output
/// is produced when the language is unknown or the options payload belongs
/// to another target.
pub fn new_generator(
    project: &str,
    opts: &Options,
    writer: Box<dyn Write>,
) -> Result<Box<dyn Generator>, ConfigError> {
    let language: TargetLanguage = opts.target_language.parse()?;
    let mismatch = |actual: &TargetOptions| ConfigError::InvalidTargetOptions {
        target: language.to_string(),
        actual: actual.type_name().to_string(),
    };

    tracing::debug!(%language, project, "creating generator");
    match language {
        TargetLanguage::TypeScript => {
            let ts_opts = match &opts.target_options {
                None => TypeScriptOptions::default(),
                Some(TargetOptions::TypeScript(o)) => o.clone(),
                Some(other) => return Err(mismatch(other)),
            };
            Ok(Box::new(TypeScriptGenerator::new(
                project,
                &opts.target_sdk_version,
                ts_opts,
                writer,
            )))
        }
        TargetLanguage::Python => {
            let py_opts = match &opts.target_options {
                None => PythonOptions::default(),
                Some(TargetOptions::Python(o)) => o.clone(),
                Some(other) => return Err(mismatch(other)),
            };
            Ok(Box::new(PythonGenerator::new(
                project,
                &opts.target_sdk_version,
                py_opts,
                writer,
            )))
        }
    }
}

// ============================================================================
// Shared backend helpers
// ============================================================================

/// Line-oriented output buffer with indentation.
#[derive(Debug)]
pub(crate) struct CodeWriter {
    buf: String,
    depth: usize,
    unit: &'static str,
}

impl CodeWriter {
    pub(crate) fn new(unit: &'static str) -> Self {
        Self {
            buf: String::new(),
            depth: 0,
            unit,
        }
    }

    /// Write `text`, indenting every line it contains.
    pub(crate) fn line(&mut self, text: &str) {
        for l in text.split('\n') {
            if !l.is_empty() {
                for _ in 0..self.depth {
                    self.buf.push_str(self.unit);
                }
                self.buf.push_str(l);
            }
            self.buf.push('\n');
        }
    }

    pub(crate) fn blank(&mut self) {
        if !self.buf.is_empty() && !self.buf.ends_with("\n\n") && !self.buf.ends_with("{\n") {
            self.buf.push('\n');
        }
    }

    pub(crate) fn indent(&mut self) {
        self.depth += 1;
    }

    pub(crate) fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Emit a statement with its comments: leading lines above, the first
    /// trailing comment at the end of the statement's last line.
    pub(crate) fn statement(&mut self, marker: &str, comments: Option<&Comments>, text: &str) {
        match comments {
            Some(c) => {
                for leading in &c.leading {
                    self.line(&format!("{}{}", marker, leading));
                }
                match c.trailing.first() {
                    Some(trailing) => self.line(&format!("{} {}{}", text, marker, trailing)),
                    None => self.line(text),
                }
            }
            None => self.line(text),
        }
    }

    pub(crate) fn finish(self) -> String {
        self.buf
    }
}

/// Indent the continuation lines of a multi-line rendering.
pub(crate) fn indent_continuation(text: &str, unit: &str) -> String {
    text.replace('\n', &format!("\n{}", unit))
}

/// Locals whose value, directly or through other locals, depends on a
/// target for which `deferred` holds.
pub(crate) fn deferred_locals(
    graph: &Graph,
    deferred: impl Fn(&RefTarget) -> bool,
) -> FxHashSet<String> {
    let mut set = FxHashSet::default();
    for key in &graph.order {
        let NodeKey::Local(name) = key else {
            continue;
        };
        let Some(local) = graph.locals.get(name) else {
            continue;
        };
        let mut found = false;
        local.value.visit_references(&mut |r| {
            found |= match &r.target {
                RefTarget::Local(other) => set.contains(other),
                target => deferred(target),
            };
        });
        if found {
            set.insert(name.clone());
        }
    }
    set
}

/// True when any expression of the graph uses an undeclared variable.
pub(crate) fn uses_missing_variables(graph: &Graph) -> bool {
    let mut found = false;
    let mut check = |node: &BoundNode| {
        node.visit_references(&mut |r| {
            found |= matches!(r.target, RefTarget::MissingVariable(_));
        })
    };
    graph.locals.values().for_each(|l| check(&l.value));
    graph.outputs.values().for_each(|o| check(&o.value));
    graph
        .resources
        .values()
        .flat_map(|r| r.properties.values())
        .for_each(&mut check);
    graph
        .providers
        .values()
        .flat_map(|p| p.properties.values())
        .for_each(&mut check);
    graph
        .modules
        .values()
        .flat_map(|m| m.inputs.values())
        .for_each(&mut check);
    found
}

/// Provider packages used anywhere in the forest, sorted.
pub(crate) fn provider_packages(forest: &[Graph]) -> Vec<String> {
    let mut packages: Vec<String> = forest
        .iter()
        .flat_map(|g| {
            g.resources
                .values()
                .map(|r| r.provider.plugin().to_string())
                .chain(g.providers.values().map(|p| p.plugin.clone()))
        })
        .collect();
    packages.sort();
    packages.dedup();
    packages
}

/// Function name of every child graph, unique across the forest and never
/// equal to a `reserved` name. Assigned in forest order.
pub(crate) fn module_functions(
    forest: &[Graph],
    reserved: &[String],
    base: impl Fn(&[String]) -> String,
) -> FxHashMap<Vec<String>, String> {
    let mut names = Names::new(reserved.iter().map(String::as_str));
    forest
        .iter()
        .filter(|g| !g.is_root)
        .map(|g| {
            let key = NodeKey::Module(g.display_name());
            (g.path.clone(), names.assign(key, &base(&g.path)))
        })
        .collect()
}

/// True when `provider`, declared in an ancestor of `graph`, carries an
/// alias or configuration that child functions cannot receive. Logs a
/// warning when it does.
pub(crate) fn inherited_provider_dropped(forest: &[Graph], graph: &Graph, provider: &str) -> bool {
    let declared = (0..graph.path.len())
        .rev()
        .filter_map(|len| graph_for(forest, &graph.path[..len]))
        .find_map(|g| g.providers.get(provider));
    match declared {
        Some(p) if p.alias.is_some() || !p.properties.is_empty() => {
            tracing::warn!(
                module = %graph.display_name(),
                provider,
                "inherited provider configuration is not passed to module functions; using the default provider"
            );
            true
        }
        _ => false,
    }
}

/// The graph generated for the module instance at `path`.
pub(crate) fn graph_for<'a>(forest: &'a [Graph], path: &[String]) -> Option<&'a Graph> {
    forest.iter().find(|g| g.path == path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::{LocalNode, Location, ProviderNode, Reference};

    struct Discard;
    impl Write for Discard {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn opts(language: &str, target_options: Option<TargetOptions>) -> Options {
        Options {
            target_language: language.to_string(),
            target_options,
            ..Default::default()
        }
    }

    #[test]
    fn test_cv015_parse_language() {
        assert_eq!("typescript".parse::<TargetLanguage>().unwrap(), TargetLanguage::TypeScript);
        assert_eq!("python".parse::<TargetLanguage>().unwrap(), TargetLanguage::Python);
        assert_eq!(TargetLanguage::valid_names(), "typescript, python");
    }

    #[test]
    fn test_cv015_invalid_language() {
        let err = new_generator("auto", &opts("ruby", None), Box::new(Discard))
            .err()
            .unwrap();
        assert_eq!(
            err,
            ConfigError::InvalidLanguage {
                language: "ruby".to_string()
            }
        );
        assert!(err.to_string().contains("typescript, python"));
    }

    #[test]
    fn test_cv015_default_options_per_target() {
        assert!(new_generator("auto", &opts("typescript", None), Box::new(Discard)).is_ok());
        assert!(new_generator("auto", &opts("python", None), Box::new(Discard)).is_ok());
        let ts = Some(TargetOptions::TypeScript(TypeScriptOptions {
            use_prompt_data_sources: true,
        }));
        assert!(new_generator("auto", &opts("typescript", ts), Box::new(Discard)).is_ok());
    }

    #[test]
    fn test_cv015_options_shape_mismatch() {
        let py = Some(TargetOptions::Python(PythonOptions::default()));
        let err = new_generator("auto", &opts("typescript", py), Box::new(Discard))
            .err()
            .unwrap();
        assert_eq!(
            err,
            ConfigError::InvalidTargetOptions {
                target: "typescript".to_string(),
                actual: "PythonOptions".to_string()
            }
        );

        let ts = Some(TargetOptions::TypeScript(TypeScriptOptions::default()));
        assert!(new_generator("auto", &opts("python", ts), Box::new(Discard)).is_err());
    }

    #[test]
    fn test_cv015_code_writer() {
        let mut w = CodeWriter::new("    ");
        w.line("function f() {");
        w.indent();
        w.statement(
            "//",
            Some(&Comments {
                leading: vec![" first".to_string(), String::new()],
                trailing: vec![" eol".to_string()],
            }),
            "const a = {\n    b: 1,\n};",
        );
        w.dedent();
        w.line("}");
        assert_eq!(
            w.finish(),
            "function f() {\n    // first\n    //\n    const a = {\n        b: 1,\n    }; // eol\n}\n"
        );
    }

    #[test]
    fn test_cv015_deferred_locals_transitive() {
        let mut g = Graph::default();
        let local = |name: &str, value: BoundNode| LocalNode {
            name: name.to_string(),
            location: Location::unknown(),
            comments: None,
            value,
        };
        let reference = |target| {
            BoundNode::Reference(Reference {
                target,
                attributes: vec![],
            })
        };
        g.locals.insert("a".into(), local("a", reference(RefTarget::Resource("aws_vpc.v".into()))));
        g.locals.insert("b".into(), local("b", reference(RefTarget::Local("a".into()))));
        g.locals.insert("c".into(), local("c", reference(RefTarget::Variable("x".into()))));
        g.order = vec![
            NodeKey::Local("a".into()),
            NodeKey::Local("b".into()),
            NodeKey::Local("c".into()),
        ];
        let set = deferred_locals(&g, |t| matches!(t, RefTarget::Resource(_)));
        assert!(set.contains("a"));
        assert!(set.contains("b"));
        assert!(!set.contains("c"));
    }

    fn child(path: &[&str]) -> Graph {
        Graph {
            path: path.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_cv015_module_functions_unique() {
        let root = Graph {
            is_root: true,
            ..Default::default()
        };
        let forest = vec![child(&["x_net"]), child(&["x", "net"]), child(&["x"]), root];
        let base = |path: &[String]| format!("{}_module", path.join("_"));
        let functions = module_functions(&forest, &["x_module".to_string()], base);
        assert_eq!(functions.len(), 3);
        assert_eq!(functions[&vec!["x_net".to_string()]], "x_net_module");
        assert_eq!(functions[&vec!["x".to_string(), "net".to_string()]], "x_net_module2");
        assert_eq!(functions[&vec!["x".to_string()]], "x_module2");
    }

    #[test]
    fn test_cv015_inherited_provider_dropped() {
        let provider = |name: &str, alias: Option<&str>, configured: bool| {
            let mut properties = indexmap::IndexMap::new();
            if configured {
                properties.insert("region".to_string(), BoundNode::string("us-west-2"));
            }
            ProviderNode {
                name: name.to_string(),
                location: Location::unknown(),
                comments: None,
                plugin: "aws".to_string(),
                alias: alias.map(str::to_string),
                properties,
            }
        };
        let mut root = Graph {
            is_root: true,
            ..Default::default()
        };
        root.providers.insert("aws".into(), provider("aws", None, false));
        root.providers.insert("aws.west".into(), provider("aws.west", Some("west"), false));
        root.providers.insert("google".into(), provider("google", None, true));
        let net = child(&["net"]);
        let forest = vec![net.clone(), root];

        assert!(!inherited_provider_dropped(&forest, &net, "aws"));
        assert!(inherited_provider_dropped(&forest, &net, "aws.west"));
        assert!(inherited_provider_dropped(&forest, &net, "google"));
        assert!(!inherited_provider_dropped(&forest, &net, "azure"));
    }
}
