//! CV-011: Conversion pipeline.
//!
//! `convert` runs the whole pipeline: open the module tree, load it, bind one
//! graph per module instance in postorder, optionally filter name properties
//! and annotate locations, then hand the forest to the selected generator.

pub mod annotate;
pub mod filter;
pub mod settings;

pub use annotate::{add_location_annotation, annotate_graph, annotate_locations};
pub use filter::filter_resource_properties;
pub use settings::Settings;

use crate::core::schema::ProviderInfoSource;
use crate::core::storage::{ModuleStorage, NoCredentials, DEFAULT_CACHE_DIR};
use crate::core::tree::ModuleTree;
use crate::error::{BindError, ConvertError};
use crate::gen::{self, TargetOptions};
use crate::il::{self, BuildOptions, Graph};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Project name handed to generators.
const PROJECT_NAME: &str = "auto";

/// Everything a conversion can be configured with.
#[derive(Default)]
pub struct Options {
    /// Bind resources with undeclared providers to an unknown provider
    pub allow_missing_providers: bool,
    /// Bind undeclared variables to placeholders
    pub allow_missing_variables: bool,
    /// Continue when comments cannot be extracted
    pub allow_missing_comments: bool,
    /// Record each node's source location as a leading comment
    pub annotate_nodes_with_locations: bool,
    /// Drop resource name properties
    pub filter_resource_names: bool,
    /// Name property to drop; empty means schema auto-detection
    pub resource_name_property: String,
    /// Root module directory; `.` when unset
    pub path: Option<PathBuf>,
    /// Output sink; standard output when unset
    pub writer: Option<Box<dyn Write>>,
    pub provider_info: Option<Arc<dyn ProviderInfoSource>>,
    /// Diagnostic sink, installed for the duration of the conversion
    pub logger: Option<tracing::Dispatch>,
    /// `typescript` or `python`
    pub target_language: String,
    pub target_sdk_version: String,
    pub target_options: Option<TargetOptions>,
    /// Remote module cache; `.iacgen/modules` under the root when unset
    pub cache_dir: Option<PathBuf>,
}

impl Options {
    /// Binding options derived from these options.
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            allow_missing_providers: self.allow_missing_providers,
            allow_missing_variables: self.allow_missing_variables,
            allow_missing_comments: self.allow_missing_comments,
            provider_info: self.provider_info.clone(),
            logger: self.logger.clone(),
        }
    }
}

/// Convert the module tree at `opts.path` into a program written to
/// `opts.writer`.
pub fn convert(mut opts: Options) -> Result<(), ConvertError> {
    match opts.logger.clone() {
        Some(dispatch) => tracing::dispatcher::with_default(&dispatch, || run(&mut opts)),
        None => run(&mut opts),
    }
}

fn run(opts: &mut Options) -> Result<(), ConvertError> {
    let path = opts.path.get_or_insert_with(|| PathBuf::from(".")).clone();
    let writer = opts
        .writer
        .take()
        .unwrap_or_else(|| Box::new(std::io::stdout()));
    let cache_dir = opts
        .cache_dir
        .clone()
        .unwrap_or_else(|| path.join(DEFAULT_CACHE_DIR));
    let storage = ModuleStorage::new(cache_dir, Box::new(NoCredentials));

    let mut tree = ModuleTree::new("", &path).map_err(ConvertError::CreateTree)?;
    tree.load(&storage).map_err(ConvertError::LoadModule)?;

    let mut forest = build_forest(&tree, true, opts).map_err(ConvertError::ImportGraphs)?;
    tracing::debug!(graphs = forest.len(), "built forest");

    if opts.filter_resource_names {
        filter_resource_properties(&mut forest, &opts.resource_name_property);
    }
    if opts.annotate_nodes_with_locations {
        annotate_locations(&mut forest);
    }

    let mut generator =
        gen::new_generator(PROJECT_NAME, opts, writer).map_err(ConvertError::CreateGenerator)?;
    generator.generate(&forest).map_err(ConvertError::Generate)?;
    Ok(())
}

/// Bind `tree` and all of its descendants. Children come first, in tree
/// order, each followed by its own ancestors, so every graph appears after
/// the graphs of the modules it calls. Fails on the first binding error.
pub fn build_forest(
    tree: &ModuleTree,
    is_root: bool,
    opts: &Options,
) -> Result<Vec<Graph>, BindError> {
    let mut forest = Vec::new();
    for child in tree.children() {
        forest.extend(build_forest(child, false, opts)?);
    }
    let mut graph = il::build_graph(tree, &opts.build_options())?;
    graph.is_root = is_root;
    forest.push(graph);
    Ok(forest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{DefaultInfo, PropertySchema, ProviderInfo, ResourceSchema, SchemaDirectory};
    use crate::error::{BindErrorKind, ConfigError};
    use crate::gen::PythonOptions;
    use proptest::prelude::*;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);
    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Sink {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    const MAIN: &str = r#"providers:
  aws:
    region: us-east-1
resources:
  # Upload bucket.
  uploads:
    type: aws_s3_bucket
    properties:
      bucket: uploads-bucket
      acl: private
"#;

    fn options(root: &Path, sink: &Sink) -> Options {
        Options {
            path: Some(root.to_path_buf()),
            writer: Some(Box::new(sink.clone())),
            target_language: "typescript".to_string(),
            ..Default::default()
        }
    }

    fn load(root: &Path) -> ModuleTree {
        let mut tree = ModuleTree::new("", root).unwrap();
        tree.load(&ModuleStorage::new(root.join(".cache"), Box::new(NoCredentials)))
            .unwrap();
        tree
    }

    fn bucket_schema() -> Arc<SchemaDirectory> {
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
        let mut info = ProviderInfo {
            name: "aws".to_string(),
            ..Default::default()
        };
        info.resources.insert("aws_s3_bucket".to_string(), schema);
        Arc::new(SchemaDirectory::from_providers([info]))
    }

    #[test]
    fn test_cv011_convert_typescript() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.yaml"), MAIN).unwrap();
        let sink = Sink::default();
        convert(options(dir.path(), &sink)).unwrap();
        let out = sink.text();
        assert!(out.contains("const uploads = new aws.s3.Bucket(\"uploads\", {"));
        assert!(out.contains("bucket: \"uploads-bucket\","));
        assert!(out.contains("// Upload bucket."));
        assert!(!out.contains("Originally defined"));
    }

    #[test]
    fn test_cv011_convert_filter_and_annotate() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.yaml"), MAIN).unwrap();
        let sink = Sink::default();
        let opts = Options {
            filter_resource_names: true,
            annotate_nodes_with_locations: true,
            provider_info: Some(bucket_schema()),
            ..options(dir.path(), &sink)
        };
        convert(opts).unwrap();
        let out = sink.text();
        assert!(!out.contains("uploads-bucket"));
        assert!(out.contains("acl: \"private\","));
        assert!(out.contains("// Upload bucket.\n//\n// Originally defined at main.yaml:6\nconst uploads"));
        assert!(out.contains("// Originally defined at main.yaml:2\nconst awsProvider"));
    }

    #[test]
    fn test_cv011_convert_explicit_name_property() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.yaml"), MAIN).unwrap();
        let sink = Sink::default();
        let opts = Options {
            filter_resource_names: true,
            resource_name_property: "acl".to_string(),
            provider_info: Some(bucket_schema()),
            ..options(dir.path(), &sink)
        };
        convert(opts).unwrap();
        let out = sink.text();
        assert!(out.contains("bucket: \"uploads-bucket\","));
        assert!(!out.contains("acl:"));
    }

    #[test]
    fn test_cv011_filter_disabled_keeps_properties() {
        let dir = tempfile::tempdir().unwrap();
        let text = format!(
            "{}data:\n  existing:\n    type: aws_s3_bucket\n    properties:\n      bucket: legacy-bucket\n",
            MAIN
        );
        fs::write(dir.path().join("main.yaml"), &text).unwrap();

        let sink = Sink::default();
        let opts = Options {
            filter_resource_names: false,
            resource_name_property: "acl".to_string(),
            provider_info: Some(bucket_schema()),
            ..options(dir.path(), &sink)
        };
        convert(opts).unwrap();
        let out = sink.text();
        assert!(out.contains("bucket: \"uploads-bucket\","));
        assert!(out.contains("acl: \"private\","));
        assert!(out.contains("bucket: \"legacy-bucket\","));

        let sink = Sink::default();
        let opts = Options {
            filter_resource_names: true,
            provider_info: Some(bucket_schema()),
            ..options(dir.path(), &sink)
        };
        convert(opts).unwrap();
        let out = sink.text();
        assert!(!out.contains("uploads-bucket"));
        assert!(out.contains("acl: \"private\","));
        assert!(out.contains("bucket: \"legacy-bucket\","));
    }

    #[test]
    fn test_cv011_stage_labels() {
        let sink = Sink::default();
        let err = convert(options(Path::new("/nonexistent/iacgen"), &sink)).unwrap_err();
        assert!(err.to_string().starts_with("creating tree module: "));

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.yaml"), "resources: [").unwrap();
        let err = convert(options(dir.path(), &sink)).unwrap_err();
        assert!(err.to_string().starts_with("loading module: "));

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.yaml"), "locals:\n  a: \"${var.nope}\"\n").unwrap();
        let err = convert(options(dir.path(), &sink)).unwrap_err();
        assert!(matches!(err, ConvertError::ImportGraphs(ref e) if matches!(e.kind, BindErrorKind::UnknownVariable { .. })));
        assert!(err.to_string().starts_with("importing project graphs: module <root>: "));
        assert!(sink.text().is_empty());
    }

    #[test]
    fn test_cv011_invalid_language_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.yaml"), MAIN).unwrap();
        let sink = Sink::default();
        let opts = Options {
            target_language: "ruby".to_string(),
            ..options(dir.path(), &sink)
        };
        let err = convert(opts).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::CreateGenerator(ConfigError::InvalidLanguage { .. })
        ));
        assert_eq!(
            err.to_string(),
            "creating generator: invalid language 'ruby', expected one of typescript, python"
        );
        assert!(sink.text().is_empty());
    }

    #[test]
    fn test_cv011_options_mismatch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.yaml"), MAIN).unwrap();
        let sink = Sink::default();
        let opts = Options {
            target_options: Some(TargetOptions::Python(PythonOptions::default())),
            ..options(dir.path(), &sink)
        };
        let err = convert(opts).unwrap_err();
        assert!(err.to_string().contains("PythonOptions"));
        assert!(sink.text().is_empty());
    }

    #[test]
    fn test_cv011_single_root_forest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.yaml"), "{}\n").unwrap();
        let forest = build_forest(&load(dir.path()), true, &Options::default()).unwrap();
        assert_eq!(forest.len(), 1);
        assert!(forest[0].is_root);
        assert!(forest[0].resources.is_empty());
    }

    #[test]
    fn test_cv011_failing_descendant_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("main.yaml"), "modules:\n  a:\n    source: ./a\n").unwrap();
        fs::write(root.join("a/main.yaml"), "modules:\n  b:\n    source: ./b\n").unwrap();
        fs::write(root.join("a/b/main.yaml"), "locals:\n  x: \"${local.y}\"\n").unwrap();
        let err = build_forest(&load(root), true, &Options::default()).unwrap_err();
        assert_eq!(err.module, "a.b");
    }

    /// Write a module tree shaped by `shape`: entry `i` is the number of
    /// children of the `i`-th module created, breadth first.
    fn write_shape(root: &Path, shape: &[usize]) -> usize {
        let mut queue = vec![root.to_path_buf()];
        let mut created = 1;
        let mut next = 0;
        while next < queue.len() {
            let dir = queue[next].clone();
            let children = shape.get(next).copied().unwrap_or(0);
            let mut text = String::from("locals:\n  id: x\n");
            if children > 0 {
                text.push_str("modules:\n");
            }
            for c in 0..children {
                text.push_str(&format!("  m{}:\n    source: ./m{}\n", c, c));
                let child = dir.join(format!("m{}", c));
                fs::create_dir_all(&child).unwrap();
                queue.push(child);
                created += 1;
            }
            fs::write(dir.join("main.yaml"), text).unwrap();
            next += 1;
        }
        created
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_forest_is_postorder(shape in proptest::collection::vec(0usize..3, 0..6)) {
            let dir = tempfile::tempdir().unwrap();
            let count = write_shape(dir.path(), &shape);
            let forest = build_forest(&load(dir.path()), true, &Options::default()).unwrap();

            prop_assert_eq!(forest.len(), count);
            prop_assert!(forest.last().unwrap().is_root);
            for (index, graph) in forest.iter().enumerate() {
                for module in graph.modules.values() {
                    let child = forest.iter().position(|g| g.path == module.path).unwrap();
                    prop_assert!(child < index);
                }
            }
        }
    }
}
