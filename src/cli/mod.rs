//! CV-019: CLI subcommands: convert, validate.

use crate::convert::{self, Options, Settings};
use crate::core::schema::SchemaDirectory;
use crate::core::storage::{ModuleStorage, NoCredentials, DEFAULT_CACHE_DIR};
use crate::core::tree::ModuleTree;
use crate::gen::{TargetOptions, TypeScriptOptions};
use crate::il::Graph;
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Target used when neither a flag nor the settings file names one.
const DEFAULT_TARGET: &str = "typescript";

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert a module tree into a program
    Convert {
        /// Root module directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Target language (typescript, python)
        #[arg(short, long)]
        target: Option<String>,

        /// Target SDK version, recorded in the generated header
        #[arg(long)]
        sdk_version: Option<String>,

        #[command(flatten)]
        tolerate: Tolerances,

        /// Annotate every node with its original location
        #[arg(long)]
        annotate: bool,

        /// Drop resource name properties
        #[arg(long)]
        filter_resource_names: bool,

        /// Name property to drop (default: schema auto-detection)
        #[arg(long)]
        resource_name_property: Option<String>,

        /// Provider schema directory
        #[arg(long)]
        schemas: Option<PathBuf>,

        /// Settings file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Emit data sources as plain promise-returning calls (typescript)
        #[arg(long)]
        use_prompt_data_sources: bool,

        /// Write the program here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load and bind a module tree without generating code
    Validate {
        /// Root module directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Provider schema directory
        #[arg(long)]
        schemas: Option<PathBuf>,

        #[command(flatten)]
        tolerate: Tolerances,
    },
}

/// Binding failures to tolerate.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct Tolerances {
    /// Bind resources with undeclared providers to an unknown provider
    #[arg(long)]
    pub allow_missing_providers: bool,

    /// Treat undeclared variables as placeholders
    #[arg(long)]
    pub allow_missing_variables: bool,

    /// Continue when comments cannot be extracted
    #[arg(long)]
    pub allow_missing_comments: bool,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Convert {
            path,
            target,
            sdk_version,
            tolerate,
            annotate,
            filter_resource_names,
            resource_name_property,
            schemas,
            config,
            use_prompt_data_sources,
            output,
        } => {
            let mut opts = Options {
                allow_missing_providers: tolerate.allow_missing_providers,
                allow_missing_variables: tolerate.allow_missing_variables,
                allow_missing_comments: tolerate.allow_missing_comments,
                annotate_nodes_with_locations: annotate,
                filter_resource_names,
                resource_name_property: resource_name_property.unwrap_or_default(),
                target_language: target.unwrap_or_default(),
                target_sdk_version: sdk_version.unwrap_or_default(),
                path: Some(path),
                ..Default::default()
            };
            if use_prompt_data_sources {
                opts.target_options = Some(TargetOptions::TypeScript(TypeScriptOptions {
                    use_prompt_data_sources: true,
                }));
            }
            if let Some(dir) = schemas {
                opts.provider_info = Some(Arc::new(load_schemas(&dir)?));
            }
            cmd_convert(opts, config.as_deref(), output.as_deref())
        }
        Commands::Validate {
            path,
            schemas,
            tolerate,
        } => cmd_validate(&path, schemas.as_deref(), tolerate),
    }
}

fn load_schemas(dir: &Path) -> Result<SchemaDirectory, String> {
    SchemaDirectory::load(dir).map_err(|e| format!("loading schemas: {}", e))
}

fn cmd_convert(mut opts: Options, config: Option<&Path>, output: Option<&Path>) -> Result<(), String> {
    if let Some(file) = config {
        let settings = Settings::load(file).map_err(|e| format!("loading settings: {}", e))?;
        settings
            .apply(&mut opts)
            .map_err(|e| format!("loading settings: {}", e))?;
    }
    if opts.target_language.is_empty() {
        opts.target_language = DEFAULT_TARGET.to_string();
    }
    if let Some(file) = output {
        let out = std::fs::File::create(file)
            .map_err(|e| format!("cannot create {}: {}", file.display(), e))?;
        opts.writer = Some(Box::new(std::io::BufWriter::new(out)));
    }
    convert::convert(opts).map_err(|e| e.to_string())?;
    if let Some(file) = output {
        eprintln!("wrote {}", file.display());
    }
    Ok(())
}

fn cmd_validate(path: &Path, schemas: Option<&Path>, tolerate: Tolerances) -> Result<(), String> {
    let mut opts = Options {
        allow_missing_providers: tolerate.allow_missing_providers,
        allow_missing_variables: tolerate.allow_missing_variables,
        allow_missing_comments: tolerate.allow_missing_comments,
        ..Default::default()
    };
    if let Some(dir) = schemas {
        opts.provider_info = Some(Arc::new(load_schemas(dir)?));
    }

    let storage = ModuleStorage::new(path.join(DEFAULT_CACHE_DIR), Box::new(NoCredentials));
    let mut tree = ModuleTree::new("", path).map_err(|e| e.to_string())?;
    tree.load(&storage).map_err(|e| e.to_string())?;
    let forest = convert::build_forest(&tree, true, &opts).map_err(|e| e.to_string())?;

    for graph in &forest {
        println!("{}", summary(graph));
    }
    Ok(())
}

/// One-line summary of a bound module.
fn summary(graph: &Graph) -> String {
    let data = graph.resources.values().filter(|r| r.is_data_source).count();
    format!(
        "OK: {} ({} variables, {} providers, {} locals, {} resources, {} data sources, {} modules, {} outputs)",
        graph.display_name(),
        graph.variables.len(),
        graph.providers.len(),
        graph.locals.len(),
        graph.resources.len() - data,
        data,
        graph.modules.len(),
        graph.outputs.len()
    )
}
