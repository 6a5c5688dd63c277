//! CV-014: Settings file.
//!
//! An optional YAML file holding conversion defaults. Command-line flags win:
//! a flag that is set overrides the file, a flag left at its default falls
//! back to the file's value.

use super::Options;
use crate::core::schema::SchemaDirectory;
use crate::error::LoadError;
use crate::gen::{TargetOptions, TypeScriptOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Conversion defaults read from a settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Target language identifier
    pub target: Option<String>,
    pub sdk_version: Option<String>,
    pub allow_missing_providers: bool,
    pub allow_missing_variables: bool,
    pub allow_missing_comments: bool,
    pub annotate: bool,
    pub filter_resource_names: bool,
    pub resource_name_property: Option<String>,
    /// Provider schema directory, relative to the settings file
    pub schemas: Option<PathBuf>,
    /// Remote module cache, relative to the settings file
    pub cache_dir: Option<PathBuf>,
    pub use_prompt_data_sources: bool,
}

impl Settings {
    /// Read and parse a settings file. Relative paths inside it are resolved
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut settings = Self::parse(&content).map_err(|message| LoadError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for dir in [&mut settings.schemas, &mut settings.cache_dir]
            .into_iter()
            .flatten()
        {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        Ok(settings)
    }

    /// Parse settings from YAML text.
    pub fn parse(yaml: &str) -> Result<Self, String> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(yaml).map_err(|e| e.to_string())
    }

    /// Fill every option the command line left unset. Loads the schema
    /// directory when the options carry no schema source yet.
    pub fn apply(&self, opts: &mut Options) -> Result<(), LoadError> {
        if opts.target_language.is_empty() {
            if let Some(target) = &self.target {
                opts.target_language = target.clone();
            }
        }
        if opts.target_sdk_version.is_empty() {
            if let Some(version) = &self.sdk_version {
                opts.target_sdk_version = version.clone();
            }
        }
        if opts.resource_name_property.is_empty() {
            if let Some(property) = &self.resource_name_property {
                opts.resource_name_property = property.clone();
            }
        }
        opts.allow_missing_providers |= self.allow_missing_providers;
        opts.allow_missing_variables |= self.allow_missing_variables;
        opts.allow_missing_comments |= self.allow_missing_comments;
        opts.annotate_nodes_with_locations |= self.annotate;
        opts.filter_resource_names |= self.filter_resource_names;

        if self.use_prompt_data_sources && opts.target_options.is_none() {
            opts.target_options = Some(TargetOptions::TypeScript(TypeScriptOptions {
                use_prompt_data_sources: true,
            }));
        }
        if opts.cache_dir.is_none() {
            opts.cache_dir = self.cache_dir.clone();
        }
        if opts.provider_info.is_none() {
            if let Some(dir) = &self.schemas {
                let schemas = SchemaDirectory::load(dir)?;
                tracing::debug!(providers = schemas.len(), dir = %dir.display(), "loaded schema directory");
                opts.provider_info = Some(Arc::new(schemas));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_cv014_parse_defaults() {
        assert_eq!(Settings::parse("").unwrap(), Settings::default());
        let settings = Settings::parse("target: python\nannotate: true\n").unwrap();
        assert_eq!(settings.target.as_deref(), Some("python"));
        assert!(settings.annotate);
        assert!(!settings.filter_resource_names);
    }

    #[test]
    fn test_cv014_unknown_key_rejected() {
        let err = Settings::parse("targte: python\n").unwrap_err();
        assert!(err.contains("targte"));
    }

    #[test]
    fn test_cv014_flags_win() {
        let settings = Settings::parse(
            "target: python\nsdk_version: \"6.0\"\nresource_name_property: name\nallow_missing_variables: true\n",
        )
        .unwrap();
        let mut opts = Options {
            target_language: "typescript".to_string(),
            ..Default::default()
        };
        settings.apply(&mut opts).unwrap();
        assert_eq!(opts.target_language, "typescript");
        assert_eq!(opts.target_sdk_version, "6.0");
        assert_eq!(opts.resource_name_property, "name");
        assert!(opts.allow_missing_variables);
        assert!(!opts.allow_missing_providers);
    }

    #[test]
    fn test_cv014_prompt_data_sources() {
        let settings = Settings::parse("use_prompt_data_sources: true\n").unwrap();
        let mut opts = Options::default();
        settings.apply(&mut opts).unwrap();
        assert_eq!(
            opts.target_options,
            Some(TargetOptions::TypeScript(TypeScriptOptions {
                use_prompt_data_sources: true
            }))
        );
    }

    #[test]
    fn test_cv014_load_resolves_relative_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("schemas")).unwrap();
        fs::write(
            dir.path().join("schemas/aws.yaml"),
            "name: aws\nresources:\n  aws_s3_bucket:\n    properties:\n      bucket: { default: { auto_named: true } }\n",
        )
        .unwrap();
        let file = dir.path().join("iacgen.yaml");
        fs::write(&file, "schemas: schemas\ncache_dir: cache\n").unwrap();

        let settings = Settings::load(&file).unwrap();
        assert_eq!(settings.schemas, Some(dir.path().join("schemas")));
        assert_eq!(settings.cache_dir, Some(dir.path().join("cache")));

        let mut opts = Options::default();
        settings.apply(&mut opts).unwrap();
        let info = opts.provider_info.unwrap().provider_info("aws").unwrap();
        assert!(info.resources.contains_key("aws_s3_bucket"));
        assert_eq!(opts.cache_dir, Some(dir.path().join("cache")));
    }

    #[test]
    fn test_cv014_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(err, LoadError::Read { .. }));

        let file = dir.path().join("bad.yaml");
        fs::write(&file, "annotate: [").unwrap();
        assert!(matches!(Settings::load(&file).unwrap_err(), LoadError::Parse { .. }));
    }
}
