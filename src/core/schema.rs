//! CV-004: Provider schema information.
//!
//! The binder asks a `ProviderInfoSource` for per-resource schema metadata.
//! `SchemaDirectory` loads one YAML document per provider from a directory.

use super::types::Value;
use crate::error::LoadError;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Schema information for one provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderInfo {
    /// Provider plugin name (`aws`, `google`, ...)
    pub name: String,

    /// Managed resource schemas, keyed by resource type
    #[serde(default)]
    pub resources: IndexMap<String, ResourceSchema>,

    /// Data source schemas, keyed by data source type
    #[serde(default)]
    pub data_sources: IndexMap<String, ResourceSchema>,
}

/// Schema of a single resource or data source type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceSchema {
    /// Target type token, `package:module/member:Class`
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub properties: IndexMap<String, PropertySchema>,
}

/// Schema of a single property.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertySchema {
    /// Property name in the generated program, when it differs from the
    /// naming convention of the target language
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub default: Option<DefaultInfo>,
}

/// Default value metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultInfo {
    #[serde(default)]
    pub value: Option<Value>,

    /// The target platform synthesizes this value itself
    #[serde(default)]
    pub auto_named: bool,
}

/// Source of provider schema information.
pub trait ProviderInfoSource {
    /// Schema for `provider`, or `None` when unknown.
    fn provider_info(&self, provider: &str) -> Option<Arc<ProviderInfo>>;
}

/// Provider schemas loaded from `*.yaml` files in a directory.
#[derive(Debug, Clone, Default)]
pub struct SchemaDirectory {
    providers: FxHashMap<String, Arc<ProviderInfo>>,
}

impl SchemaDirectory {
    /// Load every `*.yaml` / `*.yml` schema in `dir`.
    pub fn load(dir: &Path) -> Result<Self, LoadError> {
        if !dir.is_dir() {
            return Err(LoadError::NotFound {
                path: dir.to_path_buf(),
            });
        }
        let mut providers = Vec::new();
        for path in yaml_files(dir)? {
            let content = std::fs::read_to_string(&path).map_err(|e| LoadError::Read {
                path: path.clone(),
                source: e,
            })?;
            let info: ProviderInfo =
                serde_yaml_ng::from_str(&content).map_err(|e| LoadError::Parse {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            tracing::debug!(provider = %info.name, path = %path.display(), "loaded provider schema");
            providers.push(info);
        }
        Ok(Self::from_providers(providers))
    }

    pub fn from_providers(providers: impl IntoIterator<Item = ProviderInfo>) -> Self {
        Self {
            providers: providers
                .into_iter()
                .map(|p| (p.name.clone(), Arc::new(p)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl ProviderInfoSource for SchemaDirectory {
    fn provider_info(&self, provider: &str) -> Option<Arc<ProviderInfo>> {
        self.providers.get(provider).cloned()
    }
}

/// `*.yaml` and `*.yml` files directly inside `dir`, sorted by name.
pub fn yaml_files(dir: &Path) -> Result<Vec<std::path::PathBuf>, LoadError> {
    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let mut files = Vec::new();
    for ext in ["yaml", "yml"] {
        let pattern = format!("{}/*.{}", base, ext);
        let entries = glob::glob(&pattern).map_err(|e| LoadError::Pattern(e.to_string()))?;
        for entry in entries {
            let path = entry.map_err(|e| LoadError::Read {
                path: e.path().to_path_buf(),
                source: e.into(),
            })?;
            if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
