//! CV-008: Module tree.
//!
//! A `ModuleTree` is a module directory plus, once loaded, its merged
//! declarations and one child tree per nested module call. Children record
//! the provider names their ancestors declare, so the binder can accept a
//! resource whose provider is configured further up the tree.

use super::parser;
use super::schema::yaml_files;
use super::source::SourceFile;
use super::storage::ModuleStorage;
use super::types::{ModuleConfig, Section};
use crate::error::LoadError;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

/// A module and its nested module calls.
#[derive(Debug, Clone)]
pub struct ModuleTree {
    name: String,
    path: Vec<String>,
    dir: PathBuf,
    /// Directory of the root module; file names are reported relative to it
    root_dir: PathBuf,
    file_paths: Vec<PathBuf>,
    files: Vec<SourceFile>,
    config: ModuleConfig,
    /// Index into `files` of the file declaring each name
    origins: FxHashMap<(Section, String), usize>,
    inherited_providers: Vec<String>,
    children: IndexMap<String, ModuleTree>,
}

impl ModuleTree {
    /// Open the root module in `dir`. The directory must exist and hold at
    /// least one module file; nothing is parsed yet.
    pub fn new(name: &str, dir: &Path) -> Result<Self, LoadError> {
        Self::open(name, Vec::new(), dir, dir, Vec::new())
    }

    fn open(
        name: &str,
        path: Vec<String>,
        dir: &Path,
        root_dir: &Path,
        inherited_providers: Vec<String>,
    ) -> Result<Self, LoadError> {
        if !dir.is_dir() {
            return Err(LoadError::NotFound {
                path: dir.to_path_buf(),
            });
        }
        let file_paths = yaml_files(dir)?;
        if file_paths.is_empty() {
            return Err(LoadError::NoModuleFiles {
                path: dir.to_path_buf(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            path,
            dir: dir.to_path_buf(),
            root_dir: root_dir.to_path_buf(),
            file_paths,
            files: Vec::new(),
            config: ModuleConfig::default(),
            origins: FxHashMap::default(),
            inherited_providers,
            children: IndexMap::new(),
        })
    }

    /// Parse and merge this module's files, then resolve and load every
    /// nested module call, depth first in declaration order.
    pub fn load(&mut self, storage: &ModuleStorage) -> Result<(), LoadError> {
        let mut ancestors = Vec::new();
        self.load_inner(storage, &mut ancestors)
    }

    fn load_inner(
        &mut self,
        storage: &ModuleStorage,
        ancestors: &mut Vec<PathBuf>,
    ) -> Result<(), LoadError> {
        let canonical = self.dir.canonicalize().map_err(|e| LoadError::Read {
            path: self.dir.clone(),
            source: e,
        })?;
        if ancestors.contains(&canonical) {
            return Err(LoadError::Recursive {
                name: self.name.clone(),
                path: self.dir.clone(),
            });
        }

        self.read_files()?;
        tracing::debug!(
            module = %self.name,
            dir = %self.dir.display(),
            files = self.files.len(),
            "loaded module files"
        );

        let mut inherited = self.inherited_providers.clone();
        for p in self.config.providers.keys() {
            if !inherited.contains(p) {
                inherited.push(p.clone());
            }
        }

        ancestors.push(canonical);
        self.children.clear();
        for (call_name, call) in &self.config.modules {
            let child_dir = storage.resolve(&call.source, &self.dir)?;
            let mut child_path = self.path.clone();
            child_path.push(call_name.clone());
            let mut child = Self::open(
                call_name,
                child_path,
                &child_dir,
                &self.root_dir,
                inherited.clone(),
            )?;
            child.load_inner(storage, ancestors)?;
            self.children.insert(call_name.clone(), child);
        }
        ancestors.pop();
        Ok(())
    }

    fn read_files(&mut self) -> Result<(), LoadError> {
        let mut files = Vec::with_capacity(self.file_paths.len());
        let mut config = ModuleConfig::default();
        let mut origins: FxHashMap<(Section, String), usize> = FxHashMap::default();

        for (index, path) in self.file_paths.iter().enumerate() {
            let file = parser::read_module_file(path, self.display_file_name(path))?;
            let part = parser::parse_module(&file)?;

            for section in Section::ALL {
                for name in parser::section_names(&part, section) {
                    origins.entry((section, name.to_string())).or_insert(index);
                }
            }
            parser::merge_module(&mut config, part, &file.name, |section, name| {
                origins
                    .get(&(section, name.to_string()))
                    .filter(|&&i| i < index)
                    .map(|&i| files_name(&files, i))
            })?;
            files.push(file);
        }

        let errors = parser::validate_module(&config);
        if !errors.is_empty() {
            return Err(LoadError::Invalid {
                path: self.dir.clone(),
                errors: errors.iter().map(ToString::to_string).collect(),
            });
        }

        self.files = files;
        self.config = config;
        self.origins = origins;
        Ok(())
    }

    fn display_file_name(&self, path: &Path) -> String {
        path.strip_prefix(&self.root_dir)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module path from the root; empty for the root itself.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Merged declarations of every file in the module.
    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// Providers declared by the ancestors of this module.
    pub fn inherited_providers(&self) -> &[String] {
        &self.inherited_providers
    }

    /// Child trees in module-call declaration order.
    pub fn children(&self) -> impl Iterator<Item = &ModuleTree> {
        self.children.values()
    }

    pub fn child(&self, name: &str) -> Option<&ModuleTree> {
        self.children.get(name)
    }

    /// The file that declared `name` in `section`.
    pub fn source_of(&self, section: Section, name: &str) -> Option<&SourceFile> {
        self.origins
            .get(&(section, name.to_string()))
            .and_then(|&i| self.files.get(i))
    }
}

fn files_name(files: &[SourceFile], index: usize) -> String {
    files
        .get(index)
        .map(|f| f.name.clone())
        .unwrap_or_else(|| "?".to_string())
}
