//! CV-003: Module document parsing, merging and validation.
//!
//! Parses module files and validates structural constraints:
//! - Declaration names must be identifiers
//! - Resource types must be `provider_kind` identifiers
//! - Provider keys must be `name` or `name.alias`
//! - Module sources must not be empty
//!
//! Reference resolution is left to the binder.

use super::source::SourceFile;
use super::types::*;
use crate::error::LoadError;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("identifier regex"));

static PROVIDER_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*(\.[A-Za-z_][A-Za-z0-9_-]*)?$")
        .expect("provider key regex")
});

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Read a module file from disk.
pub fn read_module_file(path: &Path, name: String) -> Result<SourceFile, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|e| LoadError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(SourceFile::new(path.to_path_buf(), name, text))
}

/// Parse one module document.
pub fn parse_module(file: &SourceFile) -> Result<ModuleConfig, LoadError> {
    if file.text.trim().is_empty() {
        return Ok(ModuleConfig::default());
    }
    serde_yaml_ng::from_str(&file.text).map_err(|e| LoadError::Parse {
        path: file.path.clone(),
        message: e.to_string(),
    })
}

/// Merge `part` (from file `part_file`) into `into`. `origin` returns the file
/// that already declared a name, for the duplicate message.
pub fn merge_module(
    into: &mut ModuleConfig,
    part: ModuleConfig,
    part_file: &str,
    origin: impl Fn(Section, &str) -> Option<String>,
) -> Result<(), LoadError> {
    fn merge_section<V>(
        section: Section,
        into: &mut indexmap::IndexMap<String, V>,
        part: indexmap::IndexMap<String, V>,
        part_file: &str,
        origin: &dyn Fn(Section, &str) -> Option<String>,
    ) -> Result<(), LoadError> {
        for (name, value) in part {
            if into.contains_key(&name) {
                return Err(LoadError::Duplicate {
                    section: section.to_string(),
                    first: origin(section, &name).unwrap_or_else(|| "?".to_string()),
                    second: part_file.to_string(),
                    name,
                });
            }
            into.insert(name, value);
        }
        Ok(())
    }

    merge_section(Section::Providers, &mut into.providers, part.providers, part_file, &origin)?;
    merge_section(Section::Variables, &mut into.variables, part.variables, part_file, &origin)?;
    merge_section(Section::Locals, &mut into.locals, part.locals, part_file, &origin)?;
    merge_section(Section::Resources, &mut into.resources, part.resources, part_file, &origin)?;
    merge_section(Section::Data, &mut into.data, part.data, part_file, &origin)?;
    merge_section(Section::Modules, &mut into.modules, part.modules, part_file, &origin)?;
    merge_section(Section::Outputs, &mut into.outputs, part.outputs, part_file, &origin)?;
    Ok(())
}

/// Names declared by `config` in `section`, in declaration order.
pub fn section_names(config: &ModuleConfig, section: Section) -> Vec<&str> {
    match section {
        Section::Providers => config.providers.keys().map(String::as_str).collect(),
        Section::Variables => config.variables.keys().map(String::as_str).collect(),
        Section::Locals => config.locals.keys().map(String::as_str).collect(),
        Section::Resources => config.resources.keys().map(String::as_str).collect(),
        Section::Data => config.data.keys().map(String::as_str).collect(),
        Section::Modules => config.modules.keys().map(String::as_str).collect(),
        Section::Outputs => config.outputs.keys().map(String::as_str).collect(),
    }
}

/// Validate a merged module. Returns a list of errors (empty = valid).
pub fn validate_module(config: &ModuleConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for name in config.providers.keys() {
        if !PROVIDER_KEY.is_match(name) {
            errors.push(ValidationError {
                message: format!("provider key '{}' must be 'name' or 'name.alias'", name),
            });
        }
    }

    for section in [Section::Variables, Section::Locals, Section::Resources, Section::Data, Section::Modules, Section::Outputs] {
        for name in section_names(config, section) {
            if !IDENT.is_match(name) {
                errors.push(ValidationError {
                    message: format!("{} name '{}' is not a valid identifier", section, name),
                });
            }
        }
    }

    for (id, resource) in config.resources.iter().chain(config.data.iter()) {
        if !IDENT.is_match(&resource.resource_type) || !resource.resource_type.contains('_') {
            errors.push(ValidationError {
                message: format!(
                    "'{}' has invalid type '{}' (expected provider_kind)",
                    id, resource.resource_type
                ),
            });
        }
        if let Some(ref p) = resource.provider {
            if !PROVIDER_KEY.is_match(p) {
                errors.push(ValidationError {
                    message: format!("'{}' has invalid provider '{}'", id, p),
                });
            }
        }
    }

    for (name, call) in &config.modules {
        if call.source.trim().is_empty() {
            errors.push(ValidationError {
                message: format!("module '{}' has an empty source", name),
            });
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn src(text: &str) -> SourceFile {
        SourceFile::new(PathBuf::from("a.yaml"), "a.yaml".to_string(), text.to_string())
    }

    #[test]
    fn test_cv003_parse_valid() {
        let config = parse_module(&src(
            r#"
resources:
  web:
    type: aws_instance
    properties:
      ami: ami-123
"#,
        ))
        .unwrap();
        assert_eq!(config.resources.len(), 1);
        let errors = validate_module(&config);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors.iter().map(|e| &e.message).collect::<Vec<_>>());
    }

    #[test]
    fn test_cv003_parse_empty_file() {
        let config = parse_module(&src("   \n")).unwrap();
        assert!(config.resources.is_empty());
    }

    #[test]
    fn test_cv003_parse_invalid_yaml() {
        let result = parse_module(&src("not: [valid: yaml: {{"));
        assert!(matches!(result, Err(LoadError::Parse { .. })));
    }

    #[test]
    fn test_cv003_bad_resource_type() {
        let config = parse_module(&src("resources:\n  x:\n    type: nounderscore\n")).unwrap();
        let errors = validate_module(&config);
        assert!(errors.iter().any(|e| e.message.contains("invalid type")));
    }

    #[test]
    fn test_cv003_bad_names() {
        let config = parse_module(&src(
            "locals:\n  \"has space\": 1\nproviders:\n  \"a.b.c\": {}\n",
        ))
        .unwrap();
        let errors = validate_module(&config);
        assert!(errors.iter().any(|e| e.message.contains("not a valid identifier")));
        assert!(errors.iter().any(|e| e.message.contains("name.alias")));
    }

    #[test]
    fn test_cv003_empty_module_source() {
        let config = parse_module(&src("modules:\n  net:\n    source: \"\"\n")).unwrap();
        let errors = validate_module(&config);
        assert!(errors.iter().any(|e| e.message.contains("empty source")));
    }

    #[test]
    fn test_cv003_merge_disjoint() {
        let mut into = parse_module(&src("locals:\n  a: 1\n")).unwrap();
        let part = parse_module(&src("locals:\n  b: 2\nvariables:\n  v: {}\n")).unwrap();
        merge_module(&mut into, part, "b.yaml", |_, _| None).unwrap();
        assert_eq!(into.locals.len(), 2);
        assert_eq!(into.variables.len(), 1);
    }

    #[test]
    fn test_cv003_merge_duplicate() {
        let mut into = parse_module(&src("locals:\n  a: 1\n")).unwrap();
        let part = parse_module(&src("locals:\n  a: 2\n")).unwrap();
        let err = merge_module(&mut into, part, "b.yaml", |_, _| Some("a.yaml".to_string()))
            .unwrap_err();
        assert_eq!(err.to_string(), "locals 'a' declared in both a.yaml and b.yaml");
    }

    #[test]
    fn test_cv003_read_module_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.yaml");
        std::fs::write(&path, "locals:\n  a: 1\n").unwrap();
        let file = read_module_file(&path, "main.yaml".to_string()).unwrap();
        assert_eq!(parse_module(&file).unwrap().locals.len(), 1);
    }

    #[test]
    fn test_cv003_read_missing_file() {
        let result = read_module_file(Path::new("/nonexistent/x.yaml"), "x.yaml".to_string());
        assert!(matches!(result, Err(LoadError::Read { .. })));
    }
}
