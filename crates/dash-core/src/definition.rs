//! Query definitions and the loaders that resolve them.
//!
//! A definition is a small YAML document stored as `<queries_dir>/<id>.yml`:
//!
//! ```yaml
//! name: Sales by region
//! description: Daily totals for the selected regions
//! body: |
//!   SELECT day, SUM(total) AS total FROM sales
//!   WHERE region IN UNNEST({{regions}}) GROUP BY day
//! parameters:
//!   - name: regions
//!     type: STRING
//!     array_type: true
//! ```

use crate::error::{DashError, Result};
use crate::types::ParameterType;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFINITION_EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// Specification of one named query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    /// Whether the parameter takes a list of values
    #[serde(default, alias = "array_type")]
    pub array: bool,
}

impl ParameterSpec {
    pub fn scalar(name: impl Into<String>, param_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            array: false,
        }
    }

    pub fn array(name: impl Into<String>, param_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            array: true,
        }
    }
}

/// An immutable, loaded query definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryDefinition {
    /// Identifier derived from the definition's file name
    pub id: String,
    pub name: String,
    pub description: String,
    /// Query text with `{{name}}` placeholders
    pub body: String,
    /// Ordered parameter specification
    pub parameters: Vec<ParameterSpec>,
}

#[derive(Debug, Deserialize)]
struct RawDefinition {
    name: Option<String>,
    #[serde(default)]
    description: String,
    body: Option<String>,
    #[serde(default)]
    parameters: Vec<ParameterSpec>,
}

impl QueryDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            body: body.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parameter(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    /// Parse a definition document for the given id.
    pub fn from_yaml(id: &str, source: &str) -> Result<Self> {
        let raw: RawDefinition =
            serde_yaml::from_str(source).map_err(|e| DashError::parse(id, e.to_string()))?;

        let name = raw
            .name
            .ok_or_else(|| DashError::parse(id, "missing field 'name'"))?;
        let body = raw
            .body
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| DashError::parse(id, "missing or empty field 'body'"))?;

        let mut seen = HashSet::new();
        for spec in &raw.parameters {
            if !seen.insert(spec.name.as_str()) {
                return Err(DashError::parse(
                    id,
                    format!("parameter '{}' is declared more than once", spec.name),
                ));
            }
        }

        Ok(Self {
            id: id.to_string(),
            name,
            description: raw.description,
            body,
            parameters: raw.parameters,
        })
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn is_parameterized(&self) -> bool {
        !self.parameters.is_empty()
    }

    /// Names of the `{{name}}` placeholders in the body, in order of first use.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut rest = self.body.as_str();
        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                break;
            };
            let name = after[..end].trim();
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
            rest = &after[end + 2..];
        }
        names
    }

    /// Placeholders used in the body that have no parameter specification.
    pub fn undeclared_placeholders(&self) -> Vec<String> {
        self.placeholders()
            .into_iter()
            .filter(|name| self.parameter(name).is_none())
            .collect()
    }
}

/// Resolves query identifiers to definitions.
///
/// Implementations must be idempotent: loading the same id twice yields an
/// equal definition and has no other side effects.
pub trait DefinitionLoader: Send + Sync {
    fn load(&self, query_id: &str) -> Result<Arc<QueryDefinition>>;
}

/// Loads definitions from YAML files in a directory, once per id.
#[derive(Debug)]
pub struct YamlDefinitionLoader {
    directory: PathBuf,
    loaded: DashMap<String, Arc<QueryDefinition>>,
}

impl YamlDefinitionLoader {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            loaded: DashMap::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Number of definitions loaded so far
    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    /// List the ids of all definition files in the directory, sorted.
    pub fn list_ids(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.directory).map_err(|e| {
            DashError::Config(format!(
                "cannot read queries directory {}: {}",
                self.directory.display(),
                e
            ))
        })?;

        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| DEFINITION_EXTENSIONS.contains(&ext))
                    .unwrap_or(false)
            })
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    fn read_source(&self, query_id: &str) -> Result<String> {
        if query_id.is_empty()
            || query_id.starts_with('.')
            || query_id.contains(['/', '\\'])
            || query_id.contains("..")
        {
            return Err(DashError::not_found(query_id, "invalid query id"));
        }

        for ext in DEFINITION_EXTENSIONS {
            let path = self.directory.join(format!("{}.{}", query_id, ext));
            match std::fs::read_to_string(&path) {
                Ok(source) => return Ok(source),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(DashError::not_found(
                        query_id,
                        format!("{}: {}", path.display(), e),
                    ))
                }
            }
        }

        Err(DashError::not_found(
            query_id,
            format!("no definition file in {}", self.directory.display()),
        ))
    }
}

impl DefinitionLoader for YamlDefinitionLoader {
    fn load(&self, query_id: &str) -> Result<Arc<QueryDefinition>> {
        if let Some(definition) = self.loaded.get(query_id) {
            return Ok(Arc::clone(definition.value()));
        }

        let source = self.read_source(query_id)?;
        let definition = QueryDefinition::from_yaml(query_id, &source).map_err(|e| {
            tracing::error!("{}", e);
            e
        })?;

        let undeclared = definition.undeclared_placeholders();
        if !undeclared.is_empty() {
            tracing::warn!(
                query_id,
                "query body references undeclared placeholders: {}",
                undeclared.join(", ")
            );
        }

        let entry = self
            .loaded
            .entry(query_id.to_string())
            .or_insert_with(|| Arc::new(definition));
        Ok(Arc::clone(entry.value()))
    }
}

/// In-memory registry of definitions.
#[derive(Debug, Default)]
pub struct StaticDefinitionLoader {
    definitions: DashMap<String, Arc<QueryDefinition>>,
}

impl StaticDefinitionLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_definition(self, definition: QueryDefinition) -> Self {
        self.insert(definition);
        self
    }

    pub fn insert(&self, definition: QueryDefinition) {
        self.definitions
            .insert(definition.id.clone(), Arc::new(definition));
    }
}

impl DefinitionLoader for StaticDefinitionLoader {
    fn load(&self, query_id: &str) -> Result<Arc<QueryDefinition>> {
        self.definitions
            .get(query_id)
            .map(|d| Arc::clone(d.value()))
            .ok_or_else(|| DashError::not_found(query_id, "not registered"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SALES: &str = r#"
name: Sales by region
description: Daily totals
body: |
  SELECT day, SUM(total) FROM sales
  WHERE region IN UNNEST({{regions}}) AND year = {{ year }}
parameters:
  - name: regions
    type: STRING
    array_type: true
  - name: year
    type: int64
"#;

    #[test]
    fn test_parse_definition() {
        let def = QueryDefinition::from_yaml("sales", SALES).unwrap();
        assert_eq!(def.id, "sales");
        assert_eq!(def.name, "Sales by region");
        assert_eq!(def.parameters.len(), 2);
        assert_eq!(
            def.parameters[0],
            ParameterSpec::array("regions", ParameterType::String)
        );
        assert_eq!(
            def.parameters[1],
            ParameterSpec::scalar("year", ParameterType::Int64)
        );
        assert_eq!(def.placeholders(), vec!["regions", "year"]);
        assert!(def.undeclared_placeholders().is_empty());
    }

    #[test]
    fn test_parse_errors() {
        let err = QueryDefinition::from_yaml("q", "description: nothing else").unwrap_err();
        assert!(matches!(err, DashError::DefinitionParse { .. }));

        let err = QueryDefinition::from_yaml("q", "name: [unterminated").unwrap_err();
        assert!(matches!(err, DashError::DefinitionParse { .. }));

        let dup = "name: q\nbody: SELECT 1\nparameters:\n  - {name: a, type: INT64}\n  - {name: a, type: INT64}\n";
        let err = QueryDefinition::from_yaml("q", dup).unwrap_err();
        assert!(err.to_string().contains("more than once"));

        let bad_type = "name: q\nbody: SELECT 1\nparameters:\n  - {name: a, type: GEOGRAPHY}\n";
        assert!(QueryDefinition::from_yaml("q", bad_type).is_err());
    }

    #[test]
    fn test_undeclared_placeholders() {
        let def = QueryDefinition::new("q", "Q", "SELECT {{a}}, {{b}}, {{a}}")
            .with_parameter(ParameterSpec::scalar("a", ParameterType::Int64));
        assert_eq!(def.placeholders(), vec!["a", "b"]);
        assert_eq!(def.undeclared_placeholders(), vec!["b"]);
    }

    #[test]
    fn test_yaml_loader_memoizes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sales.yml"), SALES).unwrap();
        fs::write(dir.path().join("totals.yaml"), "name: Totals\nbody: SELECT 1\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loader = YamlDefinitionLoader::new(dir.path());
        let first = loader.load("sales").unwrap();
        fs::remove_file(dir.path().join("sales.yml")).unwrap();
        let second = loader.load("sales").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.load("totals").unwrap().body, "SELECT 1");
        assert_eq!(loader.loaded_count(), 2);
        assert_eq!(loader.list_ids().unwrap(), vec!["totals"]);
    }

    #[test]
    fn test_yaml_loader_errors() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.yml"), "name: [").unwrap();
        let loader = YamlDefinitionLoader::new(dir.path());

        assert!(matches!(
            loader.load("missing"),
            Err(DashError::DefinitionNotFound { .. })
        ));
        assert!(matches!(
            loader.load("../etc/passwd"),
            Err(DashError::DefinitionNotFound { .. })
        ));
        assert!(matches!(
            loader.load("broken"),
            Err(DashError::DefinitionParse { .. })
        ));
        assert_eq!(loader.loaded_count(), 0);
    }

    #[test]
    fn test_static_loader() {
        let loader = StaticDefinitionLoader::new()
            .with_definition(QueryDefinition::new("a", "A", "SELECT 1"));
        assert_eq!(loader.load("a").unwrap().name, "A");
        assert!(loader.load("b").is_err());
    }
}
