use crate::error::NrfuError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// One declarative catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDefinition {
    /// Unique name within the catalog; also the registry lookup key
    pub name: String,
    /// Registry namespace the test lives in
    pub module: String,
    /// Informational categories forwarded to the test instance
    #[serde(default)]
    pub categories: Vec<String>,
    /// Filterable tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-form inputs, shape defined by the test
    #[serde(default)]
    pub inputs: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    tests: Vec<TestDefinition>,
}

/// An ordered list of test definitions intended to run together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub tests: Vec<TestDefinition>,
}

impl Catalog {
    pub fn new(tests: Vec<TestDefinition>) -> Self {
        Self { tests }
    }

    /// Parse a YAML catalog document (top-level `tests` list) and
    /// validate it.
    pub fn from_yaml(content: &str) -> Result<Self, NrfuError> {
        let file: CatalogFile = serde_yaml::from_str(content)?;
        let catalog = Self::new(file.tests);
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load and parse a catalog file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, NrfuError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "loading catalog");
        Self::from_yaml(&content)
    }

    /// Check catalog invariants: at least one test, non-empty names and
    /// modules, names unique across the catalog.
    pub fn validate(&self) -> Result<(), NrfuError> {
        if self.tests.is_empty() {
            return Err(NrfuError::CatalogError(
                "catalog contains no tests".to_string(),
            ));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for def in &self.tests {
            if def.name.is_empty() {
                return Err(NrfuError::CatalogError(
                    "test with empty name".to_string(),
                ));
            }
            if def.module.is_empty() {
                return Err(NrfuError::CatalogError(format!(
                    "test '{}' has no module",
                    def.name
                )));
            }
            if !seen.insert(&def.name) {
                return Err(NrfuError::CatalogError(format!(
                    "duplicate test name '{}'",
                    def.name
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Tests whose name appears in `names` (exact match). An empty set
    /// returns the catalog unchanged.
    pub fn filter_by_names(&self, names: &HashSet<String>) -> Catalog {
        if names.is_empty() {
            return self.clone();
        }
        Catalog::new(
            self.tests
                .iter()
                .filter(|def| names.contains(&def.name))
                .cloned()
                .collect(),
        )
    }

    /// Tests whose module appears in `modules`. An empty set returns the
    /// catalog unchanged.
    pub fn filter_by_modules(&self, modules: &HashSet<String>) -> Catalog {
        if modules.is_empty() {
            return self.clone();
        }
        Catalog::new(
            self.tests
                .iter()
                .filter(|def| modules.contains(&def.module))
                .cloned()
                .collect(),
        )
    }

    /// Tests carrying at least one of `tags`. Any-match, unlike the
    /// exact-match name filter. An empty set returns the catalog
    /// unchanged.
    pub fn filter_by_tags(&self, tags: &HashSet<String>) -> Catalog {
        if tags.is_empty() {
            return self.clone();
        }
        Catalog::new(
            self.tests
                .iter()
                .filter(|def| def.tags.iter().any(|tag| tags.contains(tag)))
                .cloned()
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG_YAML: &str = r#"
tests:
  - name: uptime-floor
    module: system
    categories: [system]
    tags: [leaf, spine]
    inputs:
      minimum_uptime: 86400
  - name: bgp-evpn-peers
    module: bgp
    tags: [spine]
    inputs:
      expected_peers: 4
      vrf: default
  - name: mlag-healthy
    module: mlag
"#;

    fn catalog() -> Catalog {
        Catalog::from_yaml(CATALOG_YAML).unwrap()
    }

    fn set(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn parses_yaml_with_defaults() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.tests[0].name, "uptime-floor");
        assert_eq!(
            catalog.tests[0].inputs["minimum_uptime"],
            serde_json::json!(86400)
        );
        // Missing optional fields default
        assert!(catalog.tests[2].tags.is_empty());
        assert!(catalog.tests[2].inputs.is_null());
    }

    #[test]
    fn empty_catalog_rejected() {
        let err = Catalog::from_yaml("tests: []").unwrap_err();
        assert!(matches!(err, NrfuError::CatalogError(_)));
    }

    #[test]
    fn duplicate_names_rejected() {
        let yaml = r#"
tests:
  - {name: a, module: system}
  - {name: a, module: bgp}
"#;
        let err = Catalog::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn missing_module_rejected() {
        let yaml = r#"
tests:
  - {name: a, module: ""}
"#;
        assert!(Catalog::from_yaml(yaml).is_err());
    }

    #[test]
    fn name_filter_is_exact() {
        let filtered = catalog().filter_by_names(&set(&["uptime-floor"]));
        assert_eq!(filtered.len(), 1);
        // Substrings do not match
        let none = catalog().filter_by_names(&set(&["uptime"]));
        assert!(none.is_empty());
    }

    #[test]
    fn tag_filter_is_any_match() {
        let filtered = catalog().filter_by_tags(&set(&["leaf"]));
        assert_eq!(filtered.len(), 1);
        let filtered = catalog().filter_by_tags(&set(&["spine"]));
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn module_filter() {
        let filtered = catalog().filter_by_modules(&set(&["bgp", "mlag"]));
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn empty_filter_set_returns_original() {
        let empty = HashSet::new();
        assert_eq!(catalog().filter_by_names(&empty).len(), 3);
        assert_eq!(catalog().filter_by_modules(&empty).len(), 3);
        assert_eq!(catalog().filter_by_tags(&empty).len(), 3);
    }
}
