//! Category registry: the immutable, validated set of category definitions
//! for a run, and selection of the active subset.

use super::error::ConfigError;
use super::parser;
use super::types::CategoryDefinition;
use std::path::Path;

/// Which categories a run should process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every registered category
    All,
    /// Only these names (an empty list selects nothing)
    Only(Vec<String>),
}

impl Selection {
    /// Interpret a loosely-typed selection value. Anything other than a list
    /// of strings (absent, null, a scalar, a mixed list) selects everything.
    pub fn from_yaml(value: Option<&serde_yaml_ng::Value>) -> Self {
        let Some(serde_yaml_ng::Value::Sequence(items)) = value else {
            if value.is_some_and(|v| !v.is_null()) {
                tracing::warn!("run_categories is not a list of strings; running all categories");
            }
            return Self::All;
        };
        let mut names = Vec::with_capacity(items.len());
        for item in items {
            match item.as_str() {
                Some(s) => names.push(s.to_string()),
                None => {
                    tracing::warn!(
                        "run_categories contains a non-string entry; running all categories"
                    );
                    return Self::All;
                }
            }
        }
        Self::Only(names)
    }

    /// Selection from repeated CLI flags; no flags means no override.
    pub fn from_names(names: &[String]) -> Option<Self> {
        if names.is_empty() {
            None
        } else {
            Some(Self::Only(names.to_vec()))
        }
    }
}

/// Validated category definitions in declaration order.
#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    categories: Vec<CategoryDefinition>,
}

impl CategoryRegistry {
    /// Build a registry, rejecting duplicate names and blank queries.
    pub fn new(categories: Vec<CategoryDefinition>) -> Result<Self, ConfigError> {
        let errors = parser::validate_categories(&categories);
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }
        Ok(Self { categories })
    }

    /// Load and validate a category file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::new(parser::parse_categories_file(path)?)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&CategoryDefinition> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Categories to process, always in registry order. Selection order and
    /// repeated names have no effect; unknown names are logged and ignored.
    pub fn active_categories(&self, selection: &Selection) -> Vec<&CategoryDefinition> {
        match selection {
            Selection::All => self.categories.iter().collect(),
            Selection::Only(names) => {
                for name in names {
                    if self.get(name).is_none() {
                        tracing::warn!(category = %name, "selected category is not defined");
                    }
                }
                self.categories
                    .iter()
                    .filter(|c| names.iter().any(|n| n == &c.name))
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn def(name: &str) -> CategoryDefinition {
        CategoryDefinition {
            name: name.to_string(),
            query: format!("Resources | where category == '{name}'"),
            fields_for_ai: vec!["name".into()],
            fields_for_table: vec!["name".into()],
        }
    }

    fn abc() -> CategoryRegistry {
        CategoryRegistry::new(vec![def("A"), def("B"), def("C")]).unwrap()
    }

    fn names(active: &[&CategoryDefinition]) -> Vec<String> {
        active.iter().map(|c| c.name.clone()).collect()
    }

    #[test]
    fn test_all_in_declared_order() {
        let reg = abc();
        assert_eq!(names(&reg.active_categories(&Selection::All)), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_selection_uses_registry_order() {
        let reg = abc();
        let sel = Selection::Only(vec!["C".into(), "A".into()]);
        assert_eq!(names(&reg.active_categories(&sel)), vec!["A", "C"]);
    }

    #[test]
    fn test_empty_selection_selects_nothing() {
        let reg = abc();
        assert!(reg.active_categories(&Selection::Only(vec![])).is_empty());
    }

    #[test]
    fn test_unknown_and_repeated_names() {
        let reg = abc();
        let sel = Selection::Only(vec!["B".into(), "Z".into(), "B".into()]);
        assert_eq!(names(&reg.active_categories(&sel)), vec!["B"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = CategoryRegistry::new(vec![def("A"), def("A")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref e) if e.len() == 1));
    }

    #[test]
    fn test_blank_query_rejected() {
        let mut bad = def("A");
        bad.query = String::new();
        assert!(CategoryRegistry::new(vec![bad]).is_err());
    }

    #[test]
    fn test_selection_from_yaml_shapes() {
        assert_eq!(Selection::from_yaml(None), Selection::All);
        let null = serde_yaml_ng::Value::Null;
        assert_eq!(Selection::from_yaml(Some(&null)), Selection::All);

        let scalar: serde_yaml_ng::Value = serde_yaml_ng::from_str("VMs").unwrap();
        assert_eq!(Selection::from_yaml(Some(&scalar)), Selection::All);

        let mixed: serde_yaml_ng::Value = serde_yaml_ng::from_str("[VMs, 3]").unwrap();
        assert_eq!(Selection::from_yaml(Some(&mixed)), Selection::All);

        let empty: serde_yaml_ng::Value = serde_yaml_ng::from_str("[]").unwrap();
        assert_eq!(Selection::from_yaml(Some(&empty)), Selection::Only(vec![]));

        let list: serde_yaml_ng::Value = serde_yaml_ng::from_str("[VMs, Storage]").unwrap();
        assert_eq!(
            Selection::from_yaml(Some(&list)),
            Selection::Only(vec!["VMs".into(), "Storage".into()])
        );
    }

    #[test]
    fn test_selection_from_names() {
        assert_eq!(Selection::from_names(&[]), None);
        assert_eq!(
            Selection::from_names(&["A".to_string()]),
            Some(Selection::Only(vec!["A".into()]))
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.yaml");
        std::fs::write(&path, "categories:\n  - name: X\n    query: q\n").unwrap();
        let reg = CategoryRegistry::load(&path).unwrap();
        assert_eq!(reg.len(), 1);
        assert!(reg.get("X").is_some());
    }

    proptest! {
        #[test]
        fn active_is_ordered_subset_without_duplicates(
            picks in proptest::collection::vec(0usize..8, 0..12),
        ) {
            let registry_names: Vec<String> = (0..6).map(|i| format!("cat-{i}")).collect();
            let reg = CategoryRegistry::new(registry_names.iter().map(|n| def(n)).collect()).unwrap();
            // indexes 6 and 7 name categories that do not exist
            let selection = Selection::Only(picks.iter().map(|i| format!("cat-{i}")).collect());
            let active = names(&reg.active_categories(&selection));

            let positions: Vec<usize> = active
                .iter()
                .map(|n| registry_names.iter().position(|r| r == n).unwrap())
                .collect();
            prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
            for name in &active {
                prop_assert!(registry_names.contains(name));
            }
        }
    }
}
