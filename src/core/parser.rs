//! Category file and run config parsing and validation.
//!
//! Parses categories.yaml / cloudscribe.yaml and validates structural
//! constraints:
//! - Category names must be non-empty and unique
//! - Every category must carry a non-blank query
//! - Table field names must not repeat within a category
//! - Concurrency must be at least 1

use super::error::ConfigError;
use super::types::*;
use std::collections::HashSet;
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a category file from disk.
pub fn parse_categories_file(path: &Path) -> Result<Vec<CategoryDefinition>, ConfigError> {
    let content = read_file(path)?;
    parse_categories(&content).map_err(|e| match e {
        ConfigError::Parse { message, .. } => ConfigError::Parse {
            origin: path.display().to_string(),
            message,
        },
        other => other,
    })
}

/// Parse category definitions from YAML (or JSON) text.
pub fn parse_categories(yaml: &str) -> Result<Vec<CategoryDefinition>, ConfigError> {
    let file: CategoriesFile = serde_yaml_ng::from_str(yaml).map_err(|e| ConfigError::Parse {
        origin: "categories".to_string(),
        message: e.to_string(),
    })?;
    Ok(file.into_definitions())
}

/// Validate category definitions. Returns a list of errors (empty = valid).
pub fn validate_categories(categories: &[CategoryDefinition]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for (idx, category) in categories.iter().enumerate() {
        if category.name.trim().is_empty() {
            errors.push(ValidationError {
                message: format!("category #{} has an empty name", idx + 1),
            });
        } else if !seen.insert(category.name.as_str()) {
            errors.push(ValidationError {
                message: format!("duplicate category '{}'", category.name),
            });
        }

        if category.query.trim().is_empty() {
            errors.push(ValidationError {
                message: format!("category '{}' has no query", category.name),
            });
        }

        let mut columns: HashSet<&str> = HashSet::new();
        for field in &category.fields_for_table {
            if !columns.insert(field.as_str()) {
                errors.push(ValidationError {
                    message: format!(
                        "category '{}' lists table field '{}' more than once",
                        category.name, field
                    ),
                });
            }
        }
    }

    errors
}

/// Parse a run config file from disk.
pub fn parse_run_config_file(path: &Path) -> Result<RunConfig, ConfigError> {
    let content = read_file(path)?;
    serde_yaml_ng::from_str(&content).map_err(|e| ConfigError::Parse {
        origin: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Apply `GEMINI_API_KEY` / `AZURE_SUBSCRIPTION_ID` overrides from a lookup
/// (the process environment in production).
pub fn apply_env_overrides<F>(config: &mut RunConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup("GEMINI_API_KEY").filter(|v| !v.trim().is_empty()) {
        config.gemini_api_key = Some(key);
    }
    if let Some(sub) = lookup("AZURE_SUBSCRIPTION_ID").filter(|v| !v.trim().is_empty()) {
        config.subscription_id = Some(sub);
    }
}

/// Validate a run config. Returns a list of errors (empty = valid).
pub fn validate_run_config(config: &RunConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config
        .subscription_id
        .as_deref()
        .is_none_or(|s| s.trim().is_empty())
    {
        errors.push(ValidationError {
            message: "subscription_id must be set".to_string(),
        });
    }

    if config.concurrency == 0 {
        errors.push(ValidationError {
            message: "concurrency must be at least 1".to_string(),
        });
    }

    if config.az_timeout_secs == 0 {
        errors.push(ValidationError {
            message: "az_timeout_secs must be at least 1".to_string(),
        });
    }

    if config.gemini.model.trim().is_empty() {
        errors.push(ValidationError {
            message: "gemini.model must not be empty".to_string(),
        });
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_categories() {
        let yaml = r#"
categories:
  - name: VMs
    query: "Resources | where type =~ 'microsoft.compute/virtualmachines'"
    fields_for_ai: [name, vmSize]
    fields_for_table: [name, osType]
"#;
        let categories = parse_categories(yaml).unwrap();
        assert_eq!(categories.len(), 1);
        let errors = validate_categories(&categories);
        assert!(
            errors.is_empty(),
            "unexpected errors: {:?}",
            errors.iter().map(|e| &e.message).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_duplicate_names() {
        let yaml = r#"
categories:
  - name: A
    query: q1
  - name: A
    query: q2
"#;
        let categories = parse_categories(yaml).unwrap();
        let errors = validate_categories(&categories);
        assert!(errors.iter().any(|e| e.message.contains("duplicate category 'A'")));
    }

    #[test]
    fn test_missing_query() {
        let yaml = r#"
categories:
  - name: NoQuery
    fields_for_table: [name]
  - name: BlankQuery
    query: "   "
"#;
        let categories = parse_categories(yaml).unwrap();
        let errors = validate_categories(&categories);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.message.contains("has no query")));
    }

    #[test]
    fn test_repeated_table_field() {
        let yaml = r#"
categories:
  - name: VMs
    query: q
    fields_for_ai: [name, name]
    fields_for_table: [name, osType, name]
"#;
        let categories = parse_categories(yaml).unwrap();
        let errors = validate_categories(&categories);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("table field 'name' more than once"));
    }

    #[test]
    fn test_empty_name() {
        let categories = vec![CategoryDefinition {
            name: " ".into(),
            query: "q".into(),
            fields_for_ai: vec![],
            fields_for_table: vec![],
        }];
        let errors = validate_categories(&categories);
        assert!(errors.iter().any(|e| e.message.contains("empty name")));
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = parse_categories("not: [valid: yaml: {{");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_parse_categories_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.yaml");
        std::fs::write(
            &path,
            r#"
categories:
  - name: Storage
    query: "Resources | where type =~ 'microsoft.storage/storageaccounts'"
"#,
        )
        .unwrap();
        let categories = parse_categories_file(&path).unwrap();
        assert_eq!(categories[0].name, "Storage");
    }

    #[test]
    fn test_parse_categories_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = parse_categories_file(&dir.path().join("nope.yaml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_run_config_requires_subscription() {
        let config = RunConfig::default();
        let errors = validate_run_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("subscription_id")));
    }

    #[test]
    fn test_run_config_zero_concurrency() {
        let config: RunConfig =
            serde_yaml_ng::from_str("subscription_id: abc\nconcurrency: 0").unwrap();
        let errors = validate_run_config(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("concurrency"));
    }

    #[test]
    fn test_run_config_az_timeout() {
        let config: RunConfig = serde_yaml_ng::from_str("subscription_id: abc").unwrap();
        assert_eq!(config.az_timeout_secs, 300);

        let config: RunConfig =
            serde_yaml_ng::from_str("subscription_id: abc\naz_timeout_secs: 0").unwrap();
        let errors = validate_run_config(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("az_timeout_secs"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RunConfig {
            gemini_api_key: Some("from-file".into()),
            ..RunConfig::default()
        };
        apply_env_overrides(&mut config, |name| match name {
            "GEMINI_API_KEY" => Some("from-env".into()),
            "AZURE_SUBSCRIPTION_ID" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.gemini_api_key.as_deref(), Some("from-env"));
        assert!(config.subscription_id.is_none(), "blank env value is ignored");
    }

    #[test]
    fn test_parse_run_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloudscribe.yaml");
        std::fs::write(
            &path,
            "subscription_id: 1234-abcd\nconcurrency: 4\nrun_categories: [VMs]\n",
        )
        .unwrap();
        let config = parse_run_config_file(&path).unwrap();
        assert_eq!(config.concurrency, 4);
        assert!(validate_run_config(&config).is_empty());
    }
}
