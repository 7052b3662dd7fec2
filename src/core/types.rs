//! Types for category definitions, resource records, per-category results,
//! the assembled report, run configuration, and run events.
//!
//! Everything that is read from disk derives Serialize/Deserialize so the
//! YAML and JSON shapes round-trip.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Category registry document
// ============================================================================

/// A named grouping of cloud resources with its own query and field rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    /// Unique human-readable name (section title and selection key)
    pub name: String,

    /// Opaque query forwarded verbatim to the inventory service
    #[serde(default)]
    pub query: String,

    /// Fields exposed to narrative generation
    #[serde(default)]
    pub fields_for_ai: Vec<String>,

    /// Table columns, in column order
    #[serde(default)]
    pub fields_for_table: Vec<String>,
}

/// Category body in the keyed form, where the name is the mapping key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryBody {
    #[serde(default)]
    pub query: String,

    #[serde(default)]
    pub fields_for_ai: Vec<String>,

    #[serde(default)]
    pub fields_for_table: Vec<String>,
}

/// On-disk category file. Either a `categories:` list or a mapping keyed by
/// category name (the older JSON layout).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CategoriesFile {
    Listed { categories: Vec<CategoryDefinition> },
    Keyed(IndexMap<String, CategoryBody>),
}

impl CategoriesFile {
    /// Flatten into definitions, preserving declaration order.
    pub fn into_definitions(self) -> Vec<CategoryDefinition> {
        match self {
            Self::Listed { categories } => categories,
            Self::Keyed(map) => map
                .into_iter()
                .map(|(name, body)| CategoryDefinition {
                    name,
                    query: body.query,
                    fields_for_ai: body.fields_for_ai,
                    fields_for_table: body.fields_for_table,
                })
                .collect(),
        }
    }
}

// ============================================================================
// Resource records
// ============================================================================

/// A single field value in a schema-less resource record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    List(Vec<FieldValue>),
    Map(IndexMap<String, FieldValue>),
}

/// Separator used when a list value is flattened into one display cell.
pub const LIST_SEPARATOR: &str = ", ";

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Null, blank text, or an empty collection.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            Self::List(v) => v.is_empty(),
            Self::Map(m) => m.is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }

    /// Render as a single display string. Lists are joined with
    /// [`LIST_SEPARATOR`]; maps are rendered as compact JSON.
    pub fn display(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
            Self::List(items) => items
                .iter()
                .map(FieldValue::display)
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR),
            Self::Map(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

/// One resource as returned by the inventory service. Field order follows
/// the query's projection.
pub type ResourceRecord = IndexMap<String, FieldValue>;

/// A record restricted to a requested field list. Every requested field is
/// present; absent or null source values hold [`FieldValue::Null`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedRecord {
    cells: IndexMap<String, FieldValue>,
}

impl ProjectedRecord {
    pub(crate) fn from_cells(cells: IndexMap<String, FieldValue>) -> Self {
        Self { cells }
    }

    /// Value for a projected field; `Null` if the field was not requested.
    pub fn get(&self, field: &str) -> &FieldValue {
        static NULL: FieldValue = FieldValue::Null;
        self.cells.get(field).unwrap_or(&NULL)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// One display string per column, in column order. Columns that were
    /// not projected render empty.
    pub fn display_row(&self, columns: &[String]) -> Vec<String> {
        columns.iter().map(|c| self.get(c).display()).collect()
    }

    /// View as a plain record (used to re-project).
    pub fn as_record(&self) -> &ResourceRecord {
        &self.cells
    }
}

// ============================================================================
// Category results
// ============================================================================

/// Terminal status of one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    Success,
    PartialFailure,
    Failure,
}

impl fmt::Display for CategoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::PartialFailure => write!(f, "PARTIAL"),
            Self::Failure => write!(f, "FAILED"),
        }
    }
}

/// Output of processing one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryResult {
    /// Category name
    pub name: String,

    /// Terminal status
    pub status: CategoryStatus,

    /// Why the category did not fully succeed
    pub reason: Option<String>,

    /// Narrative text; `None` only for `Failure`
    pub narrative: Option<String>,

    /// Table column headers
    pub columns: Vec<String>,

    /// Table rows in inventory order
    pub rows: Vec<ProjectedRecord>,
}

impl CategoryResult {
    /// A failed category: no narrative, no rows.
    pub fn failure(name: &str, columns: Vec<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CategoryStatus::Failure,
            reason: Some(reason.into()),
            narrative: None,
            columns,
            rows: Vec::new(),
        }
    }
}

// ============================================================================
// Report
// ============================================================================

/// Report header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportHeader {
    /// Subscription the inventory was taken from
    pub subscription_id: String,

    /// When the report was generated
    pub generated_at: DateTime<Utc>,

    /// Optional run-wide executive summary
    pub executive_summary: Option<String>,
}

impl ReportHeader {
    pub fn new(subscription_id: &str, generated_at: DateTime<Utc>) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            generated_at,
            executive_summary: None,
        }
    }
}

/// The assembled report: header plus one section per attempted category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub header: ReportHeader,
    pub sections: Vec<CategoryResult>,
}

impl Report {
    pub fn count(&self, status: CategoryStatus) -> usize {
        self.sections.iter().filter(|s| s.status == status).count()
    }
}

// ============================================================================
// Run configuration
// ============================================================================

/// Process configuration for a run (`cloudscribe.yaml`). Uppercase aliases
/// accept the older `config.json` keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Subscription to inventory
    #[serde(default, alias = "AZURE_SUBSCRIPTION_ID")]
    pub subscription_id: Option<String>,

    /// Seconds allowed for each `az` invocation before it is killed
    #[serde(default = "default_az_timeout_secs")]
    pub az_timeout_secs: u64,

    /// Gemini API key (the `GEMINI_API_KEY` env var overrides this)
    #[serde(default, alias = "GEMINI_API_KEY")]
    pub gemini_api_key: Option<String>,

    /// Narrative model settings
    #[serde(default)]
    pub gemini: GeminiSettings,

    /// Explicit pandoc executable
    #[serde(default, alias = "PANDOC_EXE_PATH")]
    pub pandoc_path: Option<String>,

    /// Category selection. Only a list of strings selects; any other shape
    /// means "all categories".
    #[serde(default, alias = "RUN_CATEGORIES")]
    pub run_categories: Option<serde_yaml_ng::Value>,

    /// Where reports and the event log are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Maximum categories in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Retry policy for transient collaborator errors
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Generate a run-wide executive summary
    #[serde(default = "default_true")]
    pub executive_summary: bool,

    /// Append run events to `<output_dir>/events.jsonl`
    #[serde(default = "default_true")]
    pub run_log: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            subscription_id: None,
            az_timeout_secs: default_az_timeout_secs(),
            gemini_api_key: None,
            gemini: GeminiSettings::default(),
            pandoc_path: None,
            run_categories: None,
            output_dir: default_output_dir(),
            concurrency: default_concurrency(),
            retry: RetryPolicy::default(),
            executive_summary: true,
            run_log: true,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("OUTPUT")
}

fn default_az_timeout_secs() -> u64 {
    300
}

fn default_concurrency() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// Gemini endpoint and model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiSettings {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

/// Bounded retry for transient transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    1
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

// ============================================================================
// Run events
// ============================================================================

/// Run event for the JSONL event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        subscription: String,
        categories: usize,
        version: String,
    },
    CategoryStarted {
        run_id: String,
        category: String,
    },
    CategoryCompleted {
        run_id: String,
        category: String,
        status: CategoryStatus,
        records: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        duration_seconds: f64,
    },
    ReportWritten {
        run_id: String,
        path: String,
        hash: String,
    },
    DocumentWritten {
        run_id: String,
        path: String,
        hash: String,
    },
    ConversionSkipped {
        run_id: String,
        reason: String,
    },
    RunCompleted {
        run_id: String,
        succeeded: u32,
        partial: u32,
        failed: u32,
        total_seconds: f64,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: RunEvent,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_listed_form() {
        let yaml = r#"
categories:
  - name: Virtual Machines
    query: "Resources | where type =~ 'microsoft.compute/virtualmachines'"
    fields_for_ai: [name, vmSize]
    fields_for_table: [name, location]
  - name: Storage
    query: "Resources | where type =~ 'microsoft.storage/storageaccounts'"
"#;
        let file: CategoriesFile = serde_yaml_ng::from_str(yaml).unwrap();
        let defs = file.into_definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "Virtual Machines");
        assert_eq!(defs[0].fields_for_table, vec!["name", "location"]);
        assert!(defs[1].fields_for_ai.is_empty());
    }

    #[test]
    fn test_categories_keyed_json_form_preserves_order() {
        let json = r#"{
  "Zeta": {"query": "Resources | take 1", "fields_for_ai": ["name"]},
  "Alpha": {"query": "Resources | take 2", "fields_for_table": ["name", "type"]}
}"#;
        let file: CategoriesFile = serde_yaml_ng::from_str(json).unwrap();
        let names: Vec<_> = file.into_definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["Zeta", "Alpha"]);
    }

    #[test]
    fn test_field_value_from_json() {
        let json = r#"{"name":"vm1","cores":4,"public":false,"zones":["1","2"],"tags":{"env":"prod"},"osType":null}"#;
        let record: ResourceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record["name"], FieldValue::from("vm1"));
        assert_eq!(record["cores"], FieldValue::from(4));
        assert_eq!(record["public"], FieldValue::Bool(false));
        assert!(matches!(record["zones"], FieldValue::List(ref v) if v.len() == 2));
        assert!(matches!(record["tags"], FieldValue::Map(_)));
        assert!(record["osType"].is_null());
        let keys: Vec<_> = record.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["name", "cores", "public", "zones", "tags", "osType"]);
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::Null.display(), "");
        assert_eq!(FieldValue::Bool(true).display(), "true");
        assert_eq!(FieldValue::from(42).display(), "42");
        let list = FieldValue::List(vec!["a".into(), "b".into(), FieldValue::from(3)]);
        assert_eq!(list.display(), "a, b, 3");
        let map: FieldValue = serde_json::from_str(r#"{"env":"prod","tier":1}"#).unwrap();
        assert_eq!(map.display(), r#"{"env":"prod","tier":1}"#);
    }

    #[test]
    fn test_field_value_is_empty() {
        assert!(FieldValue::Null.is_empty());
        assert!(FieldValue::from("").is_empty());
        assert!(FieldValue::List(vec![]).is_empty());
        assert!(!FieldValue::Bool(false).is_empty());
        assert!(!FieldValue::from(0).is_empty());
    }

    #[test]
    fn test_category_status_display() {
        assert_eq!(CategoryStatus::Success.to_string(), "SUCCESS");
        assert_eq!(CategoryStatus::PartialFailure.to_string(), "PARTIAL");
        assert_eq!(CategoryStatus::Failure.to_string(), "FAILED");
    }

    #[test]
    fn test_failure_result_has_no_narrative() {
        let r = CategoryResult::failure("VMs", vec!["name".into()], "auth");
        assert_eq!(r.status, CategoryStatus::Failure);
        assert!(r.narrative.is_none());
        assert!(r.rows.is_empty());
        assert_eq!(r.reason.as_deref(), Some("auth"));
    }

    #[test]
    fn test_run_config_defaults() {
        let config: RunConfig = serde_yaml_ng::from_str("subscription_id: abc").unwrap();
        assert_eq!(config.subscription_id.as_deref(), Some("abc"));
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.output_dir, PathBuf::from("OUTPUT"));
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.gemini.model, "gemini-1.5-flash");
        assert!(config.executive_summary);
        assert!(config.run_log);
        assert!(config.run_categories.is_none());
    }

    #[test]
    fn test_run_config_legacy_keys() {
        let json = r#"{
  "GEMINI_API_KEY": "k-123",
  "AZURE_SUBSCRIPTION_ID": "0000-1111",
  "PANDOC_EXE_PATH": "/usr/local/bin/pandoc",
  "RUN_CATEGORIES": ["Storage"]
}"#;
        let config: RunConfig = serde_yaml_ng::from_str(json).unwrap();
        assert_eq!(config.gemini_api_key.as_deref(), Some("k-123"));
        assert_eq!(config.subscription_id.as_deref(), Some("0000-1111"));
        assert_eq!(config.pandoc_path.as_deref(), Some("/usr/local/bin/pandoc"));
        assert!(config.run_categories.is_some());
    }

    #[test]
    fn test_run_event_serde() {
        let event = RunEvent::CategoryCompleted {
            run_id: "r-abc".to_string(),
            category: "VMs".to_string(),
            status: CategoryStatus::PartialFailure,
            records: 2,
            reason: Some("quota".to_string()),
            duration_seconds: 0.5,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"category_completed\""));
        assert!(json.contains("\"status\":\"partial_failure\""));
    }
}
