//! Resource projection: restrict records to a field list.
//!
//! Every requested field appears in every projected record, in request
//! order. Absent and null source values become [`FieldValue::Null`], which
//! renders as an empty cell, so table columns stay aligned across rows.

use super::types::{FieldValue, ProjectedRecord, ResourceRecord};
use indexmap::IndexMap;

/// Project each record onto `fields`. Never fails and never drops a record.
pub fn project(records: &[ResourceRecord], fields: &[String]) -> Vec<ProjectedRecord> {
    records.iter().map(|r| project_one(r, fields)).collect()
}

/// Project a single record.
pub fn project_one(record: &ResourceRecord, fields: &[String]) -> ProjectedRecord {
    let mut cells = IndexMap::with_capacity(fields.len());
    for field in fields {
        let value = match record.get(field) {
            Some(v) if !v.is_null() => v.clone(),
            _ => FieldValue::Null,
        };
        // a repeated field name keeps its first position
        cells.entry(field.clone()).or_insert(value);
    }
    ProjectedRecord::from_cells(cells)
}

/// Default columns tried when a category declares no table fields.
pub const DEFAULT_TABLE_FIELDS: [&str; 4] = ["name", "location", "type", "resourceGroup"];

/// Columns to use when `fields_for_table` is empty: the default columns
/// present in the first record, else that record's first four keys.
pub fn fallback_table_fields(records: &[ResourceRecord]) -> Vec<String> {
    let Some(first) = records.first() else {
        return Vec::new();
    };
    let defaults: Vec<String> = DEFAULT_TABLE_FIELDS
        .iter()
        .filter(|f| first.contains_key(**f))
        .map(|f| f.to_string())
        .collect();
    if !defaults.is_empty() {
        return defaults;
    }
    first.keys().take(4).cloned().collect()
}

/// Fields to expose to the model when `fields_for_ai` is empty: every key
/// of the first record.
pub fn fallback_ai_fields(records: &[ResourceRecord]) -> Vec<String> {
    records
        .first()
        .map(|r| r.keys().cloned().collect())
        .unwrap_or_default()
}
