//! Category processor: drives one category from query to rendered rows.
//!
//! `Pending -> Querying -> Summarizing -> Rendering -> Done`
//!
//! - A query failure ends the category in `Failure` with no narrative.
//! - Zero records skip summarizing and end in `Success` with a header-only
//!   table and a fixed narrative.
//! - A generation failure degrades to `PartialFailure`; the table is still
//!   rendered.
//!
//! Nothing a category does can fail its siblings: every outcome is a
//! [`CategoryResult`].

use super::projector;
use super::prompt;
use super::retry::with_retry;
use super::types::{CategoryDefinition, CategoryResult, CategoryStatus, ResourceRecord, RetryPolicy};
use crate::providers::{InventoryService, NarrativeService};
use std::fmt;
use std::sync::Arc;

/// Narrative for a category whose query returned nothing.
pub const NO_RESOURCES_NARRATIVE: &str = "No resources found in this category.";

/// Prefix of the narrative used when generation fails.
pub const UNAVAILABLE_PREFIX: &str = "AI summary unavailable: ";

/// Processing stage, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Querying,
    Summarizing,
    Rendering,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Querying => write!(f, "querying"),
            Self::Summarizing => write!(f, "summarizing"),
            Self::Rendering => write!(f, "rendering"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Shared collaborators for processing categories. Cheap to clone.
#[derive(Clone)]
pub struct CategoryProcessor {
    inventory: Arc<dyn InventoryService>,
    narrative: Arc<dyn NarrativeService>,
    retry: RetryPolicy,
}

impl CategoryProcessor {
    pub fn new(
        inventory: Arc<dyn InventoryService>,
        narrative: Arc<dyn NarrativeService>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inventory,
            narrative,
            retry,
        }
    }

    /// The narrative collaborator, shared with the executive summary step.
    pub fn narrative(&self) -> &Arc<dyn NarrativeService> {
        &self.narrative
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Process one category to a terminal result.
    pub async fn process(&self, category: &CategoryDefinition) -> CategoryResult {
        let name = category.name.as_str();
        trace_stage(name, Stage::Pending);

        trace_stage(name, Stage::Querying);
        let inventory = Arc::clone(&self.inventory);
        let query = category.query.as_str();
        let records = match with_retry(&self.retry, "inventory", || inventory.execute(query)).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(category = %name, kind = %e.kind, "inventory query failed: {}", e.reason);
                trace_stage(name, Stage::Done);
                return CategoryResult::failure(name, category.fields_for_table.clone(), e.to_string());
            }
        };
        tracing::info!(category = %name, records = records.len(), "inventory retrieved");

        if records.is_empty() {
            trace_stage(name, Stage::Done);
            return CategoryResult {
                name: name.to_string(),
                status: CategoryStatus::Success,
                reason: None,
                narrative: Some(NO_RESOURCES_NARRATIVE.to_string()),
                columns: category.fields_for_table.clone(),
                rows: Vec::new(),
            };
        }

        trace_stage(name, Stage::Summarizing);
        let (narrative, status, reason) = match self.summarize(category, &records).await {
            Ok(text) => (text, CategoryStatus::Success, None),
            Err(reason) => {
                tracing::warn!(category = %name, "narrative unavailable: {reason}");
                (
                    format!("{UNAVAILABLE_PREFIX}{reason}"),
                    CategoryStatus::PartialFailure,
                    Some(reason),
                )
            }
        };

        trace_stage(name, Stage::Rendering);
        let columns = if category.fields_for_table.is_empty() {
            let fallback = projector::fallback_table_fields(&records);
            tracing::debug!(category = %name, columns = ?fallback, "no table fields configured, using defaults");
            fallback
        } else {
            category.fields_for_table.clone()
        };
        let rows = projector::project(&records, &columns);

        trace_stage(name, Stage::Done);
        CategoryResult {
            name: name.to_string(),
            status,
            reason,
            narrative: Some(narrative),
            columns,
            rows,
        }
    }

    async fn summarize(
        &self,
        category: &CategoryDefinition,
        records: &[ResourceRecord],
    ) -> Result<String, String> {
        let fields = if category.fields_for_ai.is_empty() {
            projector::fallback_ai_fields(records)
        } else {
            category.fields_for_ai.clone()
        };
        let projected = projector::project(records, &fields);
        let prompt = prompt::category_prompt(&category.name, records, &projected);

        let narrative = Arc::clone(&self.narrative);
        let text = with_retry(&self.retry, "narrative", || narrative.generate(&prompt))
            .await
            .map_err(|e| e.to_string())?;

        let text = text.trim();
        if text.is_empty() {
            return Err("model returned empty text".to_string());
        }
        Ok(text.to_string())
    }
}

fn trace_stage(category: &str, stage: Stage) {
    tracing::debug!(category = %category, stage = %stage, "category stage");
}
