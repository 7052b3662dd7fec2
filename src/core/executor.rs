//! Run coordinator: resolve active categories, process each in isolation,
//! assemble the report, and write the artifacts.
//!
//! registry -> selection -> for each category: processor -> results (in
//! registry order) -> executive summary -> report -> markdown -> docx -> events

use super::output;
use super::processor::{CategoryProcessor, NO_RESOURCES_NARRATIVE};
use super::prompt;
use super::registry::{CategoryRegistry, Selection};
use super::report;
use super::retry::with_retry;
use super::types::*;
use crate::provenance::eventlog::EventSink;
use crate::provenance::hasher;
use crate::providers::DocumentConverter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Executive summary text when no category produced an analysis.
pub const NO_EXECUTIVE_INPUT: &str =
    "An executive summary could not be generated because no category produced an analysis.";

/// Prefix of the executive summary when generation fails.
pub const EXECUTIVE_UNAVAILABLE_PREFIX: &str = "Executive summary unavailable: ";

/// Everything a run needs besides the registry and selection.
pub struct Coordinator {
    pub processor: CategoryProcessor,
    /// Maximum categories in flight (at least 1)
    pub concurrency: usize,
    pub executive_summary: bool,
    pub events: EventSink,
}

/// Artifacts and counts from a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report_path: PathBuf,
    pub document_path: Option<PathBuf>,
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
}

impl RunOutcome {
    pub fn any_failed(&self) -> bool {
        self.failed > 0
    }
}

impl Coordinator {
    /// Process the active categories and assemble the report. Never fails:
    /// every category yields a result, in registry order.
    pub async fn run(
        &self,
        registry: &CategoryRegistry,
        selection: &Selection,
        mut header: ReportHeader,
    ) -> Report {
        let active: Vec<CategoryDefinition> = registry
            .active_categories(selection)
            .into_iter()
            .cloned()
            .collect();

        self.events.emit(RunEvent::RunStarted {
            run_id: self.events.run_id().to_string(),
            subscription: header.subscription_id.clone(),
            categories: active.len(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
        .await;
        tracing::info!(
            categories = active.len(),
            concurrency = self.concurrency,
            "starting run"
        );

        let results = self.process_all(active).await;

        if self.executive_summary {
            header.executive_summary = Some(self.executive_summary(&results).await);
        }

        report::assemble(results, header)
    }

    async fn process_all(&self, categories: Vec<CategoryDefinition>) -> Vec<CategoryResult> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let mut pending: Vec<(String, Vec<String>, JoinHandle<CategoryResult>)> = Vec::new();

        // permits are taken in declared order, so categories start in order
        for category in categories {
            let permit = Arc::clone(&semaphore).acquire_owned().await.ok();
            let processor = self.processor.clone();
            let events = self.events.clone();
            let name = category.name.clone();
            let columns = category.fields_for_table.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                process_logged(&processor, &events, &category).await
            });
            pending.push((name, columns, handle));
        }

        let mut results = Vec::with_capacity(pending.len());
        for (name, columns, handle) in pending {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    let reason = if e.is_panic() {
                        "internal error: category task panicked".to_string()
                    } else {
                        format!("internal error: {e}")
                    };
                    tracing::error!(category = %name, "{reason}");
                    self.events.emit(RunEvent::CategoryCompleted {
                        run_id: self.events.run_id().to_string(),
                        category: name.clone(),
                        status: CategoryStatus::Failure,
                        records: 0,
                        reason: Some(reason.clone()),
                        duration_seconds: 0.0,
                    })
                    .await;
                    CategoryResult::failure(&name, columns, reason)
                }
            };
            results.push(result);
        }
        results
    }

    async fn executive_summary(&self, results: &[CategoryResult]) -> String {
        let usable: Vec<(&str, &str)> = results
            .iter()
            .filter(|r| r.status == CategoryStatus::Success)
            .filter_map(|r| {
                r.narrative
                    .as_deref()
                    .filter(|n| *n != NO_RESOURCES_NARRATIVE)
                    .map(|n| (r.name.as_str(), n))
            })
            .collect();

        let Some(prompt) = prompt::executive_prompt(&usable) else {
            tracing::info!("no category analyses available for the executive summary");
            return NO_EXECUTIVE_INPUT.to_string();
        };

        let narrative = self.processor.narrative();
        match with_retry(self.processor.retry_policy(), "executive", || narrative.generate(&prompt)).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => format!("{EXECUTIVE_UNAVAILABLE_PREFIX}model returned empty text"),
            Err(e) => {
                tracing::warn!("executive summary unavailable: {e}");
                format!("{EXECUTIVE_UNAVAILABLE_PREFIX}{e}")
            }
        }
    }

    /// Full run: ensure the output directory, process categories, write the
    /// Markdown report and the optional converted document.
    ///
    /// Errors only when the report itself cannot be written.
    pub async fn run_and_write(
        &self,
        registry: &CategoryRegistry,
        selection: &Selection,
        subscription_id: &str,
        output_dir: &Path,
        converter: Option<&dyn DocumentConverter>,
    ) -> Result<RunOutcome, String> {
        let start = Instant::now();
        output::ensure_dir(output_dir)?;

        let generated_at = chrono::Utc::now();
        let header = ReportHeader::new(subscription_id, generated_at);
        let report = self.run(registry, selection, header).await;

        let markdown = report::render_markdown(&report);
        let stem = output::report_stem(subscription_id, generated_at);
        let report_path = output::artifact_path(output_dir, &stem, "md");
        output::write_atomic(&report_path, markdown.as_bytes())?;
        tracing::info!(path = %report_path.display(), "report written");
        self.events.emit(RunEvent::ReportWritten {
            run_id: self.events.run_id().to_string(),
            path: report_path.display().to_string(),
            hash: hasher::hash_string(&markdown),
        })
        .await;

        let document_path = match converter {
            Some(converter) => self.convert(converter, &markdown, output_dir, &stem).await,
            None => {
                tracing::debug!("document conversion disabled");
                None
            }
        };

        let outcome = RunOutcome {
            report_path,
            document_path,
            succeeded: report.count(CategoryStatus::Success),
            partial: report.count(CategoryStatus::PartialFailure),
            failed: report.count(CategoryStatus::Failure),
        };
        self.events.emit(RunEvent::RunCompleted {
            run_id: self.events.run_id().to_string(),
            succeeded: outcome.succeeded as u32,
            partial: outcome.partial as u32,
            failed: outcome.failed as u32,
            total_seconds: start.elapsed().as_secs_f64(),
        })
        .await;
        tracing::info!(
            succeeded = outcome.succeeded,
            partial = outcome.partial,
            failed = outcome.failed,
            "run complete"
        );
        Ok(outcome)
    }

    async fn convert(
        &self,
        converter: &dyn DocumentConverter,
        markdown: &str,
        output_dir: &Path,
        stem: &str,
    ) -> Option<PathBuf> {
        let path = output::artifact_path(output_dir, stem, converter.extension());
        let written = match converter.convert(markdown).await {
            Ok(bytes) => output::write_atomic(&path, &bytes).map(|()| hasher::hash_bytes(&bytes)),
            Err(e) => Err(e.to_string()),
        };
        match written {
            Ok(hash) => {
                tracing::info!(path = %path.display(), "document written");
                self.events
                    .emit(RunEvent::DocumentWritten {
                        run_id: self.events.run_id().to_string(),
                        path: path.display().to_string(),
                        hash,
                    })
                    .await;
                Some(path)
            }
            Err(reason) => {
                tracing::warn!("document conversion skipped: {reason}");
                self.events.emit(RunEvent::ConversionSkipped {
                    run_id: self.events.run_id().to_string(),
                    reason,
                })
                .await;
                None
            }
        }
    }
}

async fn process_logged(
    processor: &CategoryProcessor,
    events: &EventSink,
    category: &CategoryDefinition,
) -> CategoryResult {
    let start = Instant::now();
    tracing::info!(category = %category.name, "processing category");
    events.emit(RunEvent::CategoryStarted {
        run_id: events.run_id().to_string(),
        category: category.name.clone(),
    })
    .await;

    let result = processor.process(category).await;
    let duration = start.elapsed().as_secs_f64();

    tracing::info!(
        category = %category.name,
        status = %result.status,
        records = result.rows.len(),
        "category finished in {duration:.2}s"
    );
    events.emit(RunEvent::CategoryCompleted {
        run_id: events.run_id().to_string(),
        category: category.name.clone(),
        status: result.status,
        records: result.rows.len(),
        reason: result.reason.clone(),
        duration_seconds: duration,
    })
    .await;
    result
}
