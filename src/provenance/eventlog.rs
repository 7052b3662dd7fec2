//! Append-only JSONL run event log.

use crate::core::types::{RunEvent, TimestampedEvent};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// RFC 3339 UTC timestamp with second precision.
pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Generate a run ID.
pub fn generate_run_id() -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .unsigned_abs();
    format!("r-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

/// Event log location inside an output directory.
pub fn event_log_path(output_dir: &Path) -> PathBuf {
    output_dir.join("events.jsonl")
}

/// Append one event as a JSON line. The line and its newline go out in a
/// single write so concurrent appenders never split a record.
pub fn append_event(output_dir: &Path, event: RunEvent) -> Result<(), String> {
    let path = event_log_path(output_dir);
    std::fs::create_dir_all(output_dir)
        .map_err(|e| format!("cannot create output dir: {}", e))?;

    let te = TimestampedEvent {
        ts: now_iso8601(),
        event,
    };
    let mut line =
        serde_json::to_string(&te).map_err(|e| format!("JSON serialize error: {}", e))?;
    line.push('\n');

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("cannot open event log {}: {}", path.display(), e))?;

    file.write_all(line.as_bytes())
        .map_err(|e| format!("write error: {}", e))?;

    Ok(())
}

/// Event sink for one run. Disabled sinks drop events; write failures are
/// logged and never interrupt the run.
///
/// Clones share one writer lock, so events from concurrent category tasks
/// are appended one at a time, on the blocking pool.
#[derive(Debug, Clone)]
pub struct EventSink {
    output_dir: Option<PathBuf>,
    run_id: String,
    writer: Arc<Mutex<()>>,
}

impl EventSink {
    pub fn new(output_dir: &Path, enabled: bool) -> Self {
        Self {
            output_dir: enabled.then(|| output_dir.to_path_buf()),
            run_id: generate_run_id(),
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn emit(&self, event: RunEvent) {
        let Some(dir) = self.output_dir.clone() else {
            return;
        };
        let _guard = self.writer.lock().await;
        let written = tokio::task::spawn_blocking(move || append_event(&dir, event)).await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("event log: {e}"),
            Err(e) => tracing::warn!("event log: writer task failed: {e}"),
        }
    }
}
