//! Output artifacts: report naming and atomic writes.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

const UNKNOWN_SUB: &str = "UnknownSub";

/// Report file stem:
/// `Azure_Env_Summary_Sub<id8>_<YYYYmmdd_HHMMSS>`, where `<id8>` is the
/// first eight alphanumeric characters of the subscription id.
pub fn report_stem(subscription_id: &str, at: DateTime<Utc>) -> String {
    let id8: String = subscription_id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(8)
        .collect();
    let id8 = if id8.is_empty() { UNKNOWN_SUB.to_string() } else { id8 };
    format!("Azure_Env_Summary_Sub{}_{}", id8, at.format("%Y%m%d_%H%M%S"))
}

/// Path of an artifact with the given extension in the output directory.
pub fn artifact_path(output_dir: &Path, stem: &str, extension: &str) -> PathBuf {
    output_dir.join(format!("{stem}.{extension}"))
}

/// Create the output directory if needed.
pub fn ensure_dir(output_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(output_dir)
        .map_err(|e| format!("cannot create output dir {}: {}", output_dir.display(), e))
}

/// Write a file atomically (write to temp, then rename).
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create dir {}: {}", parent.display(), e))?;
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    std::fs::write(&tmp_path, bytes)
        .map_err(|e| format!("cannot write {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("cannot rename {} -> {}: {}", tmp_path.display(), path.display(), e))?;

    Ok(())
}
