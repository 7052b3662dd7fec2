//! Markdown to `.docx` conversion through pandoc.

use super::DocumentConverter;
use crate::core::error::ConversionError;
use crate::transport::local;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

const PANDOC_ARGS: [&str; 7] = ["-f", "markdown", "-t", "docx", "-s", "-o", "-"];

/// Time allowed for one conversion.
const CONVERT_TIMEOUT: Duration = Duration::from_secs(120);

/// Pandoc-backed converter. Reads Markdown on stdin and writes the document
/// to stdout.
#[derive(Debug, Clone)]
pub struct PandocConverter {
    program: PathBuf,
}

impl PandocConverter {
    /// Resolve pandoc: the configured path first, then `pandoc` on `PATH`.
    pub fn locate(configured: Option<&str>) -> Result<Self, ConversionError> {
        if let Some(path) = configured.filter(|p| !p.trim().is_empty()) {
            match local::find_program(path) {
                Some(program) => return Ok(Self { program }),
                None => tracing::warn!(
                    configured = %path,
                    "configured pandoc not found or not executable; trying PATH"
                ),
            }
        }
        local::find_program("pandoc")
            .map(|program| Self { program })
            .ok_or_else(|| {
                ConversionError::Unavailable(
                    "pandoc not found; install it or set pandoc_path".to_string(),
                )
            })
    }
}

#[async_trait]
impl DocumentConverter for PandocConverter {
    fn extension(&self) -> &str {
        "docx"
    }

    async fn convert(&self, markdown: &str) -> Result<Vec<u8>, ConversionError> {
        let out = local::exec_program(
            &self.program,
            &PANDOC_ARGS,
            Some(markdown.as_bytes()),
            CONVERT_TIMEOUT,
        )
        .await
        .map_err(|e| ConversionError::Io(e.to_string()))?;
        if !out.success() {
            return Err(ConversionError::Failed {
                code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        if out.stdout.is_empty() {
            return Err(ConversionError::Io("converter produced no output".to_string()));
        }
        Ok(out.stdout)
    }
}

/// Converter that is unavailable, used when pandoc cannot be located so the
/// skip is reported through the normal conversion path.
#[derive(Debug, Clone)]
pub struct MissingConverter {
    pub reason: String,
}

#[async_trait]
impl DocumentConverter for MissingConverter {
    fn extension(&self) -> &str {
        "docx"
    }

    async fn convert(&self, _markdown: &str) -> Result<Vec<u8>, ConversionError> {
        Err(ConversionError::Unavailable(self.reason.clone()))
    }
}
