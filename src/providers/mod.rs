//! External collaborators: inventory queries, narrative generation, and
//! document conversion. Each sits behind a narrow trait so the pipeline can
//! run against in-memory fakes.

pub mod azure;
pub mod gemini;
pub mod pandoc;

use crate::core::error::{ConversionError, GenerationError, QueryError};
use crate::core::types::ResourceRecord;
use async_trait::async_trait;

/// Runs an opaque inventory query and returns records in service order.
#[async_trait]
pub trait InventoryService: Send + Sync {
    async fn execute(&self, query: &str) -> Result<Vec<ResourceRecord>, QueryError>;
}

/// Turns a prompt into narrative text.
#[async_trait]
pub trait NarrativeService: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Converts a Markdown document into another format.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// File extension of the produced document, without the dot.
    fn extension(&self) -> &str;

    async fn convert(&self, markdown: &str) -> Result<Vec<u8>, ConversionError>;
}
