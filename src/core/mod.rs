//! Core pipeline: types, registry, projection, processing, report assembly,
//! and run coordination.

pub mod error;
pub mod executor;
pub mod output;
pub mod parser;
pub mod processor;
pub mod projector;
pub mod prompt;
pub mod registry;
pub mod report;
pub mod retry;
pub mod types;
