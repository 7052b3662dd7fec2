//! cloudscribe: category-driven cloud inventory summaries.
//!
//! A declarative category registry (query plus field rules) drives a
//! per-category pipeline of inventory query, AI narrative, and table
//! rendering. One failing category never aborts the run; the report always
//! names what failed and why.

pub mod cli;
pub mod core;
pub mod provenance;
pub mod providers;
pub mod transport;
