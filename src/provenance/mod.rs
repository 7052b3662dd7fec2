//! Provenance: append-only run event log and BLAKE3 content hashes.

pub mod eventlog;
pub mod hasher;
