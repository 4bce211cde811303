//! Testing utilities for extraction pipelines.
//!
//! This module provides:
//! - In-memory collaborators with failure injection
//! - Sample configuration and work items
//! - A harness wiring both into a driver

mod fixtures;
mod mocks;

pub use fixtures::{
    row_item, sample_config, whole_file_item, TestHarness, ROW_COLLECTION, SAMPLE_BUCKET,
    WHOLE_FILE_COLLECTION,
};
pub use mocks::{InMemoryDocumentStore, InMemoryObjectStore, ScriptedCompletionService};
