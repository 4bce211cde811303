//! Core domain model types for extractflow.
//!
//! This module contains the fundamental types used throughout the pipeline:
//! - Processing status codes
//! - Work items, strategy kinds and child locators
//! - Intermediate stage values and structured records

mod record;
mod status;
mod work_item;

pub use record::{Document, PreparedInput, RecordId, StructuredRecord, TransformOutput};
pub use status::ProcessingStatus;
pub use work_item::{ChildLocator, Granularity, StrategyKind, WorkItem};
