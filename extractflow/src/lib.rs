//! # Extractflow
//!
//! A guarded strategy pipeline for queued extraction work.
//!
//! Work items name a strategy and carry either a whole upload or one row of
//! it. Each strategy runs four ordered stages (prepare input, invoke the
//! completion service, shape the output, persist the record) and classifies
//! every failure as retryable or non-retryable:
//!
//! - **Step guards**: every stage records its failure status before the error propagates
//! - **Two granularities**: whole documents, or rows tracked per child
//! - **Redelivery discipline**: retryable failures redeliver, the rest are acknowledged
//! - **Idempotent persistence**: records are written by identity
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use extractflow::prelude::*;
//!
//! let driver = PipelineDriver::new(
//!     StrategyRegistry::with_defaults(),
//!     PipelineConfig::load("extractflow.json")?,
//!     Collaborators::new(object_store, completion, documents),
//!     ProcessContext::new(StatusReporter::new(status_store)),
//! );
//! driver.prewarm()?;
//!
//! let pool = WorkerPool::from_driver(Arc::new(driver));
//! let outcomes = pool.run_batch(messages).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod ports;
pub mod prompt;
pub mod status;
pub mod strategies;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{PipelineConfig, StrategySettings};
    pub use crate::core::{
        ChildLocator, Granularity, ProcessingStatus, RecordId, StrategyKind, StructuredRecord,
        WorkItem,
    };
    pub use crate::errors::{
        Disposition, ExtractionError, PipelineError, RegistryError, WorkItemError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        IncomingMessage, MessageOutcome, PipelineDriver, ProcessContext, StepGuard, StepPolicy,
        StrategyRegistry, WorkerPool,
    };
    pub use crate::ports::{CompletionService, DocumentStore, ObjectStore, StatusStore};
    pub use crate::status::{StatusKey, StatusReporter, StatusView};
    pub use crate::strategies::{Collaborators, Strategy};
}
