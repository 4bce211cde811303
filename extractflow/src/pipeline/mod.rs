//! Pipeline orchestration.
//!
//! This module provides:
//! - Step guards that record failure status around each stage
//! - The strategy registry
//! - The driver that routes work items to strategies
//! - A bounded-concurrency worker pool over incoming messages

mod context;
mod driver;
mod guard;
mod registry;
mod worker;

mod pipeline_tests;

pub use context::ProcessContext;
pub use driver::PipelineDriver;
pub use guard::{StepGuard, StepPolicy};
pub use registry::{StrategyFactory, StrategyRegistry};
pub use worker::{IncomingMessage, MessageOutcome, WorkerPool};
