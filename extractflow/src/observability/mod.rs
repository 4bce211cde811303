//! Logging setup and step timing.

mod logging;
mod timer;

pub use logging::{init_tracing, LogFormat, DEFAULT_FILTER};
pub use timer::StepTimer;
