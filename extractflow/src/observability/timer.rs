//! Step timing helper.

use std::time::{Duration, Instant};

/// Measures how long one pipeline step takes.
#[derive(Debug)]
pub struct StepTimer {
    start: Instant,
    step: String,
}

impl StepTimer {
    /// Starts timing a step.
    #[must_use]
    pub fn start(step: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            step: step.into(),
        }
    }

    /// Returns the step name.
    #[must_use]
    pub fn step(&self) -> &str {
        &self.step
    }

    /// Returns the elapsed time.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}
