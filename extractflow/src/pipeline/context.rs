//! Shared per-process context handed to every strategy run.

use std::sync::Arc;

use crate::events::{EventSink, NoOpEventSink};
use crate::status::StatusReporter;

/// Status reporting and notification handles shared by all work items.
#[derive(Clone)]
pub struct ProcessContext {
    reporter: StatusReporter,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ProcessContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessContext")
            .field("reporter", &self.reporter)
            .finish_non_exhaustive()
    }
}

impl ProcessContext {
    /// Creates a context that discards events.
    #[must_use]
    pub fn new(reporter: StatusReporter) -> Self {
        Self {
            reporter,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the status reporter.
    #[must_use]
    pub fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }

    /// Returns the event sink.
    #[must_use]
    pub fn events(&self) -> &dyn EventSink {
        self.events.as_ref()
    }
}
