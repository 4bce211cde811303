//! Lifecycle status tracking for work items.
//!
//! Every work item owns one status entry keyed by its parent id, and child
//! work items own one entry per child locator. The [`StatusReporter`] is the
//! pipeline's only writer; [`InMemoryStatusStore`] is the reference store.

mod entry;
mod reporter;
mod store;

pub use entry::{StatusEntry, StatusKey, StatusView};
pub use reporter::StatusReporter;
pub use store::{InMemoryStatusStore, StatusWrite};
