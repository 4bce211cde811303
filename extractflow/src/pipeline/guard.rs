//! Step guards.
//!
//! A guard wraps one pipeline stage. When the stage fails it writes the
//! failure status for the work item, then hands the error back. A
//! stage that succeeds causes no write; the next stage or the final success
//! report records progress.
//!
//! A failure is never acknowledged without its status written. If the status
//! store rejects the write, the guard returns a retryable error wrapping the
//! stage error, so the transport redelivers and the write is attempted again.
//!
//! The guard flavor follows from its [`StatusKey`]: a parent key touches the
//! document's entry, a child key touches only that child's entry.

use std::future::Future;
use tracing::{debug, error, warn};

use super::ProcessContext;
use crate::core::ProcessingStatus;
use crate::errors::ExtractionError;
use crate::events::{step_failed_payload, STEP_FAILED};
use crate::observability::StepTimer;
use crate::status::StatusKey;

/// Status codes a guard records for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPolicy {
    /// Step name used in logs and events.
    pub name: &'static str,
    /// Status written when the step fails with a retryable error.
    pub on_retry: ProcessingStatus,
    /// Status written when the step fails with a non-retryable error.
    pub on_fail: ProcessingStatus,
}

impl StepPolicy {
    /// Creates a policy with distinct retry and failure codes.
    #[must_use]
    pub const fn new(name: &'static str, on_retry: ProcessingStatus, on_fail: ProcessingStatus) -> Self {
        Self {
            name,
            on_retry,
            on_fail,
        }
    }

    /// Creates a policy that records the same code for either failure kind.
    #[must_use]
    pub const fn uniform(name: &'static str, status: ProcessingStatus) -> Self {
        Self::new(name, status, status)
    }

    /// Returns the status to record for an error.
    #[must_use]
    pub fn status_for(&self, error: &ExtractionError) -> ProcessingStatus {
        if error.is_retryable() {
            self.on_retry
        } else {
            self.on_fail
        }
    }
}

/// Scoped execution of one pipeline stage.
#[derive(Debug)]
pub struct StepGuard<'a> {
    ctx: &'a ProcessContext,
    key: &'a StatusKey,
    policy: StepPolicy,
}

impl<'a> StepGuard<'a> {
    fn new(ctx: &'a ProcessContext, key: &'a StatusKey, policy: StepPolicy) -> Self {
        Self { ctx, key, policy }
    }

    /// Creates a guard over a parent's status entry.
    #[must_use]
    pub fn parent(ctx: &'a ProcessContext, key: &'a StatusKey, policy: StepPolicy) -> Self {
        debug_assert!(!key.is_child());
        Self::new(ctx, key, policy)
    }

    /// Creates a guard over one child's status entry.
    #[must_use]
    pub fn child(ctx: &'a ProcessContext, key: &'a StatusKey, policy: StepPolicy) -> Self {
        debug_assert!(key.is_child());
        Self::new(ctx, key, policy)
    }

    /// Returns true if the guard writes a child entry.
    #[must_use]
    pub fn is_child(&self) -> bool {
        self.key.is_child()
    }

    /// Runs the stage.
    ///
    /// On failure the status is written before the error is returned. If the
    /// status write itself fails, the result is a retryable error whose
    /// source is the stage error.
    pub async fn run<T, F>(self, step: F) -> Result<T, ExtractionError>
    where
        F: Future<Output = Result<T, ExtractionError>> + Send,
        T: Send,
    {
        let timer = StepTimer::start(self.policy.name);
        let err = match step.await {
            Ok(value) => {
                debug!(
                    key = %self.key,
                    step = self.policy.name,
                    elapsed_ms = timer.elapsed_ms(),
                    "Step completed"
                );
                return Ok(value);
            }
            Err(err) => err,
        };

        let status = self.policy.status_for(&err);
        if err.is_retryable() {
            warn!(
                key = %self.key,
                step = self.policy.name,
                status = %status,
                error = %err,
                "Step failed with retryable error"
            );
        } else {
            error!(
                key = %self.key,
                step = self.policy.name,
                status = %status,
                error = %err,
                raw_output_len = err.raw_output().map(str::len),
                "Step failed with non-retryable error"
            );
        }

        self.ctx
            .events()
            .try_emit(STEP_FAILED, Some(step_failed_payload(self.key, self.policy.name, status, &err)));

        if let Err(store_err) = self.ctx.reporter().mark_step(self.key, status).await {
            error!(
                key = %self.key,
                step = self.policy.name,
                status = %status,
                error = %store_err,
                "Failed to record step failure status"
            );
            return Err(ExtractionError::retryable_with(
                format!("status '{status}' not recorded after '{}' failed: {store_err}", self.policy.name),
                err,
            ));
        }

        Err(err)
    }
}
