//! Bounded-concurrency message processing.
//!
//! Messages are independent. The pool runs up to `max_concurrency` of them
//! at once and turns every result into a [`Disposition`] for the transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use super::PipelineDriver;
use crate::errors::{Disposition, PipelineError};

/// A message received from the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Transport-assigned message id.
    pub id: String,
    /// Message body.
    pub body: Value,
}

impl IncomingMessage {
    /// Creates a message.
    #[must_use]
    pub fn new(id: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }
}

/// What the transport should do with a processed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageOutcome {
    /// Id of the message this outcome belongs to.
    pub message_id: String,
    /// Acknowledge or redeliver.
    pub disposition: Disposition,
    /// Failure description, if processing failed.
    pub error: Option<String>,
}

impl MessageOutcome {
    fn from_result(message_id: String, result: Result<(), PipelineError>) -> Self {
        match result {
            Ok(()) => Self {
                message_id,
                disposition: Disposition::Acknowledge,
                error: None,
            },
            Err(err) => Self {
                message_id,
                disposition: err.disposition(),
                error: Some(err.to_string()),
            },
        }
    }

    fn from_join_error(message_id: String, err: &JoinError) -> Self {
        Self {
            message_id,
            disposition: Disposition::Redeliver,
            error: Some(format!("worker task failed: {err}")),
        }
    }

    /// Returns true if processing succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

async fn process_message(driver: &PipelineDriver, message: IncomingMessage) -> MessageOutcome {
    let result = driver.handle_message(&message.body).await;
    match &result {
        Ok(()) => debug!(message_id = %message.id, "Message processed"),
        Err(err) if err.is_fatal() => error!(
            message_id = %message.id,
            error = %err,
            "Message references an unusable strategy"
        ),
        Err(err) => warn!(
            message_id = %message.id,
            disposition = %err.disposition(),
            error = %err,
            "Message failed"
        ),
    }
    MessageOutcome::from_result(message.id, result)
}

/// Processes messages through a driver with bounded concurrency.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    driver: Arc<PipelineDriver>,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
}

impl WorkerPool {
    /// Creates a pool allowing `max_concurrency` messages in flight.
    #[must_use]
    pub fn new(driver: Arc<PipelineDriver>, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            driver,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    /// Creates a pool sized from the driver's configuration.
    #[must_use]
    pub fn from_driver(driver: Arc<PipelineDriver>) -> Self {
        let max_concurrency = driver.config().max_concurrency;
        Self::new(driver, max_concurrency)
    }

    /// Returns the concurrency limit.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Processes a batch and returns one outcome per message, in input order.
    pub async fn run_batch(&self, messages: Vec<IncomingMessage>) -> Vec<MessageOutcome> {
        info!(count = messages.len(), max_concurrency = self.max_concurrency, "Processing batch");

        let mut handles = Vec::with_capacity(messages.len());
        for message in messages {
            let id = message.id.clone();
            let driver = Arc::clone(&self.driver);
            let permits = Arc::clone(&self.permits);
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await;
                process_message(&driver, message).await
            });
            handles.push((id, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(message_id = %id, error = %err, "Worker task failed");
                    MessageOutcome::from_join_error(id, &err)
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Processes messages from `incoming` until it closes, sending each
    /// outcome to `outcomes` as soon as it is known.
    ///
    /// Returns once every accepted message has finished.
    pub async fn run(
        &self,
        mut incoming: mpsc::Receiver<IncomingMessage>,
        outcomes: mpsc::Sender<MessageOutcome>,
    ) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = joined {
                        error!(error = %err, "Worker task failed");
                    }
                }
                received = incoming.recv() => {
                    let Some(message) = received else { break };
                    let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
                        break;
                    };
                    let driver = Arc::clone(&self.driver);
                    let outcomes = outcomes.clone();
                    tasks.spawn(async move {
                        let outcome = process_message(&driver, message).await;
                        drop(permit);
                        if outcomes.send(outcome).await.is_err() {
                            debug!("Outcome receiver closed");
                        }
                    });
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "Worker task failed");
            }
        }
        debug!("Worker pool drained");
    }
}
