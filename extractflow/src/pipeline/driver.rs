//! The pipeline driver.
//!
//! The driver is the entry point for one work item: it resolves the
//! strategy, checks the item's shape against the strategy's granularity and
//! runs it. Stage errors come back exactly as the strategy reported them.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{ProcessContext, StrategyRegistry};
use crate::config::PipelineConfig;
use crate::core::{RecordId, StrategyKind, WorkItem};
use crate::errors::{PipelineError, RegistryError};
use crate::ports::StatusStoreError;
use crate::status::StatusView;
use crate::strategies::{Collaborators, Strategy};

/// Routes work items to memoized strategy instances.
pub struct PipelineDriver {
    registry: StrategyRegistry,
    config: Arc<PipelineConfig>,
    collaborators: Collaborators,
    ctx: ProcessContext,
    strategies: RwLock<HashMap<StrategyKind, Arc<dyn Strategy>>>,
}

impl std::fmt::Debug for PipelineDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDriver")
            .field("registry", &self.registry)
            .field("resolved", &self.strategies.read().len())
            .finish_non_exhaustive()
    }
}

impl PipelineDriver {
    /// Creates a driver.
    #[must_use]
    pub fn new(
        registry: StrategyRegistry,
        config: PipelineConfig,
        collaborators: Collaborators,
        ctx: ProcessContext,
    ) -> Self {
        Self {
            registry,
            config: Arc::new(config),
            collaborators,
            ctx,
            strategies: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the process context.
    #[must_use]
    pub fn context(&self) -> &ProcessContext {
        &self.ctx
    }

    /// Returns the strategy for `kind`, constructing it on first use.
    pub fn resolve(&self, kind: StrategyKind) -> Result<Arc<dyn Strategy>, RegistryError> {
        if let Some(strategy) = self.strategies.read().get(&kind) {
            return Ok(Arc::clone(strategy));
        }

        let built = self
            .registry
            .build(kind, &self.config, &self.collaborators)
            .map_err(|e| {
                error!(strategy = %kind, error = %e, "Strategy construction failed");
                e
            })?;

        let mut strategies = self.strategies.write();
        let strategy = strategies.entry(kind).or_insert_with(|| {
            info!(strategy = %kind, "Strategy constructed");
            built
        });
        Ok(Arc::clone(strategy))
    }

    /// Constructs every configured strategy up front.
    ///
    /// Surfaces configuration problems at startup instead of on the first
    /// message of each kind.
    pub fn prewarm(&self) -> Result<(), RegistryError> {
        for kind in self.config.strategies.keys() {
            self.resolve(*kind)?;
        }
        Ok(())
    }

    /// Processes one work item.
    pub async fn process(&self, item: &WorkItem) -> Result<(), PipelineError> {
        let strategy = self.resolve(item.strategy_kind)?;
        item.ensure_granularity(strategy.granularity())?;

        debug!(
            strategy = %item.strategy_kind,
            parent_id = %item.parent_id,
            child = ?item.child_locator,
            "Processing work item"
        );
        strategy.process(item, &self.ctx).await?;
        Ok(())
    }

    /// Parses a transport message body and processes it.
    pub async fn handle_message(&self, body: &Value) -> Result<(), PipelineError> {
        let item = WorkItem::from_message(body)?;
        self.process(&item).await
    }

    /// Returns the aggregated status of a parent and its children.
    pub async fn status(&self, parent_id: &RecordId) -> Result<StatusView, StatusStoreError> {
        self.ctx.reporter().read(parent_id).await
    }
}
