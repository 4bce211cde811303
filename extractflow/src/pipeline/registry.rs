//! Strategy registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::core::StrategyKind;
use crate::errors::RegistryError;
use crate::strategies::{Collaborators, RowStrategy, Strategy, WholeFileStrategy};

/// Constructor for a strategy instance.
pub type StrategyFactory = Box<
    dyn Fn(&PipelineConfig, &Collaborators) -> Result<Arc<dyn Strategy>, RegistryError>
        + Send
        + Sync,
>;

/// Table of strategy constructors keyed by kind.
///
/// Built once at startup and handed to the [`PipelineDriver`](super::PipelineDriver),
/// which memoizes the instances it builds.
#[derive(Default)]
pub struct StrategyRegistry {
    factories: HashMap<StrategyKind, StrategyFactory>,
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl StrategyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in strategies.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            StrategyKind::OneFileOneObject,
            Box::new(|config: &PipelineConfig, collaborators: &Collaborators| {
                Ok(Arc::new(WholeFileStrategy::new(config, collaborators)?) as Arc<dyn Strategy>)
            }),
        );
        registry.register(
            StrategyKind::OneRowOneObject,
            Box::new(|config: &PipelineConfig, collaborators: &Collaborators| {
                Ok(Arc::new(RowStrategy::new(config, collaborators)?) as Arc<dyn Strategy>)
            }),
        );
        registry
    }

    /// Registers a constructor, replacing any previous one for `kind`.
    pub fn register(&mut self, kind: StrategyKind, factory: StrategyFactory) {
        self.factories.insert(kind, factory);
    }

    /// Returns true if a constructor is registered for `kind`.
    #[must_use]
    pub fn contains(&self, kind: StrategyKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Returns the registered kinds in a stable order.
    #[must_use]
    pub fn kinds(&self) -> Vec<StrategyKind> {
        let mut kinds: Vec<_> = self.factories.keys().copied().collect();
        kinds.sort_by_key(|kind| kind.as_str());
        kinds
    }

    /// Builds a new strategy instance.
    pub fn build(
        &self,
        kind: StrategyKind,
        config: &PipelineConfig,
        collaborators: &Collaborators,
    ) -> Result<Arc<dyn Strategy>, RegistryError> {
        let factory = self
            .factories
            .get(&kind)
            .ok_or(RegistryError::UnknownStrategy(kind))?;
        factory(config, collaborators)
    }
}
