//! Producer: turns an [`ExecutorConfig`] into a live [`ResilientExecutor`].
//!
//! The producer keeps a registry of named schedulers (shared across every
//! executor it produces) and of custom strategy factories. Producing an
//! executor instantiates a fresh strategy for it, so no two executors share a
//! failure counter.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use resilex::atomic_unit::NoopAtomicUnits;
//! use resilex::config::ExecutorConfig;
//! use resilex::producer::ExecutorProducer;
//! use resilex::scheduler::ManualScheduler;
//!
//! let mut producer = ExecutorProducer::new();
//! producer.register_scheduler("default", Arc::new(ManualScheduler::new()));
//!
//! let executor = producer
//!     .produce(&ExecutorConfig::default(), Arc::new(NoopAtomicUnits))
//!     .unwrap();
//! assert_eq!(executor.strategy().name(), "polynomial");
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error};

use crate::atomic_unit::AtomicUnitProvider;
use crate::backoff::{BackoffStrategy, FixedBackoff, LinearBackoff, PolynomialBackoff};
use crate::config::{BackoffConfig, ConfigError, ExecutorConfig, StrategyKind};
use crate::executor::ResilientExecutor;
use crate::scheduler::Scheduler;

/// Builds a strategy for one executor from the configured settings.
pub type StrategyFactory = Arc<dyn Fn(&BackoffConfig) -> Box<dyn BackoffStrategy> + Send + Sync>;

/// Registry-backed factory for [`ResilientExecutor`]s.
#[derive(Default)]
pub struct ExecutorProducer {
    schedulers: HashMap<String, Arc<dyn Scheduler>>,
    strategies: HashMap<String, StrategyFactory>,
}

impl ExecutorProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `scheduler` available under `name`, replacing any previous entry.
    pub fn register_scheduler(&mut self, name: impl Into<String>, scheduler: Arc<dyn Scheduler>) {
        self.schedulers.insert(name.into(), scheduler);
    }

    /// Makes a custom strategy available as `StrategyKind::Custom(name)`.
    pub fn register_strategy<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&BackoffConfig) -> Box<dyn BackoffStrategy> + Send + Sync + 'static,
    {
        self.strategies.insert(name.into(), Arc::new(factory));
    }

    /// Looks up a registered scheduler.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::EmptySchedulerName`] if `name` is empty.
    /// - [`ConfigError::UnknownScheduler`] if nothing is registered under `name`.
    pub fn scheduler(&self, name: &str) -> Result<Arc<dyn Scheduler>, ConfigError> {
        if name.is_empty() {
            return Err(ConfigError::EmptySchedulerName);
        }
        self.schedulers
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownScheduler {
                name: name.to_owned(),
            })
    }

    /// Instantiates a fresh strategy for `config`.
    ///
    /// An unknown custom strategy is logged and replaced by the default
    /// polynomial strategy with the same settings.
    pub fn strategy(&self, config: &ExecutorConfig) -> Box<dyn BackoffStrategy> {
        let backoff = &config.backoff;
        match &config.strategy {
            StrategyKind::Polynomial => Box::new(PolynomialBackoff::from_config(backoff)),
            StrategyKind::Fixed => Box::new(FixedBackoff::from_config(backoff)),
            StrategyKind::Linear => Box::new(LinearBackoff::from_config(backoff)),
            StrategyKind::Custom(name) => match self.strategies.get(name) {
                Some(factory) => factory(backoff),
                None => {
                    error!(
                        strategy = %name,
                        "unknown back-off strategy; using default polynomial strategy"
                    );
                    Box::new(PolynomialBackoff::from_config(backoff))
                }
            },
        }
    }

    /// Builds an executor for one call site.
    ///
    /// # Errors
    ///
    /// Fails if the configured scheduler cannot be resolved; see
    /// [`scheduler`](Self::scheduler).
    pub fn produce(
        &self,
        config: &ExecutorConfig,
        units: Arc<dyn AtomicUnitProvider>,
    ) -> Result<ResilientExecutor, ConfigError> {
        let scheduler = self.scheduler(&config.scheduler)?;
        let strategy = self.strategy(config);
        debug!(
            scheduler = %config.scheduler,
            strategy = strategy.name(),
            "producing resilient executor"
        );
        Ok(ResilientExecutor::new(strategy, scheduler, units))
    }

    /// Builds an executor from [`ExecutorConfig::default`].
    pub fn produce_default(
        &self,
        units: Arc<dyn AtomicUnitProvider>,
    ) -> Result<ResilientExecutor, ConfigError> {
        self.produce(&ExecutorConfig::default(), units)
    }
}
