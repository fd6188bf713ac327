//! Executor configuration: strategy choice, scheduler name and back-off settings.
//!
//! The configuration is plain data, deserializable with `serde`. It is
//! resolved into a live [`ResilientExecutor`](crate::ResilientExecutor) by the
//! [`ExecutorProducer`](crate::producer::ExecutorProducer).
//!
//! ```json
//! {
//!   "strategy": "polynomial",
//!   "scheduler": "default",
//!   "backoff": {
//!     "base_delay": 1,
//!     "max_delay": 1800,
//!     "max_retries": 100,
//!     "time_unit": "seconds"
//!   }
//! }
//! ```
//!
//! Every field is optional; missing fields take the defaults below.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backoff::{DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES, TimeUnit};

/// Name of the scheduler used when none is configured.
pub const DEFAULT_SCHEDULER: &str = "default";

/// Errors produced while resolving configuration into live collaborators.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[source] tokio::runtime::TryCurrentError),

    #[error("invalid executor configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("scheduler name is empty")]
    EmptySchedulerName,

    #[error("no scheduler registered under '{name}'")]
    UnknownScheduler { name: String },
}

/// Which back-off algorithm to instantiate.
///
/// Serialized in lower case; custom strategies are referenced by the name
/// they were registered under, e.g. `{"custom": "jittered"}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Polynomial,
    Fixed,
    Linear,
    Custom(String),
}

/// Settings shared by the built-in back-off strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Minimum wait between attempts. Values below `1` are ignored.
    pub base_delay: u64,
    /// Ceiling on the computed wait.
    pub max_delay: u64,
    /// Number of failed attempts tolerated before giving up.
    pub max_retries: u32,
    pub time_unit: TimeUnit,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            time_unit: TimeUnit::default(),
        }
    }
}

/// Everything needed to build one executor for one call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub strategy: StrategyKind,
    /// Name of a scheduler registered with the producer.
    pub scheduler: String,
    pub backoff: BackoffConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            scheduler: DEFAULT_SCHEDULER.to_owned(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl ExecutorConfig {
    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if `json` is malformed or contains a
    /// value of the wrong type.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_scheduler(mut self, name: impl Into<String>) -> Self {
        self.scheduler = name.into();
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}
