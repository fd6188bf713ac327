//! # resilex
//!
//! A resilient task executor: runs a unit of work on a scheduler and, when it
//! fails, retries it after a delay chosen by a pluggable back-off strategy.
//! Once the retry ceiling is reached a caller-supplied failure handler runs
//! instead. Every attempt, and the failure handler, runs inside its own
//! all-or-nothing atomic unit.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use resilex::{ExecutorConfig, ExecutorProducer};
//! use resilex::atomic_unit::NoopAtomicUnits;
//! use resilex::scheduler::TokioScheduler;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut producer = ExecutorProducer::new();
//!     producer.register_scheduler("default", Arc::new(TokioScheduler::current()?));
//!
//!     let config = ExecutorConfig::from_json(r#"{"backoff": {"time_unit": "milliseconds"}}"#)?;
//!     let executor = producer.produce(&config, Arc::new(NoopAtomicUnits))?;
//!
//!     let answer = executor.submit(|| Ok(42)).await?;
//!     println!("answer: {answer}");
//!     Ok(())
//! }
//! ```

// ── Core ──────────────────────────────────────────────────────────────────────
pub mod atomic_unit;
pub mod backoff;
pub mod executor;
pub mod scheduler;

// ── Configuration ─────────────────────────────────────────────────────────────
pub mod config;
pub mod producer;

/// Error type carried by tasks, failure handlers and atomic units.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use backoff::{BackoffStrategy, TimeUnit};
pub use config::{ConfigError, ExecutorConfig};
pub use executor::{ExecutorError, ResilientExecutor, TaskHandle, TaskState};
pub use producer::ExecutorProducer;
