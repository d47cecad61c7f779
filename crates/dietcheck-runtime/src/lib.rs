//! # dietcheck-runtime
//!
//! Catalog-wide batch evaluation for dietcheck.
//!
//! ## Important
//!
//! This crate is OPTIONAL. The evaluation in `dietcheck-core` is a pure,
//! synchronous function; this crate only spreads it across Tokio's
//! blocking pool.
//!
//! Use this crate when:
//! - A whole catalog is re-checked for one profile
//! - The same products are derived repeatedly and flags can be cached
//! - A long batch must be cancellable between products
//!
//! ## Example
//!
//! ```rust,ignore
//! use dietcheck_runtime::{BatchEvaluator, CancellationFlag, RuntimeConfig};
//!
//! let evaluator = BatchEvaluator::with_defaults(RuntimeConfig::default())?;
//! let cancel = CancellationFlag::new();
//!
//! let report = evaluator.evaluate_catalog(products, profile, &cancel).await;
//! println!("{} evaluated, {} failed", report.stats.completed, report.stats.failed);
//! ```

pub mod batch;
pub mod cache;
pub mod config;

pub use batch::{BatchEvaluator, BatchOutcome, BatchReport, BatchStats, CancellationFlag};
pub use cache::{fingerprint, FlagCache};
pub use config::RuntimeConfig;

use thiserror::Error;

/// Errors from the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Invalid runtime configuration: {0}")]
    Config(String),

    #[error("Engine configuration error: {0}")]
    Engine(#[from] dietcheck_core::ConfigError),
}
