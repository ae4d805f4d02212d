//! Commentline harvest - resumable batch comment harvesting
//!
//! Loads a list of video identifiers, fetches their comments in fixed-size
//! batches on a bounded worker pool, classifies each comment by script and
//! code-mixing, and commits one partition plus one progress entry per batch.
//! An interrupted run resumes from the progress log; partitions are merged
//! into per-category datasets at the end.
//!
//! # Example
//!
//! ```no_run
//! use commentline_core::ProgressContext;
//! use commentline_harvest::{DirectorySource, HarvestConfig, run};
//!
//! let config = HarvestConfig {
//!     input: "ids.txt".into(),
//!     output_dir: "comment_data".into(),
//!     ..Default::default()
//! };
//! let source = DirectorySource::new("captured");
//! let outcome = run(&config, &source, &ProgressContext::new()).expect("harvest failed");
//! println!("{} records", outcome.combine.total);
//! ```

pub mod aggregate;
pub mod checkpoint;
pub mod classify;
pub mod config;
pub mod error;
pub mod fetch;
pub mod identifier;
pub mod runner;
pub mod scheduler;
pub mod schema;
pub mod source;
pub mod stats;

// Re-exports for convenience
pub use aggregate::combine;
pub use checkpoint::{Batch, BatchCommit, CheckpointManager, ProgressLog, ProgressState, RunLock};
pub use classify::{Category, Classifier, NativeScript, SelectionPolicy};
pub use config::{CooldownConfig, HarvestConfig, PacingConfig, RetryConfig, Span};
pub use error::{FetchError, FetchFailure, HarvestError};
pub use fetch::FetchUnit;
pub use identifier::{
    append_new, extract_identifiers, Identifier, IdentifierSet, IdentifierStore, ImportReport,
};
pub use runner::{run, HarvestOutcome};
pub use scheduler::{RunReport, Scheduler};
pub use schema::Record;
pub use source::{CommentSource, CommentStream, DirectorySource, HttpSource, RawComment};
pub use stats::{BatchStats, CombineSummary, RunSummary, StopReason};
