//! Harvest configuration: every operational knob as one explicit value

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::{NativeScript, SelectionPolicy};
use crate::error::HarvestError;

/// Hard upper bound on identifiers per batch
pub const MAX_BATCH_SIZE: usize = 100;

/// Inclusive `[min, max]` range, written as a two-element array in TOML
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u64; 2]", into = "[u64; 2]")]
pub struct Span {
    pub min: u64,
    pub max: u64,
}

impl Span {
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub const fn zero() -> Self {
        Self::new(0, 0)
    }

    pub fn is_zero(&self) -> bool {
        self.max == 0
    }

    pub fn sample(&self, rng: &mut impl rand::Rng) -> u64 {
        if self.min >= self.max {
            self.min
        } else {
            rng.random_range(self.min..=self.max)
        }
    }
}

impl From<[u64; 2]> for Span {
    fn from([min, max]: [u64; 2]) -> Self {
        Self { min, max }
    }
}

impl From<Span> for [u64; 2] {
    fn from(s: Span) -> Self {
        [s.min, s.max]
    }
}

/// Micro-delay inside one fetch unit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Pause after this many fetched records (redrawn after each pause)
    pub every: Span,
    /// Pause length in milliseconds
    pub delay_ms: Span,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            every: Span::new(5, 15),
            delay_ms: Span::new(1_000, 3_000),
        }
    }
}

impl PacingConfig {
    /// No pauses at all (tests, local sources)
    pub fn disabled() -> Self {
        Self {
            every: Span::new(1, 1),
            delay_ms: Span::zero(),
        }
    }
}

/// Pause between batches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    /// Cool down after every N batches; 0 disables
    pub every_batches: usize,
    pub secs: Span,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            every_batches: 5,
            secs: Span::new(30, 60),
        }
    }
}

/// Retries for opening a source stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_ms: u64,
    pub cap_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_ms: 2_000,
            cap_ms: 60_000,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> commentline_core::Backoff {
        commentline_core::Backoff {
            base: Duration::from_millis(self.base_ms),
            cap: Duration::from_millis(self.cap_ms),
            max_retries: self.max_retries,
        }
    }
}

/// Runtime configuration for a harvest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Line-delimited identifier list
    pub input: PathBuf,
    /// Root for partitions, final datasets and progress state
    pub output_dir: PathBuf,
    pub batch_size: usize,
    /// Concurrent fetch units
    pub workers: usize,
    /// Record cap per identifier
    pub max_records_per_id: usize,
    /// Wall-clock limit; no batch starts after it expires
    pub deadline_secs: Option<u64>,
    pub pacing: PacingConfig,
    pub cooldown: CooldownConfig,
    pub retry: RetryConfig,
    pub policy: SelectionPolicy,
    pub script: NativeScript,
    /// Lexical cues added to the built-in code-mixing set
    pub extra_cues: Vec<String>,
    /// Parquet zstd level; an unusable level degrades partitions to CSV
    pub zstd_level: i32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("all_video_ids.txt"),
            output_dir: PathBuf::from("comment_data"),
            batch_size: MAX_BATCH_SIZE,
            workers: 3,
            max_records_per_id: 500,
            deadline_secs: Some(20 * 3600),
            pacing: PacingConfig::default(),
            cooldown: CooldownConfig::default(),
            retry: RetryConfig::default(),
            policy: SelectionPolicy::All,
            script: NativeScript::default(),
            extra_cues: Vec::new(),
            zstd_level: 3,
        }
    }
}

impl HarvestConfig {
    pub fn partitions_dir(&self) -> PathBuf {
        self.output_dir.join("partitions")
    }

    pub fn final_dir(&self) -> PathBuf {
        self.output_dir.join("final")
    }

    pub fn progress_path(&self) -> PathBuf {
        self.output_dir.join("progress.jsonl")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.output_dir.join("progress.lock")
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    /// Reject values the scheduler cannot honor
    pub fn validate(&self) -> Result<(), HarvestError> {
        let invalid = |msg: String| Err(HarvestError::InvalidConfig(msg));
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return invalid(format!(
                "batch_size must be 1..={MAX_BATCH_SIZE}, got {}",
                self.batch_size
            ));
        }
        if self.workers == 0 {
            return invalid("workers must be at least 1".into());
        }
        if self.max_records_per_id == 0 {
            return invalid("max_records_per_id must be at least 1".into());
        }
        if self.pacing.every.min == 0 {
            return invalid("pacing.every must start at 1 or more".into());
        }
        for (name, span) in [
            ("pacing.every", self.pacing.every),
            ("pacing.delay_ms", self.pacing.delay_ms),
            ("cooldown.secs", self.cooldown.secs),
        ] {
            if span.min > span.max {
                return invalid(format!("{name}: min {} > max {}", span.min, span.max));
            }
        }
        if self.script.start > self.script.end {
            return invalid(format!(
                "script {}: start U+{:04X} > end U+{:04X}",
                self.script.name, self.script.start, self.script.end
            ));
        }
        Ok(())
    }
}
