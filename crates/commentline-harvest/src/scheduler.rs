//! Batch scheduler: fixed-width rayon pool per batch, commit, cool down, repeat.
//!
//! Cancellation is cooperative at batch granularity. The deadline and the
//! shutdown flag are checked before a batch starts; a running batch always
//! finishes and commits.

use std::time::{Duration, Instant};

use chrono::Utc;
use commentline_core::{fmt_duration, is_shutdown_requested, ProgressContext};
use rayon::prelude::*;

use crate::checkpoint::{Batch, CheckpointManager};
use crate::classify::Classifier;
use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::fetch::FetchUnit;
use crate::identifier::Identifier;
use crate::schema::Record;
use crate::source::CommentSource;
use crate::stats::{BatchStats, RunSummary, StopReason};

/// Consecutive unwritable batches before the run gives up
pub const MAX_CONSECUTIVE_WRITE_FAILURES: usize = 3;

const COOLDOWN_POLL: Duration = Duration::from_millis(250);

/// What a scheduler run produced
#[derive(Debug)]
pub struct RunReport {
    pub summary: RunSummary,
    pub batches: Vec<BatchStats>,
}

pub struct Scheduler<'a> {
    config: &'a HarvestConfig,
    source: &'a dyn CommentSource,
    classifier: &'a Classifier,
    progress: &'a ProgressContext,
    pool: rayon::ThreadPool,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        config: &'a HarvestConfig,
        source: &'a dyn CommentSource,
        classifier: &'a Classifier,
        progress: &'a ProgressContext,
    ) -> Result<Self, HarvestError> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("fetch-{i}"))
            .build()
            .map_err(|e| HarvestError::InvalidConfig(format!("cannot build worker pool: {e}")))?;
        Ok(Self {
            config,
            source,
            classifier,
            progress,
            pool,
        })
    }

    /// Process `remaining` in consecutive batches until it is exhausted, the
    /// deadline passes, shutdown is requested, or storage keeps failing.
    pub fn run(
        &self,
        remaining: &[Identifier],
        checkpoint: &mut CheckpointManager,
        deadline: Option<Instant>,
    ) -> Result<RunReport, HarvestError> {
        let started = Instant::now();
        let unit = FetchUnit::from_config(self.source, self.config);
        let chunks: Vec<&[Identifier]> = remaining.chunks(self.config.batch_size).collect();
        let every = self.config.cooldown.every_batches;
        let mut rng = rand::rng();

        let mut batches = Vec::new();
        let mut failed = 0;
        let mut consecutive_failures = 0;
        let mut cooldowns = 0;
        let mut stop = StopReason::Exhausted;

        for (i, chunk) in chunks.iter().enumerate() {
            if is_shutdown_requested() {
                log::warn!("Shutdown requested, not starting further batches");
                stop = StopReason::Shutdown;
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                log::info!(
                    "Deadline reached after {}, stopping before batch {:05}",
                    fmt_duration(started.elapsed()),
                    checkpoint.next_batch_number()
                );
                stop = StopReason::Deadline;
                break;
            }

            let batch = Batch {
                number: checkpoint.next_batch_number(),
                identifiers: chunk.to_vec(),
            };
            let (records, mut stats) = self.run_batch(&batch, &unit);

            match checkpoint.commit(&batch, &records) {
                Ok(written) => {
                    consecutive_failures = 0;
                    stats.partition = written.map(|w| w.path);
                    stats.log();
                    batches.push(stats);
                }
                Err(HarvestError::PartitionWrite(e)) => {
                    failed += 1;
                    consecutive_failures += 1;
                    log::error!(
                        "batch {:05}: {e}; its {} identifiers stay pending",
                        batch.number,
                        batch.identifiers.len()
                    );
                    if consecutive_failures >= MAX_CONSECUTIVE_WRITE_FAILURES {
                        log::error!(
                            "{consecutive_failures} consecutive batches could not be written, aborting"
                        );
                        stop = StopReason::StorageFailure;
                        break;
                    }
                    continue;
                }
                Err(e) => return Err(e),
            }

            let more = i + 1 < chunks.len();
            if more && every > 0 && batches.len() % every == 0 && self.cool_down(&mut rng) {
                cooldowns += 1;
            }
        }

        let mut summary =
            RunSummary::from_batches(&batches, remaining.len(), failed, stop, started.elapsed());
        summary.cooldowns = cooldowns;
        Ok(RunReport { summary, batches })
    }

    /// Fetch every identifier of the batch on the pool, then classify on the
    /// control thread. Records keep batch order.
    fn run_batch(&self, batch: &Batch, unit: &FetchUnit<'_>) -> (Vec<Record>, BatchStats) {
        let started = Instant::now();
        let pb = self.progress.batch_bar(batch.number, batch.identifiers.len());

        let results: Vec<_> = self.pool.install(|| {
            batch
                .identifiers
                .par_iter()
                .map(|id| {
                    let result = unit.fetch(id);
                    pb.inc(1);
                    (result, Utc::now())
                })
                .collect()
        });
        pb.finish_and_clear();

        let mut stats = BatchStats::new(batch.number, batch.identifiers.len());
        let mut records = Vec::new();
        for (identifier, (result, captured)) in batch.identifiers.iter().zip(results) {
            let texts = match result {
                Ok(texts) => texts,
                Err(failure) => {
                    log::warn!("{failure}");
                    stats.fetch_failures += 1;
                    failure.partial
                }
            };
            for text in texts {
                let category = self.classifier.classify(&text);
                let keep = self.classifier.keeps(category);
                stats.count(category, keep);
                if keep {
                    records.push(Record {
                        identifier: identifier.clone(),
                        text,
                        category,
                        capture_time: captured,
                    });
                }
            }
        }
        stats.elapsed = started.elapsed();
        (records, stats)
    }

    /// Random pause between batches; cut short by shutdown. False when the
    /// drawn pause is zero.
    fn cool_down(&self, rng: &mut impl rand::Rng) -> bool {
        let pause = Duration::from_secs(self.config.cooldown.secs.sample(rng));
        if pause.is_zero() {
            return false;
        }
        log::info!("Cooling down for {}", fmt_duration(pause));
        let pb = self.progress.stage_line("cooldown");
        pb.set_message(fmt_duration(pause));
        let until = Instant::now() + pause;
        while !is_shutdown_requested() {
            let now = Instant::now();
            if now >= until {
                break;
            }
            std::thread::sleep((until - now).min(COOLDOWN_POLL));
        }
        pb.finish_and_clear();
        true
    }
}
