//! Pipeline orchestration: load, resume, schedule batches, combine

use std::fs;
use std::time::Instant;

use anyhow::Context;
use commentline_core::{fmt_num, ProgressContext};

use crate::aggregate;
use crate::checkpoint::{CheckpointManager, RunLock};
use crate::classify::Classifier;
use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::identifier::IdentifierStore;
use crate::scheduler::{RunReport, Scheduler};
use crate::source::CommentSource;
use crate::stats::CombineSummary;

/// Everything a harvest run reports back
#[derive(Debug)]
pub struct HarvestOutcome {
    pub report: RunReport,
    pub combine: CombineSummary,
    pub total_identifiers: usize,
    pub processed_identifiers: usize,
    /// Every identifier processed; the progress log has been removed
    pub complete: bool,
}

impl HarvestOutcome {
    pub fn remaining(&self) -> usize {
        self.total_identifiers - self.processed_identifiers
    }
}

/// Run the harvest: resume from the progress log, process remaining
/// identifiers until done or stopped, then rebuild the final datasets
pub fn run(
    config: &HarvestConfig,
    source: &dyn CommentSource,
    progress: &ProgressContext,
) -> anyhow::Result<HarvestOutcome> {
    let start = Instant::now();
    config.validate()?;

    fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.output_dir.display()
        )
    })?;
    let _lock = RunLock::acquire(config.lock_path())?;

    let store = IdentifierStore::new(&config.input, config.progress_path());
    let all = store.load_all()?;
    let state = store.load_progress();
    if !state.is_empty() {
        log::info!(
            "Resuming after batch {:05}: {} identifiers processed, last saved {}",
            state.current_batch_number(),
            fmt_num(state.processed_count()),
            state
                .last_saved_time()
                .map_or_else(|| "-".to_string(), |t| t.to_rfc3339())
        );
    }
    let remaining = store.remaining(&all, &state);
    log::info!(
        "{} identifiers, {} remaining; batches of {} on {} workers (policy: {})",
        fmt_num(all.len()),
        fmt_num(remaining.len()),
        config.batch_size,
        config.workers,
        config.policy
    );

    let classifier = Classifier::new(config.script.clone(), &config.extra_cues, config.policy)
        .map_err(|e| HarvestError::InvalidConfig(format!("bad extra cue: {e}")))?;
    let mut checkpoint = CheckpointManager::open(config, state)?;
    let scheduler = Scheduler::new(config, source, &classifier, progress)?;
    let deadline = config.deadline().map(|limit| start + limit);
    let report = scheduler.run(&remaining, &mut checkpoint, deadline)?;

    let processed = all
        .iter()
        .filter(|id| checkpoint.state().is_processed(id))
        .count();
    let complete = processed == all.len();
    if complete {
        checkpoint.finish()?;
        log::info!("All identifiers processed, progress log removed");
    } else {
        log::info!(
            "{} identifiers left for the next run",
            fmt_num(all.len() - processed)
        );
    }

    let pb = progress.stage_line("combine");
    pb.set_message("merging partitions");
    let combine = aggregate::combine(
        &config.partitions_dir(),
        &config.final_dir(),
        config.zstd_level,
    )
    .context("Failed to combine partitions")?;
    pb.finish_and_clear();

    Ok(HarvestOutcome {
        report,
        combine,
        total_identifiers: all.len(),
        processed_identifiers: processed,
        complete,
    })
}
