//! Status subcommand - progress of an output directory

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;

use commentline_core::{fmt_num, is_valid_parquet, TableFormat};
use commentline_harvest::aggregate::list_partitions;
use commentline_harvest::IdentifierStore;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Line-delimited identifier list
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output directory of a harvest
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: StatusArgs, config: &Config) -> Result<()> {
    let mut harvest = config.harvest.clone();
    if let Some(input) = args.input {
        harvest.input = input;
    }
    if let Some(output) = args.output {
        harvest.output_dir = output;
    }

    let store = IdentifierStore::new(&harvest.input, harvest.progress_path());
    let all = store.load_all()?;
    let state = store.load_progress();
    let remaining = store.remaining(&all, &state).len();
    let partitions = list_partitions(&harvest.partitions_dir())
        .with_context(|| format!("Failed to list {}", harvest.partitions_dir().display()))?;

    let damaged = partitions
        .iter()
        .filter(|p| TableFormat::from_path(p) == Some(TableFormat::Parquet) && !is_valid_parquet(p))
        .count();
    let csv = partitions
        .iter()
        .filter(|p| TableFormat::from_path(p) == Some(TableFormat::Csv))
        .count();

    let phase = if harvest.lock_path().exists() {
        "running (lock held)"
    } else if !state.is_empty() {
        "interrupted, resumable"
    } else if partitions.is_empty() {
        "not started"
    } else {
        "complete"
    };

    crate::cmd::print_table(
        "Status",
        &[
            ("State", phase.to_string()),
            ("Identifiers", fmt_num(all.len())),
            ("Processed", fmt_num(all.len() - remaining)),
            ("Remaining", fmt_num(remaining)),
            ("Batches committed", state.committed_batches().to_string()),
            (
                "Last batch",
                match state.current_batch_number() {
                    0 => "-".to_string(),
                    n => format!("{n:05}"),
                },
            ),
            (
                "Last saved",
                state.last_saved_time().map_or_else(
                    || "-".to_string(),
                    |t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
                ),
            ),
            (
                "Partitions",
                format!(
                    "{} ({csv} CSV fallback, {damaged} damaged)",
                    partitions.len()
                ),
            ),
        ],
    );
    Ok(())
}
