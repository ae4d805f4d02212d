//! Combine subcommand - merge partitions without harvesting

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use commentline_core::SharedProgress;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct CombineArgs {
    /// Output directory of a harvest
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Zstd compression level (1-22)
    #[arg(short, long, value_parser = clap::value_parser!(i32).range(1..=22))]
    pub zstd_level: Option<i32>,
}

pub fn run(args: CombineArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let mut harvest = config.harvest.clone();
    if let Some(output) = args.output {
        harvest.output_dir = output;
    }
    let zstd_level = args.zstd_level.unwrap_or(harvest.zstd_level);

    let partitions = harvest.partitions_dir();
    anyhow::ensure!(
        partitions.is_dir(),
        "No partitions directory at {}",
        partitions.display()
    );

    let pb = progress.stage_line("combine");
    pb.set_message(partitions.display().to_string());
    let summary = commentline_harvest::combine(&partitions, &harvest.final_dir(), zstd_level)
        .context("Failed to combine partitions")?;
    pb.finish_and_clear();

    if progress.is_tty() {
        eprintln!("{}", summary.format_table());
    } else {
        summary.log();
    }
    for output in &summary.outputs {
        log::info!("  {} ({} rows)", output.path.display(), output.rows);
    }
    Ok(())
}
