//! commentline - resumable comment harvester
//!
//! Fetches comments for a list of video identifiers in checkpointed batches,
//! classifies them by script and code-mixing, and merges the results into
//! per-category Parquet datasets.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "commentline")]
#[command(about = "Resumable batch comment harvester")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./commentline.toml or ~/.config/commentline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Read timeout in seconds for stall detection
    #[arg(long, global = true)]
    read_timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest comments for every unprocessed identifier, then combine
    Harvest(cmd::harvest::HarvestArgs),
    /// Merge batch partitions into per-category datasets
    Combine(cmd::combine::CombineArgs),
    /// Show progress of an output directory
    Status(cmd::status::StatusArgs),
    /// Manage the identifier list
    Ids(cmd::ids::IdsArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(commentline_core::ProgressContext::new());

    // TTY: warn unless --debug, bars show activity. Non-TTY: info, logs are the progress.
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let verbosity = commentline_core::Verbosity::from_flags(is_tty, cli.debug);
    commentline_core::init_logging(verbosity, multi);

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    let mut http = commentline_core::HttpSettings {
        read_timeout: Duration::from_secs(cli.read_timeout.unwrap_or(config.http.read_timeout)),
        connect_timeout: Duration::from_secs(config.http.connect_timeout),
        ..Default::default()
    };
    if let Some(agent) = &config.http.user_agent {
        http.user_agent = agent.clone();
    }
    commentline_core::set_http_settings(http);

    commentline_core::install_signal_handlers().context("Failed to install signal handlers")?;

    match cli.command {
        Command::Harvest(args) => cmd::harvest::run(args, &config, &progress),
        Command::Combine(args) => cmd::combine::run(args, &config, &progress),
        Command::Status(args) => cmd::status::run(args, &config),
        Command::Ids(args) => cmd::ids::run(args, &config),
        Command::Config => {
            cmd::print_table("Setting", &config_rows(&config));
            Ok(())
        }
    }
}

fn config_rows(config: &Config) -> Vec<(&'static str, String)> {
    let h = &config.harvest;
    let span = |s: commentline_harvest::Span, unit: &str| format!("{}-{}{unit}", s.min, s.max);
    let source = match (&config.source.url_template, &config.source.dir) {
        (Some(url), _) => format!("http: {url}"),
        (None, Some(dir)) => format!("directory: {}", dir.display()),
        (None, None) => "not set".to_string(),
    };
    vec![
        ("Identifier list", h.input.display().to_string()),
        ("Output directory", h.output_dir.display().to_string()),
        ("Source", source),
        ("Batch size", h.batch_size.to_string()),
        ("Workers", h.workers.to_string()),
        ("Max records / id", h.max_records_per_id.to_string()),
        (
            "Deadline",
            h.deadline()
                .map_or_else(|| "none".to_string(), commentline_core::fmt_duration),
        ),
        (
            "Pacing",
            format!(
                "every {} records, {}",
                span(h.pacing.every, ""),
                span(h.pacing.delay_ms, "ms")
            ),
        ),
        (
            "Cool-down",
            format!(
                "every {} batches, {}",
                h.cooldown.every_batches,
                span(h.cooldown.secs, "s")
            ),
        ),
        ("Max retries", h.retry.max_retries.to_string()),
        ("Policy", h.policy.to_string()),
        (
            "Native script",
            format!(
                "{} (U+{:04X}..U+{:04X})",
                h.script.name, h.script.start, h.script.end
            ),
        ),
        ("Extra cues", h.extra_cues.len().to_string()),
        ("Compression level", h.zstd_level.to_string()),
        ("Read timeout", format!("{}s", config.http.read_timeout)),
    ]
}
