//! Harvest subcommand - fetch, classify and checkpoint, then combine

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use commentline_core::SharedProgress;
use commentline_harvest::{
    CommentSource, DirectorySource, HarvestConfig, HttpSource, PacingConfig, SelectionPolicy,
    Span, StopReason,
};

use crate::config::{Config, SourceConfig};

#[derive(Args, Debug)]
pub struct HarvestArgs {
    /// Line-delimited identifier list
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output directory (partitions, final datasets, progress)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Comment URL template with an `{id}` placeholder
    #[arg(long)]
    pub url_template: Option<String>,

    /// Directory of captured `{id}.jsonl` / `{id}.txt` comment files
    #[arg(long, conflicts_with = "url_template")]
    pub source_dir: Option<PathBuf>,

    /// Concurrent fetches per batch
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Identifiers per batch (1-100)
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Maximum comments kept per identifier
    #[arg(long)]
    pub max_records: Option<usize>,

    /// Stop starting new batches after this many hours
    #[arg(long, conflicts_with = "no_deadline")]
    pub hours: Option<f64>,

    /// Run until every identifier is processed
    #[arg(long)]
    pub no_deadline: bool,

    /// Which categories to keep
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Retries when opening a comment stream fails
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Skip the pauses between batches
    #[arg(long)]
    pub no_cooldown: bool,

    /// Skip the pauses inside a fetch
    #[arg(long)]
    pub no_pacing: bool,

    /// Zstd compression level (1-22)
    #[arg(short, long, value_parser = clap::value_parser!(i32).range(1..=22))]
    pub zstd_level: Option<i32>,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum PolicyArg {
    /// Script-mixed and code-mixed comments only
    MixedOnly,
    /// Every comment
    All,
}

impl From<PolicyArg> for SelectionPolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::MixedOnly => SelectionPolicy::MixedOnly,
            PolicyArg::All => SelectionPolicy::All,
        }
    }
}

impl HarvestArgs {
    /// Config file values overridden by flags
    fn apply(&self, mut config: HarvestConfig) -> HarvestConfig {
        if let Some(input) = &self.input {
            config.input = input.clone();
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(max) = self.max_records {
            config.max_records_per_id = max;
        }
        if let Some(hours) = self.hours {
            config.deadline_secs = Some((hours * 3600.0).max(0.0) as u64);
        }
        if self.no_deadline {
            config.deadline_secs = None;
        }
        if let Some(policy) = self.policy {
            config.policy = policy.into();
        }
        if let Some(retries) = self.max_retries {
            config.retry.max_retries = retries;
        }
        if self.no_cooldown {
            config.cooldown.secs = Span::zero();
        }
        if self.no_pacing {
            config.pacing = PacingConfig::disabled();
        }
        if let Some(level) = self.zstd_level {
            config.zstd_level = level;
        }
        config
    }

    fn source(&self, configured: &SourceConfig) -> Result<Box<dyn CommentSource>> {
        let url = self
            .url_template
            .as_ref()
            .or(configured.url_template.as_ref().filter(|_| self.source_dir.is_none()));
        if let Some(url) = url {
            let source = HttpSource::new(url.as_str()).with_context(|| {
                format!("URL template must contain {}: {url}", HttpSource::PLACEHOLDER)
            })?;
            return Ok(Box::new(source));
        }
        if let Some(dir) = self.source_dir.as_ref().or(configured.dir.as_ref()) {
            anyhow::ensure!(dir.is_dir(), "source directory not found: {}", dir.display());
            return Ok(Box::new(DirectorySource::new(dir)));
        }
        anyhow::bail!("No comment source: pass --url-template or --source-dir, or set [source] in the config file")
    }
}

pub fn run(args: HarvestArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let harvest = args.apply(config.harvest.clone());
    let source = args.source(&config.source)?;

    log::info!("Harvesting comments");
    log::info!("  Input: {}", harvest.input.display());
    log::info!("  Output: {}", harvest.output_dir.display());

    let outcome = commentline_harvest::run(&harvest, source.as_ref(), progress)?;

    let summary = &outcome.report.summary;
    if progress.is_tty() {
        eprintln!("{}", summary.format_table());
        eprintln!("{}", outcome.combine.format_table());
    } else {
        summary.log();
        outcome.combine.log();
    }

    if summary.stop == StopReason::StorageFailure {
        anyhow::bail!(
            "Partitions could not be written; {} batches were not committed",
            summary.failed_batches
        );
    }
    if outcome.complete {
        progress.println(format!(
            "All {} identifiers processed",
            commentline_core::fmt_num(outcome.total_identifiers)
        ));
    } else {
        progress.println(format!(
            "{} identifiers remaining ({}); run again to resume",
            commentline_core::fmt_num(outcome.remaining()),
            summary.stop
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: HarvestArgs,
    }

    fn parse(argv: &[&str]) -> HarvestArgs {
        Wrapper::parse_from(std::iter::once("harvest").chain(argv.iter().copied())).args
    }

    #[test]
    fn flags_override_config() {
        let args = parse(&[
            "--workers",
            "7",
            "--batch-size",
            "20",
            "--policy",
            "mixed-only",
            "--no-cooldown",
            "--hours",
            "1.5",
        ]);
        let cfg = args.apply(HarvestConfig::default());
        assert_eq!(cfg.workers, 7);
        assert_eq!(cfg.batch_size, 20);
        assert_eq!(cfg.policy, SelectionPolicy::MixedOnly);
        assert!(cfg.cooldown.secs.is_zero());
        assert_eq!(cfg.deadline_secs, Some(5400));
    }

    #[test]
    fn no_deadline_clears_limit() {
        let cfg = parse(&["--no-deadline"]).apply(HarvestConfig::default());
        assert_eq!(cfg.deadline_secs, None);
    }

    #[test]
    fn untouched_flags_keep_config_values() {
        let base = HarvestConfig {
            workers: 9,
            ..Default::default()
        };
        let cfg = parse(&[]).apply(base);
        assert_eq!(cfg.workers, 9);
        assert_eq!(cfg.batch_size, 100);
    }

    #[test]
    fn zstd_level_out_of_range_rejected() {
        assert!(Wrapper::try_parse_from(["harvest", "--zstd-level", "30"]).is_err());
    }

    #[test]
    fn missing_source_is_an_error() {
        let Err(err) = parse(&[]).source(&SourceConfig::default()) else {
            panic!("expected an error without any source");
        };
        assert!(err.to_string().contains("No comment source"));
    }

    #[test]
    fn template_without_placeholder_rejected() {
        let args = parse(&["--url-template", "https://example.org/comments"]);
        assert!(args.source(&SourceConfig::default()).is_err());
    }

    #[test]
    fn source_dir_flag_beats_configured_url() {
        let dir = tempfile::tempdir().unwrap();
        let args = parse(&["--source-dir", dir.path().to_str().unwrap()]);
        let configured = SourceConfig {
            url_template: Some("https://example.org/{id}".into()),
            dir: None,
        };
        assert!(args.source(&configured).is_ok());
    }
}
