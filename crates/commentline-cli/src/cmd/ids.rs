//! Ids subcommand - grow the identifier list from pages, files or stdin

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use commentline_harvest::{append_new, extract_identifiers, IdentifierSet};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct IdsArgs {
    #[command(subcommand)]
    pub action: IdsAction,
}

#[derive(Subcommand, Debug)]
pub enum IdsAction {
    /// Extract identifiers and append the new ones to the list
    Import(ImportArgs),
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Files, http(s) URLs, or `-` for stdin; watch URLs and bare identifiers are recognised
    #[arg(required = true)]
    pub sources: Vec<String>,

    /// Identifier list to append to (default: harvest input from config)
    #[arg(short, long)]
    pub list: Option<PathBuf>,
}

pub fn run(args: IdsArgs, config: &Config) -> Result<()> {
    match args.action {
        IdsAction::Import(import) => run_import(import, config),
    }
}

fn read_source(source: &str) -> Result<String> {
    if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }
    if source.starts_with("http://") || source.starts_with("https://") {
        let mut reader = commentline_core::open_line_reader(source)
            .with_context(|| format!("Failed to fetch {source}"))?;
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .with_context(|| format!("Failed to read {source}"))?;
        return Ok(text);
    }
    std::fs::read_to_string(source).with_context(|| format!("Failed to read {source}"))
}

fn run_import(args: ImportArgs, config: &Config) -> Result<()> {
    let list = args.list.unwrap_or_else(|| config.harvest.input.clone());

    let mut found = IdentifierSet::new();
    for source in &args.sources {
        let ids = extract_identifiers(&read_source(source)?);
        log::info!("{source}: {} identifiers", ids.len());
        for id in ids.iter() {
            found.insert(id.clone());
        }
    }

    let report = append_new(&list, &found)
        .with_context(|| format!("Failed to update {}", list.display()))?;

    crate::cmd::print_table(
        "Import",
        &[
            ("List", list.display().to_string()),
            ("Found", report.found.to_string()),
            ("New", report.added.to_string()),
            ("Total", report.total.to_string()),
        ],
    );
    Ok(())
}
