//! Statistics collection and reporting for a harvest.
//!
//! - Batch-level: `BatchStats`, one per committed (or failed) batch
//! - Run-level: `RunSummary`, aggregated when the scheduler stops
//! - Combine: `CombineSummary`, returned by the aggregator

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use commentline_core::{fmt_duration, fmt_num, WrittenTable};

use crate::classify::Category;

fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn header(title: &str) -> Vec<Cell> {
    vec![
        Cell::new(title)
            .fg(Color::Cyan)
            .add_attribute(comfy_table::Attribute::Bold),
        Cell::new("Value").fg(Color::Cyan),
        Cell::new("%").fg(Color::Cyan),
    ]
}

fn new_table(title: &str) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header(title));
    table
}

// =============================================================================
// Batch-level
// =============================================================================

/// Counters for one batch
#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    pub batch_number: u64,
    pub identifiers: usize,
    /// Identifiers whose fetch ended in a failure (partial texts still kept)
    pub fetch_failures: usize,
    /// Texts returned by fetch units, before selection
    pub texts: usize,
    /// Records written to the partition
    pub kept: usize,
    /// Records dropped by the selection policy
    pub discarded: usize,
    pub by_category: BTreeMap<Category, usize>,
    pub partition: Option<PathBuf>,
    pub elapsed: Duration,
}

impl BatchStats {
    pub fn new(batch_number: u64, identifiers: usize) -> Self {
        Self {
            batch_number,
            identifiers,
            ..Default::default()
        }
    }

    pub fn count(&mut self, category: Category, kept: bool) {
        self.texts += 1;
        *self.by_category.entry(category).or_default() += 1;
        if kept {
            self.kept += 1;
        } else {
            self.discarded += 1;
        }
    }

    pub fn log(&self) {
        let partition = self
            .partition
            .as_ref()
            .and_then(|p| p.file_name())
            .map_or_else(|| "no partition".to_string(), |n| n.to_string_lossy().into_owned());
        log::info!(
            "batch {:05}: {} ids, {} kept / {} fetched, {} discarded, {} fetch failures -> {} [{}]",
            self.batch_number,
            self.identifiers,
            fmt_num(self.kept),
            fmt_num(self.texts),
            fmt_num(self.discarded),
            self.fetch_failures,
            partition,
            fmt_duration(self.elapsed)
        );
    }
}

// =============================================================================
// Run-level
// =============================================================================

/// Why the scheduler stopped starting batches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every remaining identifier was attempted
    Exhausted,
    Deadline,
    Shutdown,
    /// Too many consecutive batches could not be written
    StorageFailure,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Exhausted => "all identifiers attempted",
            Self::Deadline => "deadline reached",
            Self::Shutdown => "shutdown requested",
            Self::StorageFailure => "partition storage failing",
        })
    }
}

/// Aggregated run statistics
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stop: StopReason,
    /// Identifiers still unprocessed when the run started
    pub scheduled: usize,
    pub committed_batches: usize,
    /// Batches whose partition could not be written (redone next run)
    pub failed_batches: usize,
    pub identifiers: usize,
    pub fetch_failures: usize,
    pub texts: usize,
    pub kept: usize,
    pub discarded: usize,
    pub by_category: BTreeMap<Category, usize>,
    /// Pauses taken between batches
    pub cooldowns: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn from_batches(
        batches: &[BatchStats],
        scheduled: usize,
        failed_batches: usize,
        stop: StopReason,
        elapsed: Duration,
    ) -> Self {
        let mut s = Self {
            stop,
            scheduled,
            committed_batches: batches.len(),
            failed_batches,
            identifiers: 0,
            fetch_failures: 0,
            texts: 0,
            kept: 0,
            discarded: 0,
            by_category: BTreeMap::new(),
            cooldowns: 0,
            elapsed,
        };
        for b in batches {
            s.identifiers += b.identifiers;
            s.fetch_failures += b.fetch_failures;
            s.texts += b.texts;
            s.kept += b.kept;
            s.discarded += b.discarded;
            for (cat, n) in &b.by_category {
                *s.by_category.entry(*cat).or_default() += n;
            }
        }
        s
    }

    /// Comments fetched per second of wall-clock time
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.texts as f64 / secs
        } else {
            0.0
        }
    }

    pub fn format_table(&self) -> String {
        let mut table = new_table("Harvest");
        table.add_row(vec![
            Cell::new("Stopped"),
            Cell::new(self.stop.to_string()),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Batches"),
            Cell::new(format!(
                "{} committed ({} failed)",
                self.committed_batches, self.failed_batches
            )),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Identifiers"),
            Cell::new(format!(
                "{}/{}",
                fmt_num(self.identifiers),
                fmt_num(self.scheduled)
            )),
            Cell::new(format!("{:.1}", pct(self.identifiers, self.scheduled))),
        ]);
        table.add_row(vec![
            Cell::new("Fetch failures"),
            Cell::new(fmt_num(self.fetch_failures)),
            Cell::new(format!("{:.1}", pct(self.fetch_failures, self.identifiers))),
        ]);
        table.add_row(vec![
            Cell::new("Comments fetched"),
            Cell::new(fmt_num(self.texts)),
            Cell::new(""),
        ]);
        for (cat, n) in &self.by_category {
            table.add_row(vec![
                Cell::new(format!("  {cat}")),
                Cell::new(fmt_num(*n)),
                Cell::new(format!("{:.1}", pct(*n, self.texts))),
            ]);
        }
        table.add_row(vec![
            Cell::new("Discarded by policy"),
            Cell::new(fmt_num(self.discarded)),
            Cell::new(format!("{:.1}", pct(self.discarded, self.texts))),
        ]);
        table.add_row(vec![
            Cell::new("Records kept").fg(Color::Green),
            Cell::new(fmt_num(self.kept)).fg(Color::Green),
            Cell::new(format!("{:.1}", pct(self.kept, self.texts))).fg(Color::Green),
        ]);
        table.add_row(vec![
            Cell::new("Elapsed"),
            Cell::new(format!(
                "{} ({:.1} comments/s, {} cool-downs)",
                fmt_duration(self.elapsed),
                self.throughput(),
                self.cooldowns
            )),
            Cell::new(""),
        ]);
        format!("\n{table}")
    }

    pub fn log(&self) {
        log::info!(
            "Harvest stopped ({}): {} batches, {} ids, {} records kept of {} fetched, {} fetch failures, {} discarded in {} ({:.1} comments/s)",
            self.stop,
            self.committed_batches,
            fmt_num(self.identifiers),
            fmt_num(self.kept),
            fmt_num(self.texts),
            self.fetch_failures,
            fmt_num(self.discarded),
            fmt_duration(self.elapsed),
            self.throughput()
        );
    }
}

// =============================================================================
// Combine
// =============================================================================

/// Result of merging partitions into final datasets
#[derive(Debug, Clone, Default)]
pub struct CombineSummary {
    pub partitions_read: usize,
    pub unreadable: Vec<PathBuf>,
    pub duplicates_dropped: usize,
    pub by_category: BTreeMap<Category, usize>,
    pub total: usize,
    pub outputs: Vec<WrittenTable>,
}

impl CombineSummary {
    pub fn count(&self, category: Category) -> usize {
        self.by_category.get(&category).copied().unwrap_or(0)
    }

    pub fn format_table(&self) -> String {
        let mut table = new_table("Combined");
        table.add_row(vec![
            Cell::new("Partitions"),
            Cell::new(format!(
                "{} read ({} unreadable)",
                self.partitions_read,
                self.unreadable.len()
            )),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Duplicates dropped"),
            Cell::new(fmt_num(self.duplicates_dropped)),
            Cell::new(""),
        ]);
        for (cat, n) in &self.by_category {
            table.add_row(vec![
                Cell::new(cat.as_str()),
                Cell::new(fmt_num(*n)),
                Cell::new(format!("{:.1}", pct(*n, self.total))),
            ]);
        }
        table.add_row(vec![
            Cell::new("Total records").fg(Color::Green),
            Cell::new(fmt_num(self.total)).fg(Color::Green),
            Cell::new(""),
        ]);
        format!("\n{table}")
    }

    pub fn log(&self) {
        let counts: Vec<String> = self
            .by_category
            .iter()
            .map(|(cat, n)| format!("{cat}={}", fmt_num(*n)))
            .collect();
        log::info!(
            "Combined {} partitions ({} unreadable, {} duplicates dropped): {} records [{}]",
            self.partitions_read,
            self.unreadable.len(),
            self.duplicates_dropped,
            fmt_num(self.total),
            counts.join(", ")
        );
        for path in &self.unreadable {
            log::warn!("Skipped unreadable partition {}", path.display());
        }
    }
}
