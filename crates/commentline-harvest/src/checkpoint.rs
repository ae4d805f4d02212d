//! Durable batch commits: partition file first, then one fsynced progress entry.
//!
//! Progress lives in an append-only JSON-lines log. Each line records one
//! committed batch; the in-memory [`ProgressState`] is rebuilt by replaying it.
//! A partition whose entry never made it into the log is invisible to resume,
//! so its identifiers are fetched again.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use commentline_core::{cleanup_tmp_files, write_table, TableFormat, WrittenTable};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::identifier::Identifier;
use crate::schema::{records_to_batch, Record};

/// A batch ready to commit
#[derive(Debug, Clone)]
pub struct Batch {
    pub number: u64,
    pub identifiers: Vec<Identifier>,
}

/// One line of `progress.jsonl`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCommit {
    pub batch_number: u64,
    pub identifiers: Vec<Identifier>,
    /// Partition file name; `None` for a batch that kept no records
    pub partition: Option<String>,
    pub records: usize,
    pub committed_at: DateTime<Utc>,
}

/// Replay of the progress log
#[derive(Debug, Default, Clone)]
pub struct ProgressState {
    processed: FxHashSet<Identifier>,
    current_batch_number: u64,
    last_saved_time: Option<DateTime<Utc>>,
    committed_batches: usize,
}

impl ProgressState {
    pub fn apply(&mut self, commit: &BatchCommit) {
        self.mark_processed(commit.identifiers.iter().cloned());
        self.current_batch_number = self.current_batch_number.max(commit.batch_number);
        self.last_saved_time = Some(commit.committed_at);
        self.committed_batches += 1;
    }

    pub fn mark_processed(&mut self, ids: impl IntoIterator<Item = Identifier>) {
        self.processed.extend(ids);
    }

    pub fn is_processed(&self, id: &Identifier) -> bool {
        self.processed.contains(id)
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn current_batch_number(&self) -> u64 {
        self.current_batch_number
    }

    pub fn last_saved_time(&self) -> Option<DateTime<Utc>> {
        self.last_saved_time
    }

    pub fn committed_batches(&self) -> usize {
        self.committed_batches
    }

    pub fn is_empty(&self) -> bool {
        self.committed_batches == 0
    }
}

#[derive(Default)]
struct Entries(Vec<BatchCommit>);

impl Entries {
    fn state(&self) -> ProgressState {
        let mut state = ProgressState::default();
        for commit in &self.0 {
            state.apply(commit);
        }
        state
    }
}

/// Append-only `progress.jsonl`
#[derive(Debug, Clone)]
pub struct ProgressLog {
    path: PathBuf,
}

impl ProgressLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Rebuild state from the log. Never fails: a missing or unreadable log
    /// yields empty progress, a corrupt entry ends the replay.
    pub fn replay(&self) -> ProgressState {
        self.read_entries().0.state()
    }

    /// Valid entries up to the first corrupt one, and whether the file was clean
    fn read_entries(&self) -> (Entries, bool) {
        let mut entries = Entries::default();
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return (entries, true),
            Err(e) => {
                log::warn!(
                    "{}: unreadable ({e}), starting without progress",
                    self.path.display()
                );
                return (entries, false);
            }
        };

        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    log::warn!(
                        "{}:{}: read failed ({e}), ignoring the rest",
                        self.path.display(),
                        i + 1
                    );
                    return (entries, false);
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<BatchCommit>(&line) {
                Ok(commit) => entries.0.push(commit),
                Err(e) => {
                    log::warn!(
                        "{}:{}: corrupt entry ({e}), ignoring it and everything after",
                        self.path.display(),
                        i + 1
                    );
                    return (entries, false);
                }
            }
        }
        (entries, true)
    }

    /// Rewrite a damaged log down to its valid prefix so later appends stay
    /// reachable. Returns true when the file was rewritten.
    pub fn repair(&self) -> io::Result<bool> {
        let (entries, clean) = self.read_entries();
        if clean {
            return Ok(false);
        }
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        {
            let mut file = File::create(&tmp)?;
            for commit in &entries.0 {
                let line = serde_json::to_string(commit).map_err(io::Error::other)?;
                writeln!(file, "{line}")?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        log::warn!(
            "{}: rewritten with {} valid entr{}",
            self.path.display(),
            entries.0.len(),
            if entries.0.len() == 1 { "y" } else { "ies" }
        );
        Ok(true)
    }

    /// Append one entry and fsync it
    pub fn append(&self, commit: &BatchCommit) -> io::Result<()> {
        let mut line = serde_json::to_string(commit).map_err(io::Error::other)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()
    }

    pub fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Exclusive run lock; removed on drop
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, HarvestError> {
        let path = path.into();
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut f) => {
                writeln!(f, "{}", std::process::id()).map_err(HarvestError::io(&path))?;
                Ok(Self { path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let owner = fs::read_to_string(&path)
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .map_or_else(|| "unknown process".to_string(), |pid| format!("pid {pid}"));
                Err(HarvestError::Locked { path, owner })
            }
            Err(e) => Err(HarvestError::io(&path)(e)),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("{}: cannot remove lock: {e}", self.path.display());
        }
    }
}

/// `batch_{number:05}_{YYYYMMDD}`, suffixed `_{n}` while a Parquet or CSV file
/// with that stem already exists
pub fn partition_stem(dir: &Path, number: u64, date: &str) -> PathBuf {
    let taken = |stem: &Path| {
        [TableFormat::Parquet, TableFormat::Csv]
            .iter()
            .any(|f| stem.with_extension(f.extension()).exists())
    };
    let base = format!("batch_{number:05}_{date}");
    let mut stem = dir.join(&base);
    let mut n = 1;
    while taken(&stem) {
        stem = dir.join(format!("{base}_{n}"));
        n += 1;
    }
    stem
}

/// Owns the partition directory and the progress log during a run
pub struct CheckpointManager {
    partitions_dir: PathBuf,
    log: ProgressLog,
    zstd_level: i32,
    state: ProgressState,
}

impl CheckpointManager {
    /// Prepare the partition directory (dropping stale tmp files) and take over
    /// the replayed state
    pub fn open(config: &HarvestConfig, state: ProgressState) -> Result<Self, HarvestError> {
        let partitions_dir = config.partitions_dir();
        fs::create_dir_all(&partitions_dir).map_err(HarvestError::io(&partitions_dir))?;
        let stale = cleanup_tmp_files(&partitions_dir).map_err(HarvestError::io(&partitions_dir))?;
        if stale > 0 {
            log::info!("Removed {stale} stale tmp partition file(s)");
        }
        let log = ProgressLog::new(config.progress_path());
        log.repair().map_err(|source| HarvestError::ProgressWrite {
            path: log.path().to_path_buf(),
            source,
        })?;
        Ok(Self {
            partitions_dir,
            log,
            zstd_level: config.zstd_level,
            state,
        })
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn partitions_dir(&self) -> &Path {
        &self.partitions_dir
    }

    pub fn next_batch_number(&self) -> u64 {
        self.state.current_batch_number() + 1
    }

    /// Write the batch's partition. Not yet visible to resume.
    pub fn write_partition(
        &self,
        batch: &Batch,
        records: &[Record],
    ) -> Result<Option<WrittenTable>, HarvestError> {
        if records.is_empty() {
            return Ok(None);
        }
        let table = records_to_batch(records).map_err(|e| {
            HarvestError::PartitionWrite(commentline_core::SinkError {
                stem: self.partitions_dir.clone(),
                parquet: io::Error::other(e.to_string()),
                csv: io::Error::other(e),
            })
        })?;
        let date = Local::now().format("%Y%m%d").to_string();
        let stem = partition_stem(&self.partitions_dir, batch.number, &date);
        write_table(&stem, &table, self.zstd_level)
            .map(Some)
            .map_err(HarvestError::PartitionWrite)
    }

    /// Append the progress entry for a batch whose partition (if any) is durable
    pub fn record_commit(
        &mut self,
        batch: &Batch,
        written: Option<&WrittenTable>,
    ) -> Result<(), HarvestError> {
        let commit = BatchCommit {
            batch_number: batch.number,
            identifiers: batch.identifiers.clone(),
            partition: written.and_then(|w| {
                w.path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            }),
            records: written.map_or(0, |w| w.rows),
            committed_at: Utc::now(),
        };
        self.log
            .append(&commit)
            .map_err(|source| HarvestError::ProgressWrite {
                path: self.log.path().to_path_buf(),
                source,
            })?;
        self.state.apply(&commit);
        Ok(())
    }

    /// Partition, then progress entry
    pub fn commit(
        &mut self,
        batch: &Batch,
        records: &[Record],
    ) -> Result<Option<WrittenTable>, HarvestError> {
        let written = self.write_partition(batch, records)?;
        self.record_commit(batch, written.as_ref())?;
        Ok(written)
    }

    /// Drop the progress log once every identifier is processed
    pub fn finish(&self) -> Result<(), HarvestError> {
        self.log
            .remove()
            .map_err(|source| HarvestError::ProgressWrite {
                path: self.log.path().to_path_buf(),
                source,
            })
    }
}
