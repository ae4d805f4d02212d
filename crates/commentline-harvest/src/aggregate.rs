//! Merge batch partitions into per-category datasets.
//!
//! Partitions are read in file-name order (batch number, then date, then
//! collision suffix). The first partition carrying records for an identifier
//! owns it; records for that identifier in any later partition are dropped,
//! which collapses batches re-run after a lost progress commit.

use std::collections::BTreeMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use commentline_core::{read_table, write_table, TableFormat};
use rustc_hash::FxHashMap;

use crate::classify::Category;
use crate::error::HarvestError;
use crate::identifier::Identifier;
use crate::schema::{records_from_batch, records_schema, records_to_batch, Record};
use crate::stats::CombineSummary;

pub const ALL_RECORDS: &str = "all_records";

/// `batch_*.parquet` and `batch_*.csv` under `dir`, sorted by file name
pub fn list_partitions(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let base = glob::Pattern::escape(&dir.to_string_lossy());
    for format in [TableFormat::Parquet, TableFormat::Csv] {
        let pattern = format!("{base}/batch_*.{}", format.extension());
        let paths = glob::glob(&pattern)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        for path in paths {
            files.push(path.map_err(io::Error::from)?);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn read_partition(path: &Path) -> io::Result<Vec<Record>> {
    let mut records = Vec::new();
    for batch in read_table(path, &records_schema())? {
        records.extend(records_from_batch(&batch).map_err(io::Error::other)?);
    }
    Ok(records)
}

/// Remove any previous Parquet/CSV output for `stem`
fn clear_output(stem: &Path) -> Result<(), HarvestError> {
    for format in [TableFormat::Parquet, TableFormat::Csv] {
        let path = stem.with_extension(format.extension());
        match fs::remove_file(&path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                return Err(HarvestError::io(&path)(e));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Remove every dataset a previous combine may have left in `final_dir`
fn clear_final(final_dir: &Path) -> Result<(), HarvestError> {
    for category in Category::ALL {
        clear_output(&final_dir.join(format!("{category}_records")))?;
    }
    clear_output(&final_dir.join(ALL_RECORDS))
}

fn write_output(
    final_dir: &Path,
    name: &str,
    records: &[&Record],
    zstd_level: i32,
    summary: &mut CombineSummary,
) -> Result<(), HarvestError> {
    let stem = final_dir.join(name);
    let batch = records_to_batch(records.iter().copied())
        .map_err(|e| HarvestError::io(&stem)(io::Error::other(e)))?;
    let written = write_table(&stem, &batch, zstd_level).map_err(HarvestError::OutputWrite)?;
    log::debug!("{}: {} rows", written.path.display(), written.rows);
    summary.outputs.push(written);
    Ok(())
}

/// Read, dedup and regroup every partition under `partition_dir`; write
/// `{category}_records` per non-empty category plus `all_records` into `final_dir`
pub fn combine(
    partition_dir: &Path,
    final_dir: &Path,
    zstd_level: i32,
) -> Result<CombineSummary, HarvestError> {
    let mut summary = CombineSummary::default();
    let files = match list_partitions(partition_dir) {
        Ok(files) => files,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(HarvestError::io(partition_dir)(e)),
    };
    clear_final(final_dir)?;
    if files.is_empty() {
        log::info!("No partitions under {}", partition_dir.display());
        return Ok(summary);
    }

    let mut owner: FxHashMap<Identifier, usize> = FxHashMap::default();
    let mut combined: Vec<Record> = Vec::new();
    for (file_idx, path) in files.iter().enumerate() {
        let records = match read_partition(path) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("{}: unreadable, skipping ({e})", path.display());
                summary.unreadable.push(path.clone());
                continue;
            }
        };
        summary.partitions_read += 1;
        for record in records {
            let keep = match owner.entry(record.identifier.clone()) {
                Entry::Vacant(v) => {
                    v.insert(file_idx);
                    true
                }
                Entry::Occupied(o) => *o.get() == file_idx,
            };
            if keep {
                combined.push(record);
            } else {
                summary.duplicates_dropped += 1;
            }
        }
    }

    if combined.is_empty() {
        log::info!("Partitions hold no records, nothing to combine");
        return Ok(summary);
    }

    fs::create_dir_all(final_dir).map_err(HarvestError::io(final_dir))?;
    let mut by_category: BTreeMap<Category, Vec<&Record>> = BTreeMap::new();
    for record in &combined {
        by_category.entry(record.category).or_default().push(record);
    }
    for (category, records) in &by_category {
        summary.by_category.insert(*category, records.len());
        let name = format!("{category}_records");
        write_output(final_dir, &name, records, zstd_level, &mut summary)?;
    }
    let all: Vec<&Record> = combined.iter().collect();
    write_output(final_dir, ALL_RECORDS, &all, zstd_level, &mut summary)?;
    summary.total = combined.len();
    Ok(summary)
}
