//! Table sinks: Parquet with atomic tmp→rename, CSV as the fallback codec

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::{Schema, SchemaRef};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

/// On-disk encoding of a table file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Parquet,
    Csv,
}

impl TableFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Csv => "csv",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "parquet" => Some(Self::Parquet),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

impl std::fmt::Display for TableFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// A finished table file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenTable {
    pub path: PathBuf,
    pub format: TableFormat,
    pub rows: usize,
}

/// Both codecs failed for one table
#[derive(Debug)]
pub struct SinkError {
    pub stem: PathBuf,
    pub parquet: io::Error,
    pub csv: io::Error,
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cannot write {}: parquet: {}; csv fallback: {}",
            self.stem.display(),
            self.parquet,
            self.csv
        )
    }
}

impl std::error::Error for SinkError {}

fn tmp_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Buffered parquet writer with atomic tmp→rename
pub struct ParquetSink {
    writer: ArrowWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    row_count: usize,
}

impl std::fmt::Debug for ParquetSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetSink")
            .field("final_path", &self.final_path)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl ParquetSink {
    /// Open a sink that becomes visible at `final_path` only on [`finalize`](Self::finalize)
    pub fn create(final_path: &Path, schema: &Schema, zstd_level: i32) -> io::Result<Self> {
        let tmp_path = tmp_path_for(final_path);
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let level = ZstdLevel::try_new(zstd_level)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(level))
            .build();

        let file = File::create(&tmp_path)?;
        let writer = ArrowWriter::try_new(file, Arc::new(schema.clone()), Some(props))
            .map_err(io::Error::other)?;

        Ok(Self {
            writer,
            tmp_path,
            final_path: final_path.to_path_buf(),
            row_count: 0,
        })
    }

    pub fn write_batch(&mut self, batch: &RecordBatch) -> io::Result<()> {
        self.row_count += batch.num_rows();
        self.writer.write(batch).map_err(io::Error::other)
    }

    /// Flush footer, fsync, and atomically rename tmp → final
    pub fn finalize(self) -> io::Result<usize> {
        let row_count = self.row_count;
        let file = self.writer.into_inner().map_err(io::Error::other)?;
        file.sync_all()?;
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(row_count)
    }
}

/// CSV writer (with header) using the same tmp→rename protocol
pub struct CsvSink {
    writer: arrow::csv::Writer<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    row_count: usize,
}

impl CsvSink {
    pub fn create(final_path: &Path) -> io::Result<Self> {
        let tmp_path = tmp_path_for(final_path);
        let file = File::create(&tmp_path)?;
        let writer = arrow::csv::WriterBuilder::new()
            .with_header(true)
            .build(file);
        Ok(Self {
            writer,
            tmp_path,
            final_path: final_path.to_path_buf(),
            row_count: 0,
        })
    }

    pub fn write_batch(&mut self, batch: &RecordBatch) -> io::Result<()> {
        self.row_count += batch.num_rows();
        self.writer.write(batch).map_err(io::Error::other)
    }

    pub fn finalize(self) -> io::Result<usize> {
        let row_count = self.row_count;
        let file = self.writer.into_inner();
        file.sync_all()?;
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(row_count)
    }
}

fn write_parquet(path: &Path, batch: &RecordBatch, zstd_level: i32) -> io::Result<usize> {
    let mut sink = ParquetSink::create(path, batch.schema().as_ref(), zstd_level)?;
    sink.write_batch(batch)?;
    sink.finalize()
}

fn write_csv(path: &Path, batch: &RecordBatch) -> io::Result<usize> {
    let mut sink = CsvSink::create(path)?;
    sink.write_batch(batch)?;
    sink.finalize()
}

/// Write `batch` to `{stem}.parquet`, falling back to `{stem}.csv` when the
/// Parquet codec fails. Any leftover tmp file from the failed attempt is removed.
pub fn write_table(
    stem: &Path,
    batch: &RecordBatch,
    zstd_level: i32,
) -> Result<WrittenTable, SinkError> {
    let parquet_path = stem.with_extension(TableFormat::Parquet.extension());
    let parquet_err = match write_parquet(&parquet_path, batch, zstd_level) {
        Ok(rows) => {
            return Ok(WrittenTable {
                path: parquet_path,
                format: TableFormat::Parquet,
                rows,
            });
        }
        Err(e) => e,
    };
    let _ = fs::remove_file(tmp_path_for(&parquet_path));
    log::warn!(
        "{}: parquet write failed ({parquet_err}), falling back to CSV",
        parquet_path.display()
    );

    let csv_path = stem.with_extension(TableFormat::Csv.extension());
    match write_csv(&csv_path, batch) {
        Ok(rows) => Ok(WrittenTable {
            path: csv_path,
            format: TableFormat::Csv,
            rows,
        }),
        Err(csv_err) => {
            let _ = fs::remove_file(tmp_path_for(&csv_path));
            Err(SinkError {
                stem: stem.to_path_buf(),
                parquet: parquet_err,
                csv: csv_err,
            })
        }
    }
}

/// Read every record batch from a Parquet or CSV table file.
///
/// CSV has no embedded schema, so `schema` drives its decoding; Parquet files
/// carry their own.
pub fn read_table(path: &Path, schema: &SchemaRef) -> io::Result<Vec<RecordBatch>> {
    let format = TableFormat::from_path(path).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unknown table format: {}", path.display()),
        )
    })?;
    let file = File::open(path)?;
    match format {
        TableFormat::Parquet => ParquetRecordBatchReaderBuilder::try_new(file)
            .and_then(|b| b.build())
            .map_err(io::Error::other)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(io::Error::other),
        TableFormat::Csv => arrow::csv::ReaderBuilder::new(schema.clone())
            .with_header(true)
            .build(file)
            .map_err(io::Error::other)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(io::Error::other),
    }
}

/// Check if a completed parquet file exists and has a valid footer
pub fn is_valid_parquet(path: &Path) -> bool {
    match File::open(path) {
        Ok(file) => parquet::file::reader::SerializedFileReader::new(file).is_ok(),
        Err(_) => false,
    }
}

/// Remove stale `.tmp` files left by an interrupted write
pub fn cleanup_tmp_files(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "tmp") {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}
