//! Commentline Core - shared infrastructure for comment harvesting pipelines
//!
//! Logging, progress bars, shutdown handling, HTTP line streaming,
//! retry with jittered backoff, and Parquet/CSV table sinks.

pub mod logging;
pub mod progress;
pub mod retry;
pub mod shutdown;
pub mod sink;
pub mod stream;

// Re-exports for convenience
pub use logging::{IndicatifLogger, Verbosity, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_duration, fmt_num};
pub use retry::{Backoff, Retryable, retry_with_backoff};
pub use shutdown::{install_signal_handlers, is_shutdown_requested, request_shutdown, shutdown_flag};
pub use sink::{
    CsvSink, ParquetSink, SinkError, TableFormat, WrittenTable, cleanup_tmp_files,
    is_valid_parquet, read_table, write_table,
};
pub use stream::{
    HttpSettings, LineReader, SHARED_RUNTIME, StreamError, http_client, open_line_reader,
    set_http_settings,
};
