//! HTTP line streaming with optional gzip and per-read stall timeout.
//!
//! Async reqwest underneath, sync `BufRead` on top so rayon workers can
//! consume records lazily without owning a runtime.

use std::io::{self, BufReader, Read};
use std::pin::Pin;
use std::sync::{LazyLock, OnceLock};
use std::task::Context;
use std::time::Duration;

use flate2::read::GzDecoder;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, ReadBuf};

/// HTTP knobs shared by every request in the process
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// No bytes for this long on an open response = stall
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(30),
            user_agent: format!("commentline/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

static SETTINGS: OnceLock<HttpSettings> = OnceLock::new();

/// Install process-wide HTTP settings. Must run before the first request;
/// later calls are ignored.
pub fn set_http_settings(settings: HttpSettings) {
    if SETTINGS.set(settings).is_err() {
        log::debug!("HTTP settings already initialized, ignoring override");
    }
}

pub fn http_settings() -> &'static HttpSettings {
    SETTINGS.get_or_init(HttpSettings::default)
}

/// Error types for stream operations
#[derive(Debug)]
pub enum StreamError {
    /// HTTP error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    Io(io::Error),
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for StreamError {}

impl StreamError {
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    /// Client errors other than throttling mean the item is gone or forbidden;
    /// asking again won't help.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http {
                status: Some(s), ..
            } => *s == 429 || *s >= 500,
            Self::Http { status: None, .. } => true,
            Self::Io(e) => e.kind() != io::ErrorKind::StorageFull,
        }
    }
}

impl From<io::Error> for StreamError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    let settings = http_settings();
    reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .user_agent(settings.user_agent.clone())
        .pool_max_idle_per_host(4)
        .build()
        .expect("failed to build HTTP client")
});

pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

const LINE_BUF_SIZE: usize = 64 * 1024;

/// Buffered line reader over an HTTP response body (gunzipped when needed)
pub type LineReader = BufReader<Box<dyn Read + Send>>;

/// HTTP GET → (gunzip) → buffered reader.
///
/// The body is gunzipped when the URL ends in `.gz` or the server declares
/// `Content-Encoding: gzip` (reqwest is built without transparent decompression).
pub fn open_line_reader(url: &str) -> Result<LineReader, StreamError> {
    let (reader, gzipped) = SHARED_RUNTIME.handle().block_on(async {
        let response = http_client()
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StreamError::from_reqwest(&e))?;

        let gzip_encoded = response
            .headers()
            .get(reqwest::header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));

        let stream = response.bytes_stream();
        let async_reader = tokio_util::io::StreamReader::new(
            stream.map(|result| result.map_err(io::Error::other)),
        );

        Ok::<_, StreamError>((TimeoutReader::new(Box::pin(async_reader)), gzip_encoded))
    })?;

    let body: Box<dyn Read + Send> = if gzipped || url.ends_with(".gz") {
        Box::new(GzDecoder::new(reader))
    } else {
        Box::new(reader)
    };
    Ok(BufReader::with_capacity(LINE_BUF_SIZE, body))
}

/// Async-to-sync bridge with read timeout.
///
/// Each read has its own deadline; a stalled response surfaces as
/// `ErrorKind::TimedOut` instead of hanging the worker forever.
pub struct TimeoutReader {
    inner: Pin<Box<dyn AsyncRead + Send>>,
    timeout: Duration,
}

impl TimeoutReader {
    fn new(inner: Pin<Box<dyn AsyncRead + Send>>) -> Self {
        Self {
            inner,
            timeout: http_settings().read_timeout,
        }
    }
}

impl Read for TimeoutReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = self.timeout;
        SHARED_RUNTIME.handle().block_on(async {
            let read_future = async {
                let mut read_buf = ReadBuf::new(buf);
                std::future::poll_fn(|cx: &mut Context<'_>| {
                    Pin::as_mut(&mut self.inner).poll_read(cx, &mut read_buf)
                })
                .await?;
                Ok::<_, io::Error>(read_buf.filled().len())
            };

            match tokio::time::timeout(timeout, read_future).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("read timeout ({}s with no data)", timeout.as_secs()),
                )),
            }
        })
    }
}
