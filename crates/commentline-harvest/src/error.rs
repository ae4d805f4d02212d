//! Error types for the harvest pipeline

use std::io;
use std::path::PathBuf;

use commentline_core::{Retryable, SinkError, StreamError};

use crate::identifier::Identifier;

/// Failure while opening or consuming one identifier's comment stream
#[derive(Debug)]
pub enum FetchError {
    Stream(StreamError),
    /// A line in the stream could not be decoded
    Decode { line: usize, message: String },
    /// The source has nothing under this identifier
    NotFound,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(e) => write!(f, "{e}"),
            Self::Decode { line, message } => write!(f, "bad record on line {line}: {message}"),
            Self::NotFound => write!(f, "no comments available"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Stream(e) => Some(e),
            _ => None,
        }
    }
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Stream(e) => e.is_retryable(),
            Self::Decode { .. } | Self::NotFound => false,
        }
    }
}

impl From<StreamError> for FetchError {
    fn from(e: StreamError) -> Self {
        Self::Stream(e)
    }
}

impl From<io::Error> for FetchError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Stream(StreamError::Io(e))
        }
    }
}

/// Fetch gave up on an identifier; `partial` holds what arrived before the failure
#[derive(Debug)]
pub struct FetchFailure {
    pub identifier: Identifier,
    pub error: FetchError,
    pub partial: Vec<String>,
    /// Stream-open attempts made (1 = no retries)
    pub attempts: u32,
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} after {} attempt(s), {} partial record(s)",
            self.identifier,
            self.error,
            self.attempts,
            self.partial.len()
        )
    }
}

impl std::error::Error for FetchFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Errors that stop (or refuse to start) a harvest
#[derive(Debug)]
pub enum HarvestError {
    /// The identifier source cannot be read
    MalformedInput { path: PathBuf, source: io::Error },
    /// Neither Parquet nor CSV could persist a partition
    PartitionWrite(SinkError),
    /// A final combined table could not be written
    OutputWrite(SinkError),
    /// The progress log could not be appended to or removed
    ProgressWrite { path: PathBuf, source: io::Error },
    /// Another run holds the progress lock
    Locked { path: PathBuf, owner: String },
    InvalidConfig(String),
    Io { path: PathBuf, source: io::Error },
}

impl std::fmt::Display for HarvestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedInput { path, source } => {
                write!(f, "cannot read identifier list {}: {source}", path.display())
            }
            Self::PartitionWrite(e) => write!(f, "partition write failed: {e}"),
            Self::OutputWrite(e) => write!(f, "final output write failed: {e}"),
            Self::ProgressWrite { path, source } => {
                write!(f, "cannot update progress log {}: {source}", path.display())
            }
            Self::Locked { path, owner } => write!(
                f,
                "another harvest is running ({} held by {owner}); remove the file if that run is gone",
                path.display()
            ),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
        }
    }
}

impl std::error::Error for HarvestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MalformedInput { source, .. }
            | Self::ProgressWrite { source, .. }
            | Self::Io { source, .. } => Some(source),
            Self::PartitionWrite(e) | Self::OutputWrite(e) => Some(e),
            Self::Locked { .. } | Self::InvalidConfig(_) => None,
        }
    }
}

impl HarvestError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_errors_keep_their_retry_verdict() {
        let throttled = FetchError::Stream(StreamError::Http {
            status: Some(429),
            message: "slow down".into(),
        });
        let gone = FetchError::Stream(StreamError::Http {
            status: Some(404),
            message: "gone".into(),
        });
        assert!(throttled.is_retryable());
        assert!(!gone.is_retryable());
    }

    #[test]
    fn decode_and_missing_are_final() {
        assert!(!FetchError::Decode {
            line: 3,
            message: "x".into()
        }
        .is_retryable());
        assert!(!FetchError::NotFound.is_retryable());
    }

    #[test]
    fn io_not_found_maps_to_not_found() {
        let e: FetchError = io::Error::new(io::ErrorKind::NotFound, "nope").into();
        assert!(matches!(e, FetchError::NotFound));
        let e: FetchError = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        assert!(e.is_retryable());
    }

    #[test]
    fn failure_display_mentions_partial_count() {
        let failure = FetchFailure {
            identifier: Identifier::parse("AAAAAAAAAAA").unwrap(),
            error: FetchError::NotFound,
            partial: vec!["a".into(), "b".into()],
            attempts: 1,
        };
        let msg = failure.to_string();
        assert!(msg.starts_with("AAAAAAAAAAA:"));
        assert!(msg.contains("2 partial"));
    }
}
