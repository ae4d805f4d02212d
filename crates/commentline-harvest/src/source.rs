//! Comment sources: the capability a fetch unit pulls raw comments from

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::FetchError;
use crate::identifier::Identifier;

/// One raw comment as delivered by a source
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawComment {
    pub text: String,
}

/// Lazy, fallible stream of comments for one identifier
pub type CommentStream<'a> = Box<dyn Iterator<Item = Result<RawComment, FetchError>> + Send + 'a>;

/// Anything that can list the comments of a video
pub trait CommentSource: Send + Sync {
    /// Open the stream. Errors here are eligible for retry; errors yielded by
    /// the stream itself are not.
    fn stream(&self, identifier: &Identifier) -> Result<CommentStream<'_>, FetchError>;
}

/// JSON lines with a `text` field; blank lines are ignored
struct JsonLines<R> {
    reader: R,
    line_no: usize,
    buf: String,
    done: bool,
}

impl<R: BufRead> JsonLines<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            buf: String::new(),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for JsonLines<R> {
    type Item = Result<RawComment, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    self.line_no += 1;
                    let line = self.buf.trim();
                    if line.is_empty() {
                        continue;
                    }
                    return Some(serde_json::from_str(line).map_err(|e| {
                        self.done = true;
                        FetchError::Decode {
                            line: self.line_no,
                            message: e.to_string(),
                        }
                    }));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
        }
        None
    }
}

/// Comments over HTTP: GET a URL template (`{id}` is substituted), JSON lines,
/// gzip when the URL or response says so
pub struct HttpSource {
    url_template: String,
}

impl HttpSource {
    pub const PLACEHOLDER: &'static str = "{id}";

    /// `None` when the template has no `{id}` placeholder
    pub fn new(url_template: impl Into<String>) -> Option<Self> {
        let url_template = url_template.into();
        url_template
            .contains(Self::PLACEHOLDER)
            .then_some(Self { url_template })
    }

    pub fn url_for(&self, identifier: &Identifier) -> String {
        self.url_template
            .replace(Self::PLACEHOLDER, identifier.as_str())
    }
}

impl CommentSource for HttpSource {
    fn stream(&self, identifier: &Identifier) -> Result<CommentStream<'_>, FetchError> {
        let reader = commentline_core::open_line_reader(&self.url_for(identifier))?;
        Ok(Box::new(JsonLines::new(reader)))
    }
}

/// Comments captured to disk: `{root}/{id}.jsonl`, else `{root}/{id}.txt`
/// with one comment per line
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl CommentSource for DirectorySource {
    fn stream(&self, identifier: &Identifier) -> Result<CommentStream<'_>, FetchError> {
        let jsonl = self.root.join(format!("{identifier}.jsonl"));
        if jsonl.is_file() {
            let reader = BufReader::new(File::open(&jsonl)?);
            return Ok(Box::new(JsonLines::new(reader)));
        }
        let txt = self.root.join(format!("{identifier}.txt"));
        let reader = BufReader::new(File::open(&txt)?);
        Ok(Box::new(reader.lines().enumerate().filter_map(|(i, line)| {
            match line {
                Ok(text) if text.trim().is_empty() => None,
                Ok(text) => Some(Ok(RawComment { text })),
                Err(e) => Some(Err(FetchError::Decode {
                    line: i + 1,
                    message: e.to_string(),
                })),
            }
        })))
    }
}
