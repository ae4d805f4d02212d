//! Video identifiers: parsing, the deduplicated input set and list import

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::checkpoint::{ProgressLog, ProgressState};
use crate::error::HarvestError;

pub const IDENTIFIER_LEN: usize = 11;

/// 11-character opaque video identifier over `[A-Za-z0-9_-]`
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

fn is_id_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

impl Identifier {
    /// Parse a trimmed token; `None` unless it is exactly 11 valid characters
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        (s.len() == IDENTIFIER_LEN && s.bytes().all(is_id_char)).then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identifier {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s).ok_or_else(|| format!("invalid identifier: {s:?}"))
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Deduplicated identifiers in first-seen order
#[derive(Debug, Default, Clone)]
pub struct IdentifierSet {
    order: Vec<Identifier>,
    seen: FxHashSet<Identifier>,
}

impl IdentifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when already present
    pub fn insert(&mut self, id: Identifier) -> bool {
        if self.seen.contains(&id) {
            return false;
        }
        self.seen.insert(id.clone());
        self.order.push(id);
        true
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identifier> {
        self.order.iter()
    }

    /// Identifiers not yet processed, in first-seen order
    pub fn remaining(&self, progress: &ProgressState) -> Vec<Identifier> {
        self.order
            .iter()
            .filter(|id| !progress.is_processed(id))
            .cloned()
            .collect()
    }
}

impl FromIterator<Identifier> for IdentifierSet {
    fn from_iter<I: IntoIterator<Item = Identifier>>(iter: I) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

/// Parse a line-delimited list. Returns the set and the number of skipped lines;
/// lines that are not valid UTF-8 count as skipped.
pub fn parse_list(reader: impl BufRead) -> io::Result<(IdentifierSet, usize)> {
    let mut set = IdentifierSet::new();
    let mut skipped = 0;
    for raw in reader.split(b'\n') {
        let raw = raw?;
        let Ok(line) = std::str::from_utf8(&raw) else {
            skipped += 1;
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }
        match Identifier::parse(line) {
            Some(id) => {
                set.insert(id);
            }
            None => skipped += 1,
        }
    }
    Ok((set, skipped))
}

/// Read-side view over the identifier list and the persisted progress
pub struct IdentifierStore {
    input: PathBuf,
    progress: ProgressLog,
}

impl IdentifierStore {
    pub fn new(input: impl Into<PathBuf>, progress_path: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            progress: ProgressLog::new(progress_path),
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn load_all(&self) -> Result<IdentifierSet, HarvestError> {
        let malformed = |source| HarvestError::MalformedInput {
            path: self.input.clone(),
            source,
        };
        let file = File::open(&self.input).map_err(malformed)?;
        let (set, skipped) = parse_list(BufReader::new(file)).map_err(malformed)?;
        if skipped > 0 {
            log::debug!(
                "{}: skipped {skipped} line(s) that are not {IDENTIFIER_LEN}-char identifiers",
                self.input.display()
            );
        }
        Ok(set)
    }

    /// Last persisted progress; empty when absent or unreadable
    pub fn load_progress(&self) -> ProgressState {
        self.progress.replay()
    }

    pub fn remaining(&self, all: &IdentifierSet, progress: &ProgressState) -> Vec<Identifier> {
        all.remaining(progress)
    }
}

static URL_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[?&]v=|youtu\.be/|/shorts/|/embed/)([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)")
        .expect("valid identifier url regex")
});

/// Identifiers found in free text: watch/short URLs anywhere, plus lines that
/// are a bare identifier. First-seen order, deduplicated.
pub fn extract_identifiers(text: &str) -> IdentifierSet {
    let mut found = IdentifierSet::new();
    for line in text.lines() {
        if let Some(id) = Identifier::parse(line) {
            found.insert(id);
            continue;
        }
        for cap in URL_ID.captures_iter(line) {
            if let Some(id) = cap.get(1).and_then(|m| Identifier::parse(m.as_str())) {
                found.insert(id);
            }
        }
    }
    found
}

/// Outcome of merging identifiers into a list file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub found: usize,
    pub added: usize,
    pub total: usize,
}

/// Append identifiers missing from the list at `path`, creating it if needed
pub fn append_new(path: &Path, found: &IdentifierSet) -> io::Result<ImportReport> {
    let mut existing = match File::open(path) {
        Ok(f) => parse_list(BufReader::new(f))?.0,
        Err(e) if e.kind() == io::ErrorKind::NotFound => IdentifierSet::new(),
        Err(e) => return Err(e),
    };

    let fresh: Vec<&Identifier> = found.iter().filter(|id| !existing.contains(id)).collect();
    if !fresh.is_empty() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let needs_newline = fs::read(path)
            .map(|bytes| bytes.last().is_some_and(|b| *b != b'\n'))
            .unwrap_or(false);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if needs_newline {
            writeln!(file)?;
        }
        for id in &fresh {
            writeln!(file, "{id}")?;
        }
        file.sync_data()?;
    }

    let added = fresh.len();
    for id in fresh {
        existing.insert(id.clone());
    }
    Ok(ImportReport {
        found: found.len(),
        added,
        total: existing.len(),
    })
}
