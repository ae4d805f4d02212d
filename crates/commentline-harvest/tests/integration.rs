use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use commentline_core::{read_table, write_table, ProgressContext, StreamError};
use commentline_harvest::checkpoint::Batch;
use commentline_harvest::schema::{records_from_batch, records_schema, records_to_batch};
use commentline_harvest::{
    run, Category, CheckpointManager, Classifier, CommentSource, CommentStream, CooldownConfig,
    FetchError, HarvestConfig, HarvestError, Identifier, IdentifierStore, PacingConfig,
    RawComment, Record, Scheduler, SelectionPolicy, Span, StopReason,
};
use tempfile::TempDir;

/// In-memory source: fixed comments per identifier, optional per-open delay,
/// optional mid-stream failure after the listed comments
#[derive(Default)]
struct MapSource {
    comments: HashMap<String, Vec<String>>,
    broken: Vec<String>,
    delay: Duration,
    opens: AtomicUsize,
}

impl MapSource {
    fn with(mut self, id: &str, texts: &[&str]) -> Self {
        self.comments
            .insert(id.to_string(), texts.iter().map(|t| t.to_string()).collect());
        self
    }

    fn broken_after(mut self, id: &str, texts: &[&str]) -> Self {
        self.broken.push(id.to_string());
        self.with(id, texts)
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl CommentSource for MapSource {
    fn stream(&self, identifier: &Identifier) -> Result<CommentStream<'_>, FetchError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let texts = self
            .comments
            .get(identifier.as_str())
            .cloned()
            .unwrap_or_default();
        let items = texts.into_iter().map(|text| Ok(RawComment { text }));
        let tail = self.broken.iter().any(|b| b == identifier.as_str()).then(|| {
            Err(FetchError::Stream(StreamError::Http {
                status: None,
                message: "connection reset".into(),
            }))
        });
        Ok(Box::new(items.chain(tail)))
    }
}

fn write_ids(dir: &Path, ids: &[&str]) -> PathBuf {
    let path = dir.join("ids.txt");
    fs::write(&path, ids.join("\n")).unwrap();
    path
}

/// Fast config: no pacing, no cool-down, no deadline
fn config(dir: &Path, ids: &[&str], batch_size: usize) -> HarvestConfig {
    HarvestConfig {
        input: write_ids(dir, ids),
        output_dir: dir.join("out"),
        batch_size,
        workers: 3,
        deadline_secs: None,
        pacing: PacingConfig::disabled(),
        cooldown: CooldownConfig {
            every_batches: 0,
            secs: Span::zero(),
        },
        ..Default::default()
    }
}

fn read_records(path: &Path) -> Vec<Record> {
    read_table(path, &records_schema())
        .unwrap()
        .iter()
        .flat_map(|b| records_from_batch(b).unwrap())
        .collect()
}

/// (identifier, text, category) sorted, ignoring capture time
fn content(records: &[Record]) -> Vec<(String, String, Category)> {
    let mut rows: Vec<_> = records
        .iter()
        .map(|r| (r.identifier.to_string(), r.text.clone(), r.category))
        .collect();
    rows.sort();
    rows
}

fn id(s: &str) -> Identifier {
    Identifier::parse(s).unwrap()
}

fn sample_source() -> MapSource {
    MapSource::default()
        .with("AAAAAAAAAAA", &["nalla video bro", "வணக்கம்"])
        .with("BBBBBBBBBBB", &[])
        .with("CCCCCCCCCCC", &["super sir", "வணக்கம் anna", "  spaced   out  "])
        .with("DDDDDDDDDDD", &["semma", "ok"])
        .with("EEEEEEEEEEE", &["thala varuma"])
}

const SAMPLE_IDS: [&str; 5] = [
    "AAAAAAAAAAA",
    "BBBBBBBBBBB",
    "CCCCCCCCCCC",
    "DDDDDDDDDDD",
    "EEEEEEEEEEE",
];

#[test]
fn two_identifier_example() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), &["AAAAAAAAAAA", "BBBBBBBBBBB"], 1);
    cfg.policy = SelectionPolicy::MixedOnly;
    let source = MapSource::default()
        .with("AAAAAAAAAAA", &["nalla video bro"])
        .with("BBBBBBBBBBB", &[]);

    let outcome = run(&cfg, &source, &ProgressContext::hidden()).unwrap();

    assert!(outcome.complete);
    assert_eq!(outcome.processed_identifiers, 2);
    assert_eq!(outcome.report.summary.committed_batches, 2);
    assert!(!cfg.progress_path().exists());
    assert!(!cfg.lock_path().exists());

    assert_eq!(outcome.combine.total, 1);
    assert_eq!(outcome.combine.count(Category::CodeMixed), 1);
    let all = read_records(&cfg.final_dir().join("all_records.parquet"));
    assert_eq!(
        content(&all),
        [(
            "AAAAAAAAAAA".to_string(),
            "nalla video bro".to_string(),
            Category::CodeMixed
        )]
    );
}

#[test]
fn whitespace_normalized_and_categories_split() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &SAMPLE_IDS, 2);
    let outcome = run(&cfg, &sample_source(), &ProgressContext::hidden()).unwrap();

    let summary = &outcome.combine;
    assert_eq!(summary.total, 8);
    assert_eq!(summary.count(Category::PureNative), 1);
    assert_eq!(summary.count(Category::MixedLatinNative), 1);
    assert_eq!(summary.count(Category::CodeMixed), 4);
    assert_eq!(summary.count(Category::Plain), 2);

    let plain = read_records(&cfg.final_dir().join("plain_records.parquet"));
    assert!(plain.iter().any(|r| r.text == "spaced out"));
    assert!(!cfg.final_dir().join("empty_records.parquet").exists());
}

#[test]
fn mixed_only_policy_discards_the_rest() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), &SAMPLE_IDS, 5);
    cfg.policy = SelectionPolicy::MixedOnly;
    let outcome = run(&cfg, &sample_source(), &ProgressContext::hidden()).unwrap();

    assert_eq!(outcome.report.summary.texts, 8);
    assert_eq!(outcome.report.summary.kept, 5);
    assert_eq!(outcome.report.summary.discarded, 3);
    assert_eq!(outcome.combine.total, 5);
    assert!(!cfg.final_dir().join("pure_native_records.parquet").exists());
}

#[test]
fn resume_matches_uninterrupted_run() {
    // Uninterrupted
    let full_dir = TempDir::new().unwrap();
    let full_cfg = config(full_dir.path(), &SAMPLE_IDS, 2);
    run(&full_cfg, &sample_source(), &ProgressContext::hidden()).unwrap();
    let expected = content(&read_records(
        &full_cfg.final_dir().join("all_records.parquet"),
    ));

    // Stopped after the first batch, then resumed
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &SAMPLE_IDS, 2);
    let source = sample_source();
    {
        let store = IdentifierStore::new(&cfg.input, cfg.progress_path());
        let all = store.load_all().unwrap();
        let remaining = store.remaining(&all, &store.load_progress());
        let classifier = Classifier::default();
        let progress = ProgressContext::hidden();
        let mut cp = CheckpointManager::open(&cfg, store.load_progress()).unwrap();
        let scheduler = Scheduler::new(&cfg, &source, &classifier, &progress).unwrap();
        scheduler.run(&remaining[..2], &mut cp, None).unwrap();
    }
    assert!(cfg.progress_path().exists());
    let opens_before = source.opens.load(Ordering::SeqCst);
    assert_eq!(opens_before, 2);

    let outcome = run(&cfg, &source, &ProgressContext::hidden()).unwrap();
    assert!(outcome.complete);
    // Only the three unprocessed identifiers were fetched again
    assert_eq!(source.opens.load(Ordering::SeqCst), opens_before + 3);
    assert_eq!(outcome.report.batches[0].batch_number, 2);

    let resumed = content(&read_records(&cfg.final_dir().join("all_records.parquet")));
    assert_eq!(resumed, expected);
}

#[test]
fn partition_without_commit_is_redone_once() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &["AAAAAAAAAAA", "DDDDDDDDDDD"], 1);
    let source = sample_source();

    // Crash between partition write and progress append
    let cp = CheckpointManager::open(&cfg, Default::default()).unwrap();
    let orphan = Record {
        identifier: id("AAAAAAAAAAA"),
        text: "nalla video bro".into(),
        category: Category::CodeMixed,
        capture_time: chrono::Utc::now(),
    };
    cp.write_partition(
        &Batch {
            number: 1,
            identifiers: vec![id("AAAAAAAAAAA")],
        },
        &[orphan],
    )
    .unwrap();
    drop(cp);

    let store = IdentifierStore::new(&cfg.input, cfg.progress_path());
    let all = store.load_all().unwrap();
    assert_eq!(store.remaining(&all, &store.load_progress()).len(), 2);

    let outcome = run(&cfg, &source, &ProgressContext::hidden()).unwrap();
    assert!(outcome.complete);
    assert_eq!(outcome.combine.partitions_read, 3);
    assert_eq!(outcome.combine.duplicates_dropped, 2);

    let all = read_records(&cfg.final_dir().join("all_records.parquet"));
    let a_rows = all
        .iter()
        .filter(|r| r.identifier.as_str() == "AAAAAAAAAAA")
        .count();
    assert_eq!(a_rows, 1);
    assert_eq!(all.len(), 3);
}

#[test]
fn deadline_stops_before_next_batch() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &["AAAAAAAAAAA", "DDDDDDDDDDD", "EEEEEEEEEEE"], 1);
    let source = sample_source().delayed(Duration::from_millis(50));
    let classifier = Classifier::default();
    let progress = ProgressContext::hidden();
    let scheduler = Scheduler::new(&cfg, &source, &classifier, &progress).unwrap();
    let mut cp = CheckpointManager::open(&cfg, Default::default()).unwrap();

    let remaining = vec![id("AAAAAAAAAAA"), id("DDDDDDDDDDD"), id("EEEEEEEEEEE")];
    let deadline = Instant::now() + Duration::from_millis(30);
    let report = scheduler.run(&remaining, &mut cp, Some(deadline)).unwrap();

    assert_eq!(report.summary.stop, StopReason::Deadline);
    assert_eq!(report.batches.len(), 1);
    assert!(cp.state().is_processed(&id("AAAAAAAAAAA")));
    assert!(!cp.state().is_processed(&id("DDDDDDDDDDD")));
    assert!(report.batches[0].partition.as_ref().unwrap().exists());
}

#[test]
fn zero_deadline_keeps_progress_for_next_run() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), &SAMPLE_IDS, 2);
    cfg.deadline_secs = Some(0);
    let outcome = run(&cfg, &sample_source(), &ProgressContext::hidden()).unwrap();

    assert_eq!(outcome.report.summary.stop, StopReason::Deadline);
    assert!(!outcome.complete);
    assert_eq!(outcome.remaining(), 5);
    assert_eq!(outcome.combine.total, 0);
}

#[test]
fn partial_texts_survive_mid_stream_failure() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &["AAAAAAAAAAA"], 1);
    let source = MapSource::default().broken_after("AAAAAAAAAAA", &["semma", "nalla"]);
    let outcome = run(&cfg, &source, &ProgressContext::hidden()).unwrap();

    assert_eq!(outcome.report.summary.fetch_failures, 1);
    assert_eq!(outcome.combine.total, 2);
    assert!(outcome.complete);
    // no retry once items arrived
    assert_eq!(source.opens.load(Ordering::SeqCst), 1);
}

#[test]
fn corrupt_progress_restarts_from_scratch() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &["AAAAAAAAAAA", "DDDDDDDDDDD"], 1);
    fs::create_dir_all(&cfg.output_dir).unwrap();
    fs::write(cfg.progress_path(), "\u{0}\u{1}garbage{{{").unwrap();

    let outcome = run(&cfg, &sample_source(), &ProgressContext::hidden()).unwrap();
    assert!(outcome.complete);
    assert_eq!(outcome.report.summary.identifiers, 2);
}

#[test]
fn resumed_run_skips_everything_already_done() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &["AAAAAAAAAAA"], 1);
    let source = sample_source();
    {
        let classifier = Classifier::default();
        let progress = ProgressContext::hidden();
        let mut cp = CheckpointManager::open(&cfg, Default::default()).unwrap();
        let scheduler = Scheduler::new(&cfg, &source, &classifier, &progress).unwrap();
        scheduler.run(&[id("AAAAAAAAAAA")], &mut cp, None).unwrap();
    }
    let outcome = run(&cfg, &source, &ProgressContext::hidden()).unwrap();
    assert_eq!(source.opens.load(Ordering::SeqCst), 1);
    assert!(outcome.report.batches.is_empty());
    assert!(outcome.complete);
    assert!(!cfg.progress_path().exists());
    assert_eq!(outcome.combine.total, 2);
}

#[test]
fn concurrent_run_is_refused() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &["AAAAAAAAAAA"], 1);
    fs::create_dir_all(&cfg.output_dir).unwrap();
    fs::write(cfg.lock_path(), "4242\n").unwrap();

    let err = run(&cfg, &sample_source(), &ProgressContext::hidden()).unwrap_err();
    match err.downcast_ref::<HarvestError>() {
        Some(HarvestError::Locked { owner, .. }) => assert_eq!(owner, "pid 4242"),
        other => panic!("expected Locked, got {other:?}"),
    }
    assert!(cfg.lock_path().exists());
}

#[test]
fn missing_identifier_list_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), &[], 1);
    cfg.input = dir.path().join("absent.txt");
    let err = run(&cfg, &sample_source(), &ProgressContext::hidden()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HarvestError>(),
        Some(HarvestError::MalformedInput { .. })
    ));
    assert!(!cfg.lock_path().exists());
}

#[test]
fn csv_fallback_partitions_combine_to_parquet() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), &["AAAAAAAAAAA", "CCCCCCCCCCC"], 1);
    cfg.zstd_level = 99;
    let outcome = run(&cfg, &sample_source(), &ProgressContext::hidden()).unwrap();

    assert!(outcome.complete);
    let csvs = fs::read_dir(cfg.partitions_dir())
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .path()
                .extension()
                .is_some_and(|x| x == "csv")
        })
        .count();
    assert_eq!(csvs, 2);
    // final outputs also fall back to CSV at this level
    assert_eq!(outcome.combine.total, 5);
    assert!(cfg.final_dir().join("all_records.csv").exists());
}

#[test]
fn combine_is_repeatable() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &SAMPLE_IDS, 2);
    let first = run(&cfg, &sample_source(), &ProgressContext::hidden()).unwrap();
    let again =
        commentline_harvest::combine(&cfg.partitions_dir(), &cfg.final_dir(), cfg.zstd_level)
            .unwrap();
    assert_eq!(first.combine.by_category, again.by_category);
    assert_eq!(
        content(&read_records(&cfg.final_dir().join("all_records.parquet"))).len(),
        8
    );
}

#[test]
fn hand_written_partition_is_picked_up() {
    let dir = TempDir::new().unwrap();
    let parts = dir.path().join("partitions");
    fs::create_dir_all(&parts).unwrap();
    let records = vec![Record {
        identifier: id("ZZZZZZZZZZZ"),
        text: "hello bro".into(),
        category: Category::CodeMixed,
        capture_time: chrono::Utc::now(),
    }];
    write_table(
        &parts.join("batch_00009_20261018"),
        &records_to_batch(&records).unwrap(),
        3,
    )
    .unwrap();
    let summary = commentline_harvest::combine(&parts, &dir.path().join("final"), 3).unwrap();
    assert_eq!(summary.count(Category::CodeMixed), 1);
}
