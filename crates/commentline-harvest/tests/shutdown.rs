//! Runs in its own process: the shutdown flag is global.

use std::fs;

use commentline_core::{request_shutdown, ProgressContext};
use commentline_harvest::{
    run, CooldownConfig, DirectorySource, HarvestConfig, PacingConfig, Span, StopReason,
};
use tempfile::TempDir;

#[test]
fn shutdown_request_stops_before_first_batch() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("ids.txt");
    fs::write(&input, "AAAAAAAAAAA\nBBBBBBBBBBB\n").unwrap();
    let comments = dir.path().join("comments");
    fs::create_dir(&comments).unwrap();
    fs::write(comments.join("AAAAAAAAAAA.txt"), "nalla video bro\n").unwrap();
    fs::write(comments.join("BBBBBBBBBBB.txt"), "semma\n").unwrap();

    let cfg = HarvestConfig {
        input,
        output_dir: dir.path().join("out"),
        batch_size: 1,
        deadline_secs: None,
        pacing: PacingConfig::disabled(),
        cooldown: CooldownConfig {
            every_batches: 0,
            secs: Span::zero(),
        },
        ..Default::default()
    };

    request_shutdown();
    let outcome = run(
        &cfg,
        &DirectorySource::new(&comments),
        &ProgressContext::hidden(),
    )
    .unwrap();

    assert_eq!(outcome.report.summary.stop, StopReason::Shutdown);
    assert_eq!(outcome.report.summary.committed_batches, 0);
    assert_eq!(outcome.processed_identifiers, 0);
    assert!(!outcome.complete);
    assert!(!cfg.lock_path().exists());
}
