//! Enable-time detection: capture activation, extraction and queue rebuild

use std::sync::atomic::Ordering;

use crashline_reporter::queue::MARKER_FILE_NAME;
use crashline_reporter::{CaptureStatus, LifecycleState};

use crate::common::{self, files_on_disk, write_crash};

#[tokio::test]
async fn enable_twice_installs_one_handler() {
    let h = common::harness();

    assert_eq!(h.reporter.enable(), CaptureStatus::Active);
    assert_eq!(h.reporter.enable(), CaptureStatus::Active);

    assert_eq!(h.capture.installs.load(Ordering::SeqCst), 1);
    assert!(!h.root.join(MARKER_FILE_NAME).exists());
    assert_eq!(h.reporter.state(), LifecycleState::Idle);
}

#[tokio::test]
async fn queue_holds_only_eligible_files() {
    let h = common::harness();
    let f1 = write_crash(&h.root, "f1", &[b'x'; 100]);
    write_crash(&h.root, "f2", b"");
    write_crash(&h.root, MARKER_FILE_NAME, b"");

    h.reporter.enable();

    assert_eq!(h.reporter.queued_files(), vec![f1]);
    // A marker left by an interrupted extraction is cleared at startup.
    assert!(!h.root.join(MARKER_FILE_NAME).exists());
}

#[tokio::test]
async fn leftovers_come_before_fresh_capture() {
    let h = common::harness();
    let leftover = write_crash(&h.root, "00000000000000000001", b"left over");
    h.capture.set_pending(b"fresh crash");

    h.reporter.enable();

    let queued = h.reporter.queued_files();
    assert_eq!(queued.len(), 2);
    assert_eq!(queued[0], leftover);
    assert_eq!(std::fs::read(&queued[1]).unwrap(), b"fresh crash");
    assert!(!h.capture.has_pending());
    assert_eq!(h.reporter.state(), LifecycleState::Debouncing);
}

#[tokio::test]
async fn last_session_report_is_exposed() {
    let h = common::harness();
    h.capture.set_pending(b"null pointer in renderer");

    h.reporter.enable();

    assert!(h.reporter.has_crashed_in_last_session());
    let report = h.reporter.last_session_crash_report().unwrap();
    assert_eq!(report.reason, "null pointer in renderer");
}

#[tokio::test]
async fn unformattable_capture_is_still_extracted_once() {
    let h = common::harness();
    h.capture.set_pending(b"garbage bytes");

    h.reporter.enable();

    assert!(h.reporter.has_crashed_in_last_session());
    assert!(h.reporter.last_session_crash_report().is_none());
    assert_eq!(h.capture.purges.load(Ordering::SeqCst), 1);
    assert_eq!(h.reporter.queued_files().len(), 1);
}

#[tokio::test]
async fn clean_start_stays_idle() {
    let h = common::harness();

    h.reporter.enable();

    assert!(!h.reporter.has_crashed_in_last_session());
    assert!(h.reporter.queued_files().is_empty());
    assert_eq!(h.reporter.state(), LifecycleState::Idle);
    assert!(files_on_disk(&h.root).is_empty());
}

#[tokio::test]
async fn debugger_skips_capture_but_detects_leftovers() {
    let h = common::harness();
    let reporter = crashline_reporter::CrashReporter::builder(
        crashline_core::config::ReporterConfig {
            storage_root: h.root.clone(),
            debounce_ms: 60_000,
            ..Default::default()
        },
        h.capture.clone(),
        std::sync::Arc::new(common::TextFormatter),
        h.channel.clone(),
    )
    .handler_registry(h.capture.clone())
    .settings(h.settings.clone())
    .debugger_probe(|| true)
    .build()
    .unwrap();
    write_crash(&h.root, "0001", b"old crash");

    assert_eq!(reporter.enable(), CaptureStatus::SkippedDebugger);
    assert_eq!(h.capture.installs.load(Ordering::SeqCst), 0);
    assert_eq!(reporter.queued_files().len(), 1);
}
