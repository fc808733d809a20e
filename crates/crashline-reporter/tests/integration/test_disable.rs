//! Disabling the reporter: purge, dormant capture, re-enable

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crashline_core::config::{Distribution, ReporterConfig};
use crashline_reporter::queue::MARKER_FILE_NAME;
use crashline_reporter::{CrashReporter, CycleOutcome, LifecycleState};

use crate::common::{self, files_on_disk, write_crash, GatedFormatter};

#[tokio::test]
async fn disable_purges_queue_and_marker() {
    let h = common::harness();
    write_crash(&h.root, "0001", b"one");
    write_crash(&h.root, "0002", b"two");
    h.reporter.enable();
    write_crash(&h.root, MARKER_FILE_NAME, b"");

    h.reporter.disable();

    assert!(files_on_disk(&h.root).is_empty());
    assert!(h.reporter.queued_files().is_empty());
    assert_eq!(h.reporter.state(), LifecycleState::Idle);
    assert_eq!(h.reporter.process_pending(), CycleOutcome::Disabled);
}

#[tokio::test]
async fn disable_drops_batch_awaiting_confirmation() {
    let h = common::harness();
    write_crash(&h.root, "0001", b"one");
    h.reporter.set_confirmation_handler(Arc::new(|_| true));
    h.reporter.enable();
    assert_eq!(h.reporter.process_pending(), CycleOutcome::AwaitingConfirmation(1));

    h.reporter.disable();

    assert!(h.reporter.pending_reports().is_empty());
    assert!(files_on_disk(&h.root).is_empty());
    assert!(h
        .reporter
        .notify_user_confirmation(crashline_core::domain::UserConfirmation::Send)
        .is_err());
    assert!(h.channel.sent().is_empty());
}

#[tokio::test]
async fn disable_keeps_capture_installed() {
    let h = common::harness();
    h.reporter.enable();
    h.reporter.disable();
    h.reporter.enable();

    assert_eq!(h.capture.installs.load(Ordering::SeqCst), 1);
    assert!(h.reporter.is_enabled());
}

#[tokio::test]
async fn disabled_capture_stays_dormant_until_reenabled() {
    let h = common::harness();
    h.reporter.enable();
    assert!(h.capture.is_armed());

    h.reporter.disable();
    assert!(!h.capture.is_armed());

    h.reporter.enable();
    assert!(h.capture.is_armed());
}

#[tokio::test]
async fn pass_running_across_disable_never_delivers() {
    let gate = Arc::new(GatedFormatter::new());
    let h = common::harness_with_formatter(gate.clone());
    write_crash(&h.root, "0001", b"slow crash");
    h.reporter.enable();

    let stale = {
        let reporter = h.reporter.clone();
        std::thread::spawn(move || reporter.process_pending())
    };
    gate.wait_entered();

    h.reporter.disable();
    h.reporter.enable();
    write_crash(&h.root, "0002", b"fresh crash");

    // The old pass still holds the guard.
    assert_eq!(h.reporter.process_pending(), CycleOutcome::SkippedBusy);

    gate.release();
    assert_eq!(stale.join().unwrap(), CycleOutcome::Disabled);
    assert!(h.channel.sent().is_empty());

    assert_eq!(h.reporter.process_pending(), CycleOutcome::Delivered(1));
    assert_eq!(h.channel.reasons(), vec!["fresh crash"]);
}

#[tokio::test]
async fn disable_releases_parked_batch_guard() {
    let h = common::harness();
    write_crash(&h.root, "0001", b"one");
    h.reporter.set_confirmation_handler(Arc::new(|_| true));
    h.reporter.enable();
    assert_eq!(h.reporter.process_pending(), CycleOutcome::AwaitingConfirmation(1));

    h.reporter.disable();
    h.reporter.enable();
    write_crash(&h.root, "0002", b"two");

    assert_eq!(h.reporter.process_pending(), CycleOutcome::AwaitingConfirmation(1));
    assert_eq!(h.reporter.pending_reports()[0].reason, "two");
}

#[tokio::test]
async fn reenable_picks_up_new_leftovers() {
    let h = common::harness();
    h.reporter.enable();
    h.reporter.disable();
    write_crash(&h.root, "0001", b"after disable");

    h.reporter.enable();

    assert_eq!(h.reporter.queued_files().len(), 1);
    assert_eq!(h.reporter.process_pending(), CycleOutcome::Delivered(1));
}

#[tokio::test]
async fn test_crash_is_ignored_in_store_builds() {
    let h = common::harness();
    let reporter = CrashReporter::builder(
        ReporterConfig {
            storage_root: h.root.clone(),
            distribution: Distribution::Store,
            ..Default::default()
        },
        h.capture.clone(),
        Arc::new(common::TextFormatter),
        h.channel.clone(),
    )
    .handler_registry(h.capture.clone())
    .settings(h.settings.clone())
    .debugger_probe(|| false)
    .build()
    .unwrap();
    reporter.enable();

    // Returns instead of crashing.
    reporter.generate_test_crash();
    assert!(reporter.is_enabled());
}

#[tokio::test]
async fn test_crash_is_ignored_while_disabled() {
    let h = common::harness();
    h.reporter.generate_test_crash();
    assert!(!h.reporter.is_enabled());
}
