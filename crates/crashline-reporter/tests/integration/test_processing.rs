//! Processing passes: ordering, foreground gate, drops and vetoes

use std::sync::Arc;
use std::time::Duration;

use crashline_core::domain::DeliveryPriority;
use crashline_reporter::metrics::{cycle, outcome};
use crashline_reporter::{CycleOutcome, LifecycleState};

use crate::common::{self, files_on_disk, write_crash, RecordingDelegate};

#[tokio::test]
async fn send_now_delivers_oldest_first() {
    let h = common::harness();
    write_crash(&h.root, "00000000000000000001", b"f1");
    write_crash(&h.root, "00000000000000000002", b"f2");
    h.reporter.enable();

    assert_eq!(h.reporter.process_pending(), CycleOutcome::Delivered(2));

    assert_eq!(h.channel.reasons(), vec!["f1", "f2"]);
    assert_eq!(
        h.channel.priorities(),
        vec![DeliveryPriority::High, DeliveryPriority::High]
    );
    assert!(h.reporter.queued_files().is_empty());
    assert!(files_on_disk(&h.root).is_empty());
    assert_eq!(h.reporter.state(), LifecycleState::Idle);
    assert_eq!(h.reporter.metrics().outcome_count(outcome::DELIVERED), 2);
}

#[tokio::test]
async fn background_gate_leaves_queue_untouched() {
    let h = common::harness();
    write_crash(&h.root, "0001", b"crash");
    h.reporter.enable();
    h.app.set(false);

    assert_eq!(h.reporter.process_pending(), CycleOutcome::AbortedBackground);

    assert!(h.channel.sent().is_empty());
    assert_eq!(files_on_disk(&h.root), vec!["0001"]);
    assert_eq!(h.reporter.metrics().cycle_count(cycle::ABORTED_BACKGROUND), 1);

    // No automatic retry; the application triggers the next pass.
    h.app.set(true);
    assert_eq!(h.reporter.process_pending(), CycleOutcome::Delivered(1));
}

#[tokio::test]
async fn background_processing_when_allowed() {
    let h = common::harness_with(|config| config.process_in_background = true);
    write_crash(&h.root, "0001", b"crash");
    h.reporter.enable();
    h.app.set(false);

    assert_eq!(h.reporter.process_pending(), CycleOutcome::Delivered(1));
}

#[tokio::test]
async fn unreadable_and_unformattable_files_are_dropped() {
    let h = common::harness();
    write_crash(&h.root, "0001", b"garbage dump");
    write_crash(&h.root, "0002", &[0xff, 0xfe, 0xfd]);
    write_crash(&h.root, "0003", b"good crash");
    h.reporter.enable();

    assert_eq!(h.reporter.process_pending(), CycleOutcome::Delivered(1));

    assert_eq!(h.channel.reasons(), vec!["good crash"]);
    assert!(files_on_disk(&h.root).is_empty());
    assert_eq!(h.reporter.metrics().outcome_count(outcome::DROPPED_FORMAT), 2);
}

#[tokio::test]
async fn vetoed_report_is_removed_without_delivery() {
    let h = common::harness();
    write_crash(&h.root, "0001", b"keep me");
    write_crash(&h.root, "0002", b"skip me");
    h.reporter
        .set_delegate(Arc::new(RecordingDelegate::vetoing("skip me")));
    h.reporter.enable();

    assert_eq!(h.reporter.process_pending(), CycleOutcome::Delivered(1));

    assert_eq!(h.channel.reasons(), vec!["keep me"]);
    assert!(files_on_disk(&h.root).is_empty());
    assert_eq!(h.reporter.metrics().outcome_count(outcome::VETOED), 1);
}

#[tokio::test]
async fn everything_dropped_ends_empty() {
    let h = common::harness();
    write_crash(&h.root, "0001", b"garbage");
    h.reporter.enable();

    assert_eq!(h.reporter.process_pending(), CycleOutcome::Empty);
    assert_eq!(h.reporter.state(), LifecycleState::Idle);
}

#[tokio::test]
async fn files_appearing_later_join_the_next_pass() {
    let h = common::harness();
    h.reporter.enable();
    write_crash(&h.root, "0001", b"late crash");

    assert_eq!(h.reporter.process_pending(), CycleOutcome::Delivered(1));
}

#[tokio::test]
async fn pass_while_awaiting_confirmation_is_skipped() {
    let h = common::harness();
    write_crash(&h.root, "0001", b"crash");
    h.reporter.set_confirmation_handler(Arc::new(|_| true));
    h.reporter.enable();

    assert_eq!(h.reporter.process_pending(), CycleOutcome::AwaitingConfirmation(1));
    assert_eq!(h.reporter.process_pending(), CycleOutcome::SkippedBusy);
    assert_eq!(h.reporter.metrics().cycle_count(cycle::SKIPPED_BUSY), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn burst_of_triggers_runs_one_pass() {
    let h = common::harness_with(|config| config.debounce_ms = 50);
    write_crash(&h.root, "0001", b"first");
    write_crash(&h.root, "0002", b"second");

    h.reporter.enable();
    for _ in 0..5 {
        h.reporter.trigger_processing();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    for _ in 0..200 {
        if h.reporter.queued_files().is_empty() && h.reporter.state() == LifecycleState::Idle {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.channel.reasons(), vec!["first", "second"]);
    assert_eq!(h.reporter.metrics().cycle_count(cycle::COMPLETED), 1);
}
