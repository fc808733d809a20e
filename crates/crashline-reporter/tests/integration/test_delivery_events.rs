//! Delivery outcomes forwarded from the channel to the delegate

use std::sync::Arc;

use crashline_core::domain::{ErrorAttachment, StructuredLog};
use crashline_core::ports::{DeliveryListener, DeliveryOutcome};
use crashline_reporter::{CycleOutcome, IN_FLIGHT_LIMIT};

use crate::common::{self, write_crash, RecordingDelegate};

#[tokio::test]
async fn delegate_hears_outcomes_for_crash_logs() {
    let h = common::harness();
    let delegate = Arc::new(RecordingDelegate::default());
    h.reporter.set_delegate(delegate.clone());
    write_crash(&h.root, "0001", b"first");
    write_crash(&h.root, "0002", b"second");
    h.reporter.enable();
    assert_eq!(h.reporter.process_pending(), CycleOutcome::Delivered(2));

    let sent = h.channel.sent();
    h.reporter.on_delivery_event(&sent[0], &DeliveryOutcome::WillSend);
    h.reporter.on_delivery_event(&sent[0], &DeliveryOutcome::Succeeded);
    h.reporter
        .on_delivery_event(&sent[1], &DeliveryOutcome::Failed("timeout".into()));

    assert_eq!(
        delegate.events(),
        vec![
            "will_send:first",
            "did_succeed:first",
            "did_fail(timeout):second",
        ]
    );
}

#[tokio::test]
async fn other_log_kinds_are_ignored() {
    let h = common::harness();
    let delegate = Arc::new(RecordingDelegate::default());
    h.reporter.set_delegate(delegate.clone());

    let mut log = StructuredLog::new("page view");
    log.kind = "event".into();
    h.reporter.on_delivery_event(&log, &DeliveryOutcome::Succeeded);

    assert!(delegate.events().is_empty());
}

#[tokio::test]
async fn unknown_crash_log_is_projected_on_the_fly() {
    let h = common::harness();
    let delegate = Arc::new(RecordingDelegate::default());
    h.reporter.set_delegate(delegate.clone());

    // Handed to the channel by an earlier process.
    let log = StructuredLog::new("from last run");
    h.reporter.on_delivery_event(&log, &DeliveryOutcome::Succeeded);

    assert_eq!(delegate.events(), vec!["did_succeed:from last run"]);
}

#[tokio::test]
async fn cleared_delegate_hears_nothing() {
    let h = common::harness();
    let delegate = Arc::new(RecordingDelegate::default());
    h.reporter.set_delegate(delegate.clone());
    h.reporter.clear_delegate();

    h.reporter
        .on_delivery_event(&StructuredLog::new("x"), &DeliveryOutcome::WillSend);
    assert!(delegate.events().is_empty());
}

#[tokio::test]
async fn valid_attachments_travel_with_the_log() {
    let h = common::harness();
    h.reporter.set_delegate(Arc::new(RecordingDelegate::with_attachments(vec![
        ErrorAttachment::text("last 100 log lines", Some("app.log")),
        ErrorAttachment::binary(Vec::new(), Some("empty.bin"), "application/octet-stream"),
    ])));
    write_crash(&h.root, "0001", b"crash");
    h.reporter.enable();
    h.reporter.process_pending();

    let sent = h.channel.sent();
    assert_eq!(sent[0].attachments.len(), 1);
    assert_eq!(sent[0].attachments[0].file_name.as_deref(), Some("app.log"));
}

#[tokio::test]
async fn disable_forgets_reports_in_flight() {
    let h = common::harness();
    let delegate = Arc::new(RecordingDelegate::default());
    h.reporter.set_delegate(delegate.clone());
    write_crash(&h.root, "0001", b"crash");
    h.reporter.enable();
    h.reporter.process_pending();
    assert_eq!(h.reporter.in_flight_len(), 1);

    h.reporter.disable();
    assert_eq!(h.reporter.in_flight_len(), 0);

    // A late outcome still reaches the delegate through the log.
    let sent = h.channel.sent();
    h.reporter.on_delivery_event(&sent[0], &DeliveryOutcome::Succeeded);
    assert_eq!(delegate.events(), vec!["did_succeed:crash"]);
}

#[tokio::test]
async fn in_flight_reports_are_bounded() {
    let h = common::harness();
    h.reporter.enable();
    for i in 0..IN_FLIGHT_LIMIT + 3 {
        write_crash(&h.root, &format!("{i:04}"), format!("crash {i}").as_bytes());
    }

    assert_eq!(
        h.reporter.process_pending(),
        CycleOutcome::Delivered(IN_FLIGHT_LIMIT + 3)
    );
    assert_eq!(h.reporter.in_flight_len(), IN_FLIGHT_LIMIT);
}
