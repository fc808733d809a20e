//! Confirmation protocol: prompts, decisions and the always-send flag

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crashline_core::config::ReporterConfig;
use crashline_core::domain::UserConfirmation;
use crashline_reporter::{
    ConfirmationHandler, CrashReporter, CycleOutcome, LifecycleState, ReporterError,
    ALWAYS_SEND_KEY,
};
use crashline_settings::KeyedStore;

use crate::common::{self, files_on_disk, write_crash};

fn counting_handler(calls: &Arc<AtomicUsize>, wants_prompt: bool) -> ConfirmationHandler {
    let calls = calls.clone();
    Arc::new(move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        wants_prompt
    })
}

#[tokio::test]
async fn handler_receives_whole_batch() {
    let h = common::harness();
    write_crash(&h.root, "0001", b"one");
    write_crash(&h.root, "0002", b"two");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    h.reporter.set_confirmation_handler(Arc::new(move |batch| {
        sink.lock()
            .unwrap()
            .extend(batch.iter().map(|r| r.reason.clone()));
        true
    }));
    h.reporter.enable();

    assert_eq!(h.reporter.process_pending(), CycleOutcome::AwaitingConfirmation(2));
    assert_eq!(*seen.lock().unwrap(), vec!["one", "two"]);
    assert_eq!(h.reporter.state(), LifecycleState::AwaitingConfirmation);
    assert_eq!(h.reporter.pending_reports().len(), 2);
    assert!(h.channel.sent().is_empty());
}

#[tokio::test]
async fn handler_without_objection_sends_now() {
    let h = common::harness();
    write_crash(&h.root, "0001", b"one");
    let calls = Arc::new(AtomicUsize::new(0));
    h.reporter.set_confirmation_handler(counting_handler(&calls, false));
    h.reporter.enable();

    assert_eq!(h.reporter.process_pending(), CycleOutcome::Delivered(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn send_decision_delivers_batch() {
    let h = common::harness();
    write_crash(&h.root, "0001", b"one");
    h.reporter.set_confirmation_handler(Arc::new(|_| true));
    h.reporter.enable();
    h.reporter.process_pending();

    let outcome = h
        .reporter
        .notify_user_confirmation(UserConfirmation::Send)
        .unwrap();

    assert_eq!(outcome, CycleOutcome::Delivered(1));
    assert_eq!(h.channel.reasons(), vec!["one"]);
    assert!(files_on_disk(&h.root).is_empty());
    assert_eq!(h.reporter.state(), LifecycleState::Idle);
    assert!(h.settings.get(ALWAYS_SEND_KEY).is_none());
}

#[tokio::test]
async fn dont_send_discards_batch_for_good() {
    let h = common::harness();
    write_crash(&h.root, "0001", b"one");
    write_crash(&h.root, "0002", b"two");
    h.reporter.set_confirmation_handler(Arc::new(|_| true));
    h.reporter.enable();
    h.reporter.process_pending();

    let outcome = h
        .reporter
        .notify_user_confirmation(UserConfirmation::DontSend)
        .unwrap();

    assert_eq!(outcome, CycleOutcome::Discarded(2));
    assert!(h.channel.sent().is_empty());
    assert!(files_on_disk(&h.root).is_empty());
    assert_eq!(h.reporter.process_pending(), CycleOutcome::Empty);
}

#[tokio::test]
async fn always_skips_confirmation_from_then_on() {
    let h = common::harness();
    let calls = Arc::new(AtomicUsize::new(0));
    h.reporter.set_confirmation_handler(counting_handler(&calls, true));
    write_crash(&h.root, "0001", b"first");
    h.reporter.enable();
    h.reporter.process_pending();

    h.reporter
        .notify_user_confirmation(UserConfirmation::Always)
        .unwrap();
    assert_eq!(h.settings.get_as::<bool>(ALWAYS_SEND_KEY), Some(true));

    write_crash(&h.root, "0002", b"second");
    write_crash(&h.root, "0003", b"third");
    assert_eq!(h.reporter.process_pending(), CycleOutcome::Delivered(2));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.channel.reasons(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn stored_flag_bypasses_handler() {
    let h = common::harness();
    assert!(h.settings.update_object(true, ALWAYS_SEND_KEY, None));
    let calls = Arc::new(AtomicUsize::new(0));
    h.reporter.set_confirmation_handler(counting_handler(&calls, true));
    write_crash(&h.root, "0001", b"crash");
    h.reporter.enable();

    assert_eq!(h.reporter.process_pending(), CycleOutcome::Delivered(1));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn legacy_flag_is_migrated_on_enable() {
    let h = common::harness();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    // Older releases stored the flag without the namespace prefix.
    std::fs::write(&path, r#"{"CrashlineAlwaysSend": {"value": true}}"#).unwrap();
    let settings = Arc::new(KeyedStore::open(&path, "crashline").unwrap());

    let reporter = CrashReporter::builder(
        ReporterConfig {
            storage_root: h.root.clone(),
            debounce_ms: 60_000,
            ..Default::default()
        },
        h.capture.clone(),
        Arc::new(common::TextFormatter),
        h.channel.clone(),
    )
    .handler_registry(h.capture.clone())
    .settings(settings.clone())
    .debugger_probe(|| false)
    .build()
    .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    reporter.set_confirmation_handler(counting_handler(&calls, true));
    write_crash(&h.root, "0001", b"crash");

    reporter.enable();

    assert_eq!(settings.get_as::<bool>(ALWAYS_SEND_KEY), Some(true));
    assert_eq!(reporter.process_pending(), CycleOutcome::Delivered(1));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn trigger_while_awaiting_confirmation_keeps_batch() {
    let h = common::harness();
    write_crash(&h.root, "0001", b"one");
    h.reporter.set_confirmation_handler(Arc::new(|_| true));
    h.reporter.enable();
    assert_eq!(h.reporter.process_pending(), CycleOutcome::AwaitingConfirmation(1));

    h.reporter.trigger_processing();

    assert_eq!(h.reporter.state(), LifecycleState::AwaitingConfirmation);
    assert_eq!(h.reporter.pending_reports().len(), 1);
    assert_eq!(
        h.reporter
            .notify_user_confirmation(UserConfirmation::Send)
            .unwrap(),
        CycleOutcome::Delivered(1)
    );

    // The guard was released with the decision.
    write_crash(&h.root, "0002", b"two");
    assert_eq!(
        h.reporter.process_pending(),
        CycleOutcome::AwaitingConfirmation(1)
    );
}

#[tokio::test]
async fn decision_without_pending_batch_is_rejected() {
    let h = common::harness();
    h.reporter.enable();

    let err = h
        .reporter
        .notify_user_confirmation(UserConfirmation::Send)
        .unwrap_err();
    assert!(matches!(err, ReporterError::Domain(_)));
}

#[tokio::test]
async fn observer_sees_decision_and_batch() {
    let h = common::harness();
    write_crash(&h.root, "0001", b"crash");
    let decisions = Arc::new(Mutex::new(Vec::new()));
    let sink = decisions.clone();
    h.reporter.set_decision_observer(Arc::new(move |decision, batch| {
        sink.lock().unwrap().push((decision, batch.len()));
    }));
    h.reporter.set_confirmation_handler(Arc::new(|_| true));
    h.reporter.enable();
    h.reporter.process_pending();

    h.reporter
        .notify_user_confirmation(UserConfirmation::DontSend)
        .unwrap();

    assert_eq!(
        *decisions.lock().unwrap(),
        vec![(UserConfirmation::DontSend, 1)]
    );
}

#[tokio::test]
async fn handler_may_answer_synchronously() {
    let h = common::harness();
    write_crash(&h.root, "0001", b"crash");
    let reporter: Arc<Mutex<Option<CrashReporter>>> = Arc::new(Mutex::new(None));
    let slot = reporter.clone();
    h.reporter.set_confirmation_handler(Arc::new(move |_| {
        if let Some(r) = slot.lock().unwrap().as_ref() {
            r.notify_user_confirmation(UserConfirmation::Send).unwrap();
        }
        true
    }));
    *reporter.lock().unwrap() = Some(h.reporter.clone());
    h.reporter.enable();

    assert_eq!(h.reporter.process_pending(), CycleOutcome::Delivered(1));
    assert_eq!(h.reporter.state(), LifecycleState::Idle);
    assert_eq!(h.reporter.process_pending(), CycleOutcome::Empty);
}
