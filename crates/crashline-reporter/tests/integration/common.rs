//! Shared fakes and setup for the reporter integration tests
//!
//! Every collaborator of `CrashReporter` has a scriptable fake here:
//! the capture backend (which also plays the handler registry), a UTF-8
//! formatter (plus one that can be held mid-format), an outbound channel
//! that records what it was handed, a foreground switch and a delegate
//! that logs every callback.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crashline_core::config::ReporterConfig;
use crashline_core::domain::{DeliveryPriority, ErrorAttachment, StructuredLog, UserReport};
use crashline_core::ports::{
    AppStateProvider, CaptureBackend, CrashFormatter, CrashReporterDelegate, HandlerId,
    HandlerRegistry, OutboundChannel, SignalCallback,
};
use crashline_reporter::CrashReporter;
use crashline_settings::KeyedStore;
use tempfile::TempDir;

// ============================================================================
// Capture backend
// ============================================================================

#[derive(Default)]
pub struct FakeCapture {
    pending: Mutex<Option<Vec<u8>>>,
    pub installs: AtomicU32,
    pub purges: AtomicU32,
    current_handler: AtomicU64,
    armed: AtomicBool,
}

impl FakeCapture {
    pub fn set_pending(&self, bytes: &[u8]) {
        *self.pending.lock().unwrap() = Some(bytes.to_vec());
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

impl CaptureBackend for FakeCapture {
    fn has_pending_dump(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }

    fn load_pending_dump(&self) -> anyhow::Result<Vec<u8>> {
        self.pending
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no pending dump"))
    }

    fn purge_pending_dump(&self) -> anyhow::Result<()> {
        *self.pending.lock().unwrap() = None;
        self.purges.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn install_handlers(&self, _callback: SignalCallback) -> anyhow::Result<()> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        self.current_handler.fetch_add(1, Ordering::SeqCst);
        self.armed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_armed(&self, armed: bool) {
        self.armed.store(armed, Ordering::SeqCst);
    }
}

impl HandlerRegistry for FakeCapture {
    fn current_handler(&self) -> Option<HandlerId> {
        match self.current_handler.load(Ordering::SeqCst) {
            0 => None,
            id => Some(HandlerId(id)),
        }
    }

    fn register_forwarding_handler(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Formatter
// ============================================================================

/// Treats a dump as UTF-8 text; the text becomes the crash reason.
/// Dumps starting with `garbage` fail to format.
pub struct TextFormatter;

impl CrashFormatter for TextFormatter {
    fn format(&self, bytes: &[u8]) -> anyhow::Result<StructuredLog> {
        let text = std::str::from_utf8(bytes)?;
        if text.starts_with("garbage") {
            anyhow::bail!("unrecognized dump");
        }
        Ok(StructuredLog::new(text))
    }
}

/// [`TextFormatter`] that stops on dumps starting with `slow` until released
pub struct GatedFormatter {
    entered_tx: Mutex<Sender<()>>,
    entered_rx: Mutex<Receiver<()>>,
    release_tx: Mutex<Sender<()>>,
    release_rx: Mutex<Receiver<()>>,
}

impl GatedFormatter {
    pub fn new() -> Self {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        Self {
            entered_tx: Mutex::new(entered_tx),
            entered_rx: Mutex::new(entered_rx),
            release_tx: Mutex::new(release_tx),
            release_rx: Mutex::new(release_rx),
        }
    }

    /// Blocks until a `slow` dump is being formatted
    pub fn wait_entered(&self) {
        self.entered_rx
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(5))
            .expect("formatter never reached the gate");
    }

    pub fn release(&self) {
        self.release_tx.lock().unwrap().send(()).unwrap();
    }
}

impl CrashFormatter for GatedFormatter {
    fn format(&self, bytes: &[u8]) -> anyhow::Result<StructuredLog> {
        if bytes.starts_with(b"slow") {
            self.entered_tx.lock().unwrap().send(())?;
            self.release_rx
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5))?;
        }
        TextFormatter.format(bytes)
    }
}

// ============================================================================
// Outbound channel
// ============================================================================

#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(StructuredLog, DeliveryPriority)>>,
}

impl RecordingChannel {
    pub fn sent(&self) -> Vec<StructuredLog> {
        self.sent.lock().unwrap().iter().map(|(l, _)| l.clone()).collect()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.sent().into_iter().map(|l| l.reason).collect()
    }

    pub fn priorities(&self) -> Vec<DeliveryPriority> {
        self.sent.lock().unwrap().iter().map(|(_, p)| *p).collect()
    }
}

impl OutboundChannel for RecordingChannel {
    fn enqueue_for_delivery(&self, log: StructuredLog, priority: DeliveryPriority) {
        self.sent.lock().unwrap().push((log, priority));
    }
}

// ============================================================================
// Host
// ============================================================================

pub struct ForegroundSwitch(pub AtomicBool);

impl ForegroundSwitch {
    pub fn set(&self, foreground: bool) {
        self.0.store(foreground, Ordering::SeqCst);
    }
}

impl AppStateProvider for ForegroundSwitch {
    fn is_foreground(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Delegate that logs every callback as `event:reason`
#[derive(Default)]
pub struct RecordingDelegate {
    veto: Option<String>,
    attachments: Vec<ErrorAttachment>,
    events: Mutex<Vec<String>>,
}

impl RecordingDelegate {
    /// Rejects reports whose reason is `reason`
    pub fn vetoing(reason: &str) -> Self {
        Self {
            veto: Some(reason.to_string()),
            ..Default::default()
        }
    }

    /// Offers `attachments` for every report
    pub fn with_attachments(attachments: Vec<ErrorAttachment>) -> Self {
        Self {
            attachments,
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: &str, report: &UserReport) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{event}:{}", report.reason));
    }
}

impl CrashReporterDelegate for RecordingDelegate {
    fn should_process(&self, report: &UserReport) -> bool {
        self.veto.as_deref() != Some(report.reason.as_str())
    }

    fn attachments(&self, _report: &UserReport) -> Vec<ErrorAttachment> {
        self.attachments.clone()
    }

    fn will_send(&self, report: &UserReport) {
        self.push("will_send", report);
    }

    fn did_succeed(&self, report: &UserReport) {
        self.push("did_succeed", report);
    }

    fn did_fail(&self, report: &UserReport, error: &str) {
        self.push(&format!("did_fail({error})"), report);
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    _dir: TempDir,
    pub root: PathBuf,
    pub capture: Arc<FakeCapture>,
    pub channel: Arc<RecordingChannel>,
    pub app: Arc<ForegroundSwitch>,
    pub settings: Arc<KeyedStore>,
    pub reporter: CrashReporter,
}

/// Reporter over a fresh temporary crash root. Must run inside a Tokio runtime.
pub fn harness() -> Harness {
    harness_with(|_| {})
}

pub fn harness_with(configure: impl FnOnce(&mut ReporterConfig)) -> Harness {
    build_harness(configure, Arc::new(TextFormatter))
}

pub fn harness_with_formatter(formatter: Arc<dyn CrashFormatter>) -> Harness {
    build_harness(|_| {}, formatter)
}

fn build_harness(
    configure: impl FnOnce(&mut ReporterConfig),
    formatter: Arc<dyn CrashFormatter>,
) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("crashes");
    std::fs::create_dir_all(&root).expect("create crash root");

    let mut config = ReporterConfig {
        storage_root: root.clone(),
        // Long enough that the timer never fires during synchronous tests.
        debounce_ms: 60_000,
        ..ReporterConfig::default()
    };
    configure(&mut config);

    let capture = Arc::new(FakeCapture::default());
    let channel = Arc::new(RecordingChannel::default());
    let app = Arc::new(ForegroundSwitch(AtomicBool::new(true)));
    let settings = Arc::new(KeyedStore::in_memory("crashline"));

    let reporter = CrashReporter::builder(config, capture.clone(), formatter, channel.clone())
    .handler_registry(capture.clone())
    .settings(settings.clone())
    .app_state(app.clone())
    .debugger_probe(|| false)
    .build()
    .expect("build reporter");

    Harness {
        _dir: dir,
        root,
        capture,
        channel,
        app,
        settings,
        reporter,
    }
}

/// Writes a dump file directly into the crash root
pub fn write_crash(root: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = root.join(name);
    std::fs::write(&path, contents).expect("write crash file");
    path
}

/// Names of the files left in the crash root
pub fn files_on_disk(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root)
        .expect("read crash root")
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
