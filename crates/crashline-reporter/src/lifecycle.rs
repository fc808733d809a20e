//! Crash report lifecycle
//!
//! [`CrashReporter`] drives one crash from discovery to hand-off:
//!
//! ```text
//! Idle ─enable─→ DetectingPending ─→ Queuing ─→ Debouncing ─→ AwaitingForeground
//!   ↑                                  │ (empty)                  │ (background: abort)
//!   │←─────────────────────────────────┘                          ↓
//!   │                                                         Formatting
//!   │                                                             │
//!   │←── don't send ── AwaitingConfirmation ←─────────────────────┘
//!   │                         │ send / always
//!   └──────────────────── Delivering
//! ```
//!
//! ## Threading
//!
//! Processing runs on the Tokio blocking pool after the debounce delay,
//! one pass at a time. A trigger arriving while a pass is active is
//! dropped: the next pass rescans the crash root and picks up whatever
//! is left. A batch waiting for the user's answer keeps the pass active
//! until [`CrashReporter::notify_user_confirmation`] resolves it.
//!
//! Each pass owns the processing guard under its own id and only ever
//! releases that id. Disabling starts a new epoch; a pass from an older
//! epoch stops at its next check and never parks or hands off a batch.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crashline_core::config::{Distribution, ReporterConfig};
use crashline_core::domain::{CrashRecord, DomainError, StructuredLog, UserConfirmation, UserReport};
use crashline_core::ports::{
    AlwaysForeground, AppStateProvider, CaptureBackend, CrashContext, CrashFormatter,
    CrashReporterDelegate, DeliveryListener, DeliveryOutcome, HandlerRegistry, NoopDelegate,
    OutboundChannel,
};
use crashline_settings::KeyedStore;

use crate::capture::{CaptureConfigurator, CaptureStatus};
use crate::confirmation::{
    self, ConfirmationHandler, ConfirmationRoute, DecisionObserver, KEY_MIGRATIONS,
};
use crate::context_slot::CRASH_CONTEXT;
use crate::debounce::DebounceTimer;
use crate::error::ReporterError;
use crate::metrics::{cycle, outcome, MetricsRegistry};
use crate::panic_capture::PanicHookRegistry;
use crate::queue::CrashFileQueue;

/// Name under which store migrations are logged
const SERVICE_NAME: &str = "crashline";

/// Delivered reports kept for channel outcomes that have not arrived yet
pub const IN_FLIGHT_LIMIT: usize = 256;

/// Guard value while no pass is active
const NO_PASS: u64 = 0;

// ============================================================================
// States and outcomes
// ============================================================================

/// Where the reporter is in the crash lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Idle,
    DetectingPending,
    Queuing,
    Debouncing,
    AwaitingForeground,
    Formatting,
    AwaitingConfirmation,
    Delivering,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Idle => "Idle",
            LifecycleState::DetectingPending => "DetectingPending",
            LifecycleState::Queuing => "Queuing",
            LifecycleState::Debouncing => "Debouncing",
            LifecycleState::AwaitingForeground => "AwaitingForeground",
            LifecycleState::Formatting => "Formatting",
            LifecycleState::AwaitingConfirmation => "AwaitingConfirmation",
            LifecycleState::Delivering => "Delivering",
        };
        write!(f, "{s}")
    }
}

/// How a processing pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The batch was handed to the outbound channel
    Delivered(usize),
    /// The user declined; the batch was deleted
    Discarded(usize),
    /// The batch waits for `notify_user_confirmation`
    AwaitingConfirmation(usize),
    /// The application was in the background
    AbortedBackground,
    /// Another pass was active
    SkippedBusy,
    /// Nothing survived formatting
    Empty,
    /// The reporter is disabled
    Disabled,
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`CrashReporter`]
///
/// Capture backend, formatter and outbound channel are required; the
/// rest falls back to process-wide defaults.
pub struct CrashReporterBuilder {
    config: ReporterConfig,
    capture: Arc<dyn CaptureBackend>,
    formatter: Arc<dyn CrashFormatter>,
    channel: Arc<dyn OutboundChannel>,
    handlers: Option<Arc<dyn HandlerRegistry>>,
    settings: Option<Arc<KeyedStore>>,
    app_state: Option<Arc<dyn AppStateProvider>>,
    runtime: Option<Handle>,
    debugger_probe: Option<fn() -> bool>,
}

impl CrashReporterBuilder {
    /// Handler chain used to verify installation; defaults to the panic hook
    pub fn handler_registry(mut self, handlers: Arc<dyn HandlerRegistry>) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Store for the consent flag; defaults to [`crashline_settings::shared`]
    pub fn settings(mut self, settings: Arc<KeyedStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Foreground state source; defaults to [`AlwaysForeground`]
    pub fn app_state(mut self, app_state: Arc<dyn AppStateProvider>) -> Self {
        self.app_state = Some(app_state);
        self
    }

    /// Runtime for the debounce timer; defaults to the current one
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn debugger_probe(mut self, probe: fn() -> bool) -> Self {
        self.debugger_probe = Some(probe);
        self
    }

    /// Builds the reporter. Nothing is installed until [`CrashReporter::enable`].
    pub fn build(self) -> Result<CrashReporter, ReporterError> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| ReporterError::NoRuntime)?,
        };
        let metrics =
            MetricsRegistry::new().map_err(|e| ReporterError::Configuration(e.to_string()))?;

        let handlers = self
            .handlers
            .unwrap_or_else(|| Arc::new(PanicHookRegistry));
        let mut configurator = CaptureConfigurator::new(self.capture.clone(), handlers);
        if let Some(probe) = self.debugger_probe {
            configurator = configurator.with_debugger_probe(probe);
        }

        let storage_root = self.config.resolved_storage_root();
        let timer = DebounceTimer::new(Duration::from_millis(self.config.debounce_ms), runtime);

        Ok(CrashReporter {
            inner: Arc::new(Inner {
                queue: Mutex::new(CrashFileQueue::new(&storage_root)),
                storage_root,
                config: self.config,
                capture: self.capture,
                formatter: self.formatter,
                channel: self.channel,
                settings: self.settings.unwrap_or_else(crashline_settings::shared),
                app_state: self.app_state.unwrap_or_else(|| Arc::new(AlwaysForeground)),
                configurator,
                state: Mutex::new(LifecycleState::Idle),
                enabled: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                processing: AtomicU64::new(NO_PASS),
                next_pass: AtomicU64::new(1),
                pending_batch: Mutex::new(Vec::new()),
                last_decision: Mutex::new(None),
                timer,
                hooks: RwLock::new(Hooks::default()),
                last_session: RwLock::new(None),
                crashed_last_session: AtomicBool::new(false),
                captured_context: Mutex::new(None),
                in_flight: Mutex::new(InFlight::default()),
                admin: Mutex::new(()),
                metrics,
            }),
        })
    }
}

// ============================================================================
// CrashReporter
// ============================================================================

struct Hooks {
    delegate: Arc<dyn CrashReporterDelegate>,
    confirmation_handler: Option<ConfirmationHandler>,
    decision_observer: Option<DecisionObserver>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            delegate: Arc::new(NoopDelegate),
            confirmation_handler: None,
            decision_observer: None,
        }
    }
}

struct Inner {
    config: ReporterConfig,
    storage_root: PathBuf,
    capture: Arc<dyn CaptureBackend>,
    formatter: Arc<dyn CrashFormatter>,
    channel: Arc<dyn OutboundChannel>,
    settings: Arc<KeyedStore>,
    app_state: Arc<dyn AppStateProvider>,
    configurator: CaptureConfigurator,

    queue: Mutex<CrashFileQueue>,
    state: Mutex<LifecycleState>,
    enabled: AtomicBool,
    /// Bumped by every disable
    epoch: AtomicU64,
    /// Id of the pass holding the re-entrancy guard, [`NO_PASS`] if none
    processing: AtomicU64,
    next_pass: AtomicU64,
    pending_batch: Mutex<Vec<CrashRecord>>,
    last_decision: Mutex<Option<CycleOutcome>>,
    timer: DebounceTimer,

    hooks: RwLock<Hooks>,
    last_session: RwLock<Option<UserReport>>,
    crashed_last_session: AtomicBool,
    captured_context: Mutex<Option<CrashContext>>,
    in_flight: Mutex<InFlight>,
    /// Serializes enable, disable and the test crash
    admin: Mutex<()>,
    metrics: MetricsRegistry,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Reports handed to the channel, by structured log id
///
/// Bounded by [`IN_FLIGHT_LIMIT`]; the oldest entry goes first. An
/// evicted report is rebuilt from the log if its outcome still arrives.
#[derive(Default)]
struct InFlight {
    reports: HashMap<Uuid, UserReport>,
    order: VecDeque<Uuid>,
}

impl InFlight {
    fn insert(&mut self, id: Uuid, report: UserReport) {
        if self.reports.insert(id, report).is_none() {
            self.order.push_back(id);
        }
        while self.reports.len() > IN_FLIGHT_LIMIT {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.reports.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn get(&self, id: &Uuid) -> Option<UserReport> {
        self.reports.get(id).cloned()
    }

    fn remove(&mut self, id: &Uuid) -> Option<UserReport> {
        let report = self.reports.remove(id)?;
        self.order.retain(|queued| queued != id);
        Some(report)
    }

    fn clear(&mut self) -> usize {
        self.order.clear();
        std::mem::take(&mut self.reports).len()
    }

    fn len(&self) -> usize {
        self.reports.len()
    }
}

/// Crash report lifecycle manager
///
/// Cheap to clone; clones share the same reporter.
#[derive(Clone)]
pub struct CrashReporter {
    inner: Arc<Inner>,
}

impl CrashReporter {
    pub fn builder(
        config: ReporterConfig,
        capture: Arc<dyn CaptureBackend>,
        formatter: Arc<dyn CrashFormatter>,
        channel: Arc<dyn OutboundChannel>,
    ) -> CrashReporterBuilder {
        CrashReporterBuilder {
            config,
            capture,
            formatter,
            channel,
            handlers: None,
            settings: None,
            app_state: None,
            runtime: None,
            debugger_probe: None,
        }
    }

    // ========================================================================
    // Enable / disable
    // ========================================================================

    /// Starts crash reporting.
    ///
    /// Installs capture, pulls a dump left by the previous run into the
    /// queue and schedules processing if anything is queued. Calling it
    /// again while enabled does nothing.
    #[instrument(skip(self), fields(root = %self.inner.storage_root.display()))]
    pub fn enable(&self) -> CaptureStatus {
        let inner = &self.inner;
        let _admin = lock(&inner.admin);

        if inner.enabled.swap(true, Ordering::AcqRel) {
            debug!("Crash reporting already enabled");
            return inner.configurator.status();
        }

        inner.settings.migrate_keys(KEY_MIGRATIONS, SERVICE_NAME);
        let status = inner.configurator.activate();

        self.set_state(LifecycleState::DetectingPending);
        let depth = self.detect_pending();

        self.set_state(LifecycleState::Queuing);
        info!(status = %status, queued = depth, "Crash reporting enabled");
        if depth == 0 {
            self.set_state(LifecycleState::Idle);
        } else {
            self.trigger_processing();
        }
        status
    }

    /// Queue = fresh capture ∪ leftovers, oldest first
    fn detect_pending(&self) -> usize {
        let inner = &self.inner;
        let mut queue = lock(&inner.queue);

        if queue.marker_exists() {
            info!("Previous dump extraction was interrupted, retrying");
            if let Err(e) = queue.remove_marker() {
                warn!(error = %e, "Failed to remove stale analyzer marker");
            }
        }

        match queue.enqueue_from_capture(inner.capture.as_ref(), inner.formatter.as_ref()) {
            Ok(Some(extracted)) => {
                inner.metrics.record_outcome(outcome::QUEUED);
                inner.crashed_last_session.store(true, Ordering::Release);
                *inner.last_session.write().unwrap_or_else(|e| e.into_inner()) =
                    extracted.last_session;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Could not extract pending dump"),
        }

        if let Err(e) = queue.refresh() {
            warn!(error = %e, "Could not scan crash root");
        }
        inner.metrics.set_queue_depth(queue.len());
        queue.len()
    }

    /// Stops crash reporting and deletes everything queued.
    ///
    /// Any batch waiting for confirmation is dropped. Installed capture
    /// handlers stay in place but record nothing until re-enabled.
    #[instrument(skip(self))]
    pub fn disable(&self) {
        let inner = &self.inner;
        let _admin = lock(&inner.admin);

        inner.enabled.store(false, Ordering::Release);
        inner.timer.cancel();
        inner.capture.set_armed(false);
        CRASH_CONTEXT.disarm();

        // A parked batch has no thread behind it, so its guard is released
        // here. A running pass sees the new epoch and releases its own.
        let dropped = {
            let mut state = lock(&inner.state);
            inner.epoch.fetch_add(1, Ordering::AcqRel);
            if *state == LifecycleState::AwaitingConfirmation {
                inner.processing.store(NO_PASS, Ordering::Release);
            }
            debug!(from = %*state, to = %LifecycleState::Idle, "Lifecycle transition");
            *state = LifecycleState::Idle;
            std::mem::take(&mut *lock(&inner.pending_batch)).len()
        };
        let forgotten = lock(&inner.in_flight).clear();
        let purged = {
            let mut queue = lock(&inner.queue);
            let purged = queue.purge_all();
            if let Err(e) = queue.remove_marker() {
                warn!(error = %e, "Failed to remove analyzer marker");
            }
            purged
        };
        if let Err(e) = inner.capture.purge_pending_dump() {
            warn!(error = %e, "Failed to purge pending dump");
        }

        inner.metrics.set_queue_depth(0);
        info!(purged, dropped, forgotten, "Crash reporting disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Crashes the process on purpose so the pipeline can be tried end to end.
    ///
    /// Does nothing in store builds or while disabled.
    pub fn generate_test_crash(&self) {
        let inner = &self.inner;
        let _admin = lock(&inner.admin);

        if inner.config.distribution == Distribution::Store {
            info!("Test crash ignored in store build");
            return;
        }
        if !inner.enabled.load(Ordering::Acquire) {
            warn!("Test crash ignored, crash reporting is disabled");
            return;
        }

        error!("Generating test crash");
        panic!("crashline test crash");
    }

    // ========================================================================
    // Processing
    // ========================================================================

    /// Schedules a processing pass after the debounce delay.
    ///
    /// Re-triggering restarts the delay. A trigger during an active pass,
    /// including one parked on the user's answer, is dropped.
    pub fn trigger_processing(&self) {
        let inner = &self.inner;
        if !inner.enabled.load(Ordering::Acquire) {
            debug!("Trigger ignored, crash reporting is disabled");
            return;
        }

        {
            let mut state = lock(&inner.state);
            if *state == LifecycleState::AwaitingConfirmation
                || inner.processing.load(Ordering::Acquire) != NO_PASS
            {
                debug!(state = %*state, "Processing pass active, trigger dropped");
                inner.metrics.record_cycle(cycle::SKIPPED_BUSY);
                return;
            }
            if *state != LifecycleState::Debouncing {
                debug!(from = %*state, to = %LifecycleState::Debouncing, "Lifecycle transition");
                *state = LifecycleState::Debouncing;
            }
        }

        let weak = Arc::downgrade(&self.inner);
        inner.timer.arm(move || {
            if let Some(inner) = weak.upgrade() {
                CrashReporter { inner }.process_pending();
            }
        });
    }

    /// Runs one processing pass now, on the calling thread.
    #[instrument(skip(self))]
    pub fn process_pending(&self) -> CycleOutcome {
        let inner = &self.inner;
        if !inner.enabled.load(Ordering::Acquire) {
            return CycleOutcome::Disabled;
        }
        let epoch = inner.epoch.load(Ordering::Acquire);
        let pass = inner.next_pass.fetch_add(1, Ordering::Relaxed);
        if inner
            .processing
            .compare_exchange(NO_PASS, pass, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Processing pass active, skipping");
            inner.metrics.record_cycle(cycle::SKIPPED_BUSY);
            return CycleOutcome::SkippedBusy;
        }

        let result = if self.is_current(epoch) {
            self.run_cycle(epoch)
        } else {
            CycleOutcome::Disabled
        };
        if !matches!(result, CycleOutcome::AwaitingConfirmation(_)) {
            // Fails when the pass was resolved inline and another took over.
            let _ = inner.processing.compare_exchange(
                pass,
                NO_PASS,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
        debug!(pass, outcome = ?result, "Processing pass finished");

        // Disabled and re-enabled while this pass ran: the new epoch's
        // trigger was dropped against our guard.
        if inner.epoch.load(Ordering::Acquire) != epoch && inner.enabled.load(Ordering::Acquire)
        {
            self.trigger_processing();
        }
        result
    }

    /// Moves to `next` unless the reporter was disabled since `epoch`
    fn advance(&self, epoch: u64, next: LifecycleState) -> bool {
        let mut state = lock(&self.inner.state);
        if !self.is_current(epoch) {
            return false;
        }
        if *state != next {
            debug!(from = %*state, to = %next, "Lifecycle transition");
            *state = next;
        }
        true
    }

    /// True while enabled and not disabled since `epoch` was read
    fn is_current(&self, epoch: u64) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
            && self.inner.epoch.load(Ordering::Acquire) == epoch
    }

    fn run_cycle(&self, epoch: u64) -> CycleOutcome {
        let inner = &self.inner;

        if !self.advance(epoch, LifecycleState::AwaitingForeground) {
            return CycleOutcome::Disabled;
        }
        if !inner.config.process_in_background && !inner.app_state.is_foreground() {
            info!("Application in background, crash processing aborted");
            inner.metrics.record_cycle(cycle::ABORTED_BACKGROUND);
            self.advance(epoch, LifecycleState::Idle);
            return CycleOutcome::AbortedBackground;
        }

        if let Some(ctx) = CRASH_CONTEXT.take() {
            warn!(
                signal = ctx.signal,
                pid = ctx.process_id,
                timestamp_ms = ctx.timestamp_ms,
                "Crash captured earlier in this session"
            );
            *lock(&inner.captured_context) = Some(ctx);
        }
        if inner.configurator.has_conflicting_handler() {
            warn!("Another component replaced the crash handler");
        }

        if !self.advance(epoch, LifecycleState::Formatting) {
            return CycleOutcome::Disabled;
        }
        let batch = self.format_queue(epoch);

        if !self.is_current(epoch) {
            return CycleOutcome::Disabled;
        }
        if batch.is_empty() {
            inner.metrics.record_cycle(cycle::EMPTY);
            self.advance(epoch, LifecycleState::Idle);
            return CycleOutcome::Empty;
        }

        self.confirm(batch, epoch)
    }

    /// Formats every queued file, oldest first, into the pending batch
    fn format_queue(&self, epoch: u64) -> Vec<CrashRecord> {
        let inner = &self.inner;
        let paths = {
            let mut queue = lock(&inner.queue);
            if let Err(e) = queue.refresh() {
                warn!(error = %e, "Could not scan crash root");
            }
            queue.files().to_vec()
        };

        let delegate = self.hooks().delegate.clone();
        let mut batch = Vec::with_capacity(paths.len());

        for path in paths {
            if !self.is_current(epoch) {
                break;
            }

            let bytes = match std::fs::read(&path) {
                Ok(bytes) if !bytes.is_empty() => bytes,
                Ok(_) => {
                    warn!(path = %path.display(), "Crash file is empty, dropping it");
                    self.drop_file(&path, outcome::DROPPED_UNREADABLE);
                    continue;
                }
                Err(e) => {
                    let err = ReporterError::io(&path, e);
                    warn!(error = %err, "Crash file unreadable, dropping it");
                    self.drop_file(&path, outcome::DROPPED_UNREADABLE);
                    continue;
                }
            };

            let mut record = CrashRecord::new(&path);
            record.set_raw_bytes(bytes);
            if let Err(e) = self.format_record(&mut record) {
                let err = ReporterError::Format {
                    path: path.clone(),
                    reason: format!("{e:#}"),
                };
                warn!(error = %err, "Dropping crash file");
                self.drop_file(&path, outcome::DROPPED_FORMAT);
                continue;
            }

            if let Some(report) = record.report() {
                if !delegate.should_process(report) {
                    info!(file = %record.file_name(), "Crash report vetoed by application");
                    self.drop_file(&path, outcome::VETOED);
                    continue;
                }
            }
            batch.push(record);
        }

        inner.metrics.set_queue_depth(lock(&inner.queue).len());
        batch
    }

    fn format_record(&self, record: &mut CrashRecord) -> anyhow::Result<()> {
        let started = Instant::now();
        let bytes = record
            .raw_bytes()
            .ok_or_else(|| anyhow::anyhow!("no bytes loaded"))?;
        let log = self.inner.formatter.format(bytes)?;
        let report = self.inner.formatter.to_user_report(&log);
        self.inner
            .metrics
            .observe_format_duration(started.elapsed().as_secs_f64());

        record.drop_raw_bytes();
        record.attach_derived(log, report);
        Ok(())
    }

    fn confirm(&self, batch: Vec<CrashRecord>, epoch: u64) -> CycleOutcome {
        let inner = &self.inner;
        let count = batch.len();
        let reports: Vec<UserReport> = batch.iter().filter_map(|r| r.report().cloned()).collect();

        {
            let mut state = lock(&inner.state);
            if !self.is_current(epoch) {
                return CycleOutcome::Disabled;
            }
            // Lock order: state, then pending_batch.
            *lock(&inner.last_decision) = None;
            *lock(&inner.pending_batch) = batch;
            debug!(from = %*state, to = %LifecycleState::AwaitingConfirmation, "Lifecycle transition");
            *state = LifecycleState::AwaitingConfirmation;
        }

        let always = confirmation::always_send(&inner.settings);
        let handler = self.hooks().confirmation_handler.clone();

        match confirmation::route(&reports, always, handler.as_ref()) {
            ConfirmationRoute::SendNow(reason) => {
                info!(count, reason = %reason, "Sending crash reports without asking");
                match self.resolve(UserConfirmation::Send) {
                    Ok(outcome) => outcome,
                    Err(_) => self.settled_outcome(),
                }
            }
            ConfirmationRoute::AwaitUser => {
                if self.state() == LifecycleState::AwaitingConfirmation {
                    info!(count, "Waiting for user confirmation");
                    CycleOutcome::AwaitingConfirmation(count)
                } else {
                    self.settled_outcome()
                }
            }
        }
    }

    // The handler answered from inside its own callback, or the reporter
    // was disabled meanwhile.
    fn settled_outcome(&self) -> CycleOutcome {
        lock(&self.inner.last_decision)
            .take()
            .unwrap_or(CycleOutcome::Disabled)
    }

    /// Applies the application's answer to the batch awaiting confirmation.
    ///
    /// Fails with [`DomainError::InvalidState`] when no batch is waiting.
    pub fn notify_user_confirmation(
        &self,
        decision: UserConfirmation,
    ) -> Result<CycleOutcome, ReporterError> {
        self.resolve(decision)
    }

    fn resolve(&self, decision: UserConfirmation) -> Result<CycleOutcome, ReporterError> {
        let inner = &self.inner;
        let (batch, epoch) = {
            let mut state = lock(&inner.state);
            let target = if decision.sends() {
                LifecycleState::Delivering
            } else {
                LifecycleState::Idle
            };
            if *state != LifecycleState::AwaitingConfirmation {
                return Err(DomainError::InvalidState {
                    from: state.to_string(),
                    to: target.to_string(),
                }
                .into());
            }
            *state = target;
            (
                std::mem::take(&mut *lock(&inner.pending_batch)),
                inner.epoch.load(Ordering::Acquire),
            )
        };

        info!(decision = %decision, count = batch.len(), "Crash report decision");
        let reports: Vec<UserReport> = batch.iter().filter_map(|r| r.report().cloned()).collect();
        let observer = self.hooks().decision_observer.clone();
        if let Some(observer) = observer {
            observer(decision, &reports);
        }
        if decision == UserConfirmation::Always {
            confirmation::set_always_send(&inner.settings);
        }

        let result = if decision.sends() {
            self.deliver(batch)
        } else {
            self.discard(batch)
        };

        inner.metrics.record_cycle(cycle::COMPLETED);
        inner.metrics.set_queue_depth(lock(&inner.queue).len());
        self.advance(epoch, LifecycleState::Idle);
        *lock(&inner.last_decision) = Some(result);
        inner.processing.store(NO_PASS, Ordering::Release);
        Ok(result)
    }

    fn deliver(&self, batch: Vec<CrashRecord>) -> CycleOutcome {
        let inner = &self.inner;
        let delegate = self.hooks().delegate.clone();
        let priority = inner.config.delivery_priority;
        let mut delivered = 0;

        for record in batch {
            let path = record.path().to_path_buf();
            let report = record.report().cloned();

            if let (Some(report), Some(mut log)) = (report, record.into_log()) {
                for attachment in delegate.attachments(&report) {
                    if attachment.is_valid() {
                        log.attachments.push(attachment);
                    } else {
                        warn!(attachment = %attachment.id, "Skipping empty attachment");
                    }
                }

                lock(&inner.in_flight).insert(log.id, report);
                debug!(path = %path.display(), log = %log.id, "Handing crash log to channel");
                inner.channel.enqueue_for_delivery(log, priority);
                inner.metrics.record_outcome(outcome::DELIVERED);
                delivered += 1;
            }

            // Delivery is the channel's job from here on.
            self.remove_file(&path);
        }

        info!(count = delivered, priority = %priority, "Crash reports handed off");
        CycleOutcome::Delivered(delivered)
    }

    fn discard(&self, batch: Vec<CrashRecord>) -> CycleOutcome {
        for record in &batch {
            self.drop_file(record.path(), outcome::DISCARDED);
        }
        info!(count = batch.len(), "Crash reports discarded");
        CycleOutcome::Discarded(batch.len())
    }

    fn drop_file(&self, path: &Path, reason: &str) {
        self.remove_file(path);
        self.inner.metrics.record_outcome(reason);
    }

    fn remove_file(&self, path: &Path) {
        if let Err(e) = lock(&self.inner.queue).remove(path) {
            warn!(error = %e, "Failed to delete crash file");
        }
    }

    // ========================================================================
    // Application surface
    // ========================================================================

    fn hooks(&self) -> std::sync::RwLockReadGuard<'_, Hooks> {
        self.inner.hooks.read().unwrap_or_else(|e| e.into_inner())
    }

    fn hooks_mut(&self) -> std::sync::RwLockWriteGuard<'_, Hooks> {
        self.inner.hooks.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_delegate(&self, delegate: Arc<dyn CrashReporterDelegate>) {
        self.hooks_mut().delegate = delegate;
    }

    pub fn clear_delegate(&self) {
        self.hooks_mut().delegate = Arc::new(NoopDelegate);
    }

    pub fn set_confirmation_handler(&self, handler: ConfirmationHandler) {
        self.hooks_mut().confirmation_handler = Some(handler);
    }

    pub fn clear_confirmation_handler(&self) {
        self.hooks_mut().confirmation_handler = None;
    }

    pub fn set_decision_observer(&self, observer: DecisionObserver) {
        self.hooks_mut().decision_observer = Some(observer);
    }

    /// Returns true if a crash from the previous run was picked up at enable
    pub fn has_crashed_in_last_session(&self) -> bool {
        self.inner.crashed_last_session.load(Ordering::Acquire)
    }

    /// Report for the previous run's crash, when it could be formatted
    pub fn last_session_crash_report(&self) -> Option<UserReport> {
        self.inner
            .last_session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Context recorded by the capture callback during this session
    pub fn captured_context(&self) -> Option<CrashContext> {
        *lock(&self.inner.captured_context)
    }

    /// Reports of the batch waiting for confirmation
    pub fn pending_reports(&self) -> Vec<UserReport> {
        lock(&self.inner.pending_batch)
            .iter()
            .filter_map(|r| r.report().cloned())
            .collect()
    }

    pub fn state(&self) -> LifecycleState {
        *lock(&self.inner.state)
    }

    fn set_state(&self, next: LifecycleState) {
        let mut state = lock(&self.inner.state);
        if *state != next {
            let from = *state;
            debug!(from = %from, to = %next, "Lifecycle transition");
            *state = next;
        }
    }

    pub fn capture_status(&self) -> CaptureStatus {
        self.inner.configurator.status()
    }

    /// Files currently queued, oldest first
    pub fn queued_files(&self) -> Vec<PathBuf> {
        lock(&self.inner.queue).files().to_vec()
    }

    pub fn storage_root(&self) -> &Path {
        &self.inner.storage_root
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.inner.metrics
    }

    /// Delivered reports still waiting for a channel outcome
    pub fn in_flight_len(&self) -> usize {
        lock(&self.inner.in_flight).len()
    }
}

impl std::fmt::Debug for CrashReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrashReporter")
            .field("storage_root", &self.inner.storage_root)
            .field("state", &self.state())
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

/// Forwards channel outcomes for crash logs to the delegate
impl DeliveryListener for CrashReporter {
    fn on_delivery_event(&self, log: &StructuredLog, outcome: &DeliveryOutcome) {
        if !log.is_crash() {
            return;
        }

        let report = {
            let mut in_flight = lock(&self.inner.in_flight);
            match outcome {
                DeliveryOutcome::WillSend => in_flight.get(&log.id),
                DeliveryOutcome::Succeeded | DeliveryOutcome::Failed(_) => {
                    in_flight.remove(&log.id)
                }
            }
        }
        .unwrap_or_else(|| self.inner.formatter.to_user_report(log));

        let delegate = self.hooks().delegate.clone();
        match outcome {
            DeliveryOutcome::WillSend => delegate.will_send(&report),
            DeliveryOutcome::Succeeded => {
                debug!(log = %log.id, "Crash report delivered");
                delegate.did_succeed(&report)
            }
            DeliveryOutcome::Failed(error) => {
                warn!(log = %log.id, error = %error, "Crash report delivery failed");
                delegate.did_fail(&report, error)
            }
        }
    }
}
