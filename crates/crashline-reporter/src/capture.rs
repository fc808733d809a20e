//! Capture configurator
//!
//! Activates the capture backend once per process and verifies that its
//! handler actually took over the process-wide exception handler chain.
//! Nothing here is ever uninstalled: a disabled reporter leaves the hook in
//! place but dormant (see [`ContextSlot::disarm`](crate::context_slot::ContextSlot::disarm)).

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crashline_core::ports::{CaptureBackend, HandlerId, HandlerRegistry};

use crate::context_slot::{record_crash_context, CRASH_CONTEXT};
use crate::error::ReporterError;

/// Outcome of the last activation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
    /// `activate` has not run yet
    #[default]
    NotConfigured,
    /// Handlers installed and verified
    Active,
    /// A debugger was attached; nothing was installed
    SkippedDebugger,
    /// Installation failed; pending dumps from earlier runs are still processed
    DetectOnly,
}

impl std::fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CaptureStatus::NotConfigured => "not_configured",
            CaptureStatus::Active => "active",
            CaptureStatus::SkippedDebugger => "skipped_debugger",
            CaptureStatus::DetectOnly => "detect_only",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Default)]
struct ConfiguratorState {
    configured: bool,
    our_handler: Option<HandlerId>,
    status: CaptureStatus,
}

/// Installs the capture handlers exactly once
pub struct CaptureConfigurator {
    capture: Arc<dyn CaptureBackend>,
    handlers: Arc<dyn HandlerRegistry>,
    debugger_probe: fn() -> bool,
    state: Mutex<ConfiguratorState>,
}

impl CaptureConfigurator {
    pub fn new(capture: Arc<dyn CaptureBackend>, handlers: Arc<dyn HandlerRegistry>) -> Self {
        Self {
            capture,
            handlers,
            debugger_probe: is_debugger_attached,
            state: Mutex::new(ConfiguratorState::default()),
        }
    }

    /// Replaces the debugger check, mostly for tests
    pub fn with_debugger_probe(mut self, probe: fn() -> bool) -> Self {
        self.debugger_probe = probe;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ConfiguratorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Installs and verifies the capture handlers.
    ///
    /// Repeat calls after a completed activation are a no-op that returns
    /// the recorded status. Configuration failures are logged and
    /// reported as [`CaptureStatus::DetectOnly`], never as an error.
    pub fn activate(&self) -> CaptureStatus {
        let mut state = self.lock();
        if state.configured {
            debug!(status = %state.status, "Capture already configured");
            self.capture.set_armed(true);
            CRASH_CONTEXT.arm();
            return state.status;
        }

        if (self.debugger_probe)() {
            warn!("Debugger attached, crash capture not installed");
            state.status = CaptureStatus::SkippedDebugger;
            return state.status;
        }

        let before = self.handlers.current_handler();
        let installed = self
            .capture
            .install_handlers(record_crash_context)
            .map_err(ReporterError::from);
        let after = self.handlers.current_handler();

        state.configured = true;
        state.status = match (installed, after) {
            (Ok(()), Some(handler)) if after != before => {
                info!(handler = handler.0, "Crash capture handlers installed");
                state.our_handler = Some(handler);
                CaptureStatus::Active
            }
            (Ok(()), _) => {
                let err = ReporterError::Configuration(
                    "top-level handler unchanged after install".to_string(),
                );
                error!(error = %err, "Crash capture degraded to detect-only");
                CaptureStatus::DetectOnly
            }
            (Err(e), _) => {
                error!(error = %e, "Crash capture degraded to detect-only");
                CaptureStatus::DetectOnly
            }
        };

        if let Err(e) = self.handlers.register_forwarding_handler() {
            warn!(error = %e, "Failed to register forwarding handler");
        }

        CRASH_CONTEXT.arm();
        state.status
    }

    pub fn status(&self) -> CaptureStatus {
        self.lock().status
    }

    /// Handler recorded as crashline's own at activation
    pub fn our_handler(&self) -> Option<HandlerId> {
        self.lock().our_handler
    }

    /// Returns true if another component replaced crashline's handler
    pub fn has_conflicting_handler(&self) -> bool {
        match self.our_handler() {
            Some(ours) => self.handlers.current_handler() != Some(ours),
            None => false,
        }
    }
}

impl std::fmt::Debug for CaptureConfigurator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureConfigurator")
            .field("state", &*self.lock())
            .finish_non_exhaustive()
    }
}

/// Returns true if a tracer is attached to this process
pub fn is_debugger_attached() -> bool {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| {
            status
                .lines()
                .find_map(|line| line.strip_prefix("TracerPid:"))
                .map(|pid| pid.trim() != "0")
        })
        .unwrap_or(false)
}
