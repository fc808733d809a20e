//! Panic-hook capture backend
//!
//! A pure-Rust [`CaptureBackend`] for hosts that have no native crash
//! capture library. A chained panic hook records the crashing context in
//! the pre-reserved slot and writes a JSON [`PanicDump`] to
//! `<root>/pending.data`; on the next launch the reporter extracts it into
//! the crash queue.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crashline_core::ports::{CaptureBackend, CrashContext, HandlerId, HandlerRegistry, SignalCallback};

use crate::os_info::OsInfo;

/// File the panic hook writes; reserved, so never picked up by the queue scan
pub const PENDING_DUMP_FILE_NAME: &str = "pending.data";

/// Generation of the most recently installed crashline panic hook, 0 if none
static HOOK_GENERATION: AtomicU64 = AtomicU64::new(0);

/// Whether crashline's hook chains to the hook it replaced
static FORWARD_TO_PREVIOUS: AtomicBool = AtomicBool::new(false);

/// Dump written by the panic hook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanicDump {
    pub id: Uuid,
    pub crashed_at: DateTime<Utc>,
    pub version: String,
    pub message: String,
    pub location: String,
    pub backtrace: String,
    pub thread: Option<String>,
    pub process_id: u32,
    pub os_info: OsInfo,
}

impl PanicDump {
    /// Create a dump for a panic on the current thread.
    pub fn new(version: &str, message: &str, location: &str, backtrace: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            crashed_at: Utc::now(),
            version: version.to_string(),
            message: message.to_string(),
            location: location.to_string(),
            backtrace: backtrace.to_string(),
            thread: std::thread::current().name().map(String::from),
            process_id: std::process::id(),
            os_info: OsInfo::collect(),
        }
    }
}

/// Save a dump atomically to `path`, creating the parent directory if needed.
pub fn save_dump(path: &Path, dump: &PanicDump) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let json = serde_json::to_vec_pretty(dump)?;
    let tmp_path = path.with_extension("data.tmp");
    std::fs::write(&tmp_path, json).with_context(|| format!("writing {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path).with_context(|| format!("renaming to {}", path.display()))?;
    Ok(())
}

/// Capture backend built on the process panic hook
#[derive(Debug, Clone)]
pub struct PanicCapture {
    root: PathBuf,
    app_version: String,
    armed: Arc<AtomicBool>,
}

impl PanicCapture {
    pub fn new(root: impl Into<PathBuf>, app_version: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            app_version: app_version.into(),
            armed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pending_path(&self) -> PathBuf {
        self.root.join(PENDING_DUMP_FILE_NAME)
    }
}

impl CaptureBackend for PanicCapture {
    fn has_pending_dump(&self) -> bool {
        std::fs::metadata(self.pending_path())
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    fn load_pending_dump(&self) -> anyhow::Result<Vec<u8>> {
        let path = self.pending_path();
        std::fs::read(&path).with_context(|| format!("reading {}", path.display()))
    }

    fn purge_pending_dump(&self) -> anyhow::Result<()> {
        let path = self.pending_path();
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }

    /// Installs a panic hook chained in front of the current one.
    ///
    /// The hook stays installed for the life of the process; while the
    /// capture is disarmed it only forwards.
    fn install_handlers(&self, callback: SignalCallback) -> anyhow::Result<()> {
        let pending_path = self.pending_path();
        let version = self.app_version.clone();
        let armed = self.armed.clone();
        let previous_hook = std::panic::take_hook();

        std::panic::set_hook(Box::new(move |panic_info| {
            if armed.load(Ordering::Acquire) {
                callback(&CrashContext {
                    signal: 0,
                    fault_address: 0,
                    process_id: std::process::id(),
                    timestamp_ms: SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_millis() as u64)
                        .unwrap_or_default(),
                });

                let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };

                let location = panic_info
                    .location()
                    .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                    .unwrap_or_default();

                let backtrace = std::backtrace::Backtrace::force_capture().to_string();
                let dump = PanicDump::new(&version, &message, &location, &backtrace);

                if let Err(e) = save_dump(&pending_path, &dump) {
                    eprintln!("Failed to save crash dump: {e}");
                }
            }

            if FORWARD_TO_PREVIOUS.load(Ordering::Acquire) {
                previous_hook(panic_info);
            }
        }));

        self.armed.store(true, Ordering::Release);
        HOOK_GENERATION.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn set_armed(&self, armed: bool) {
        self.armed.store(armed, Ordering::Release);
    }
}

/// [`HandlerRegistry`] over the process panic hook
///
/// The panic hook has no observable identity, so each crashline
/// installation is identified by a generation number.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicHookRegistry;

impl HandlerRegistry for PanicHookRegistry {
    fn current_handler(&self) -> Option<HandlerId> {
        match HOOK_GENERATION.load(Ordering::Acquire) {
            0 => None,
            generation => Some(HandlerId(generation)),
        }
    }

    /// Makes crashline's hook chain to the hook it replaced
    fn register_forwarding_handler(&self) -> anyhow::Result<()> {
        FORWARD_TO_PREVIOUS.store(true, Ordering::Release);
        Ok(())
    }
}
