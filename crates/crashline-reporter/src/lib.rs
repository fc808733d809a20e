//! crashline Reporter - Crash report lifecycle manager
//!
//! Provides:
//! - `CrashReporter`: detection hand-off, debounced processing, consent and delivery
//! - `CrashFileQueue`: filesystem-backed queue of undelivered dumps plus the analyzer marker
//! - `CaptureConfigurator`: one-time, verified installation of the capture handlers
//! - `PanicCapture` / `JsonDumpFormatter`: panic-hook capture backend and its formatter
//! - `Anonymizer`: PII stripping for structured logs
//! - `MetricsRegistry`: Prometheus counters for crash records and processing passes

pub mod anonymizer;
pub mod capture;
pub mod confirmation;
pub mod context_slot;
pub mod debounce;
pub mod error;
pub mod formatter;
pub mod lifecycle;
pub mod metrics;
pub mod os_info;
pub mod panic_capture;
pub mod queue;

pub use anonymizer::Anonymizer;
pub use capture::{CaptureConfigurator, CaptureStatus};
pub use confirmation::{ConfirmationHandler, DecisionObserver, ALWAYS_SEND_KEY};
pub use error::ReporterError;
pub use formatter::JsonDumpFormatter;
pub use lifecycle::{
    CrashReporter, CrashReporterBuilder, CycleOutcome, LifecycleState, IN_FLIGHT_LIMIT,
};
pub use metrics::MetricsRegistry;
pub use os_info::OsInfo;
pub use panic_capture::{PanicCapture, PanicDump, PanicHookRegistry};
pub use queue::CrashFileQueue;
