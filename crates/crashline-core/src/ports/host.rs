//! Host application ports
//!
//! Hooks the owning application provides: its foreground state and an
//! optional delegate. Every delegate method has a no-op default so an
//! application only implements what it needs.

use crate::domain::record::{ErrorAttachment, UserReport};

/// Reports whether the host application is in the foreground
pub trait AppStateProvider: Send + Sync {
    fn is_foreground(&self) -> bool;
}

/// State provider for headless hosts (daemons, CLIs) that are always "foreground"
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysForeground;

impl AppStateProvider for AlwaysForeground {
    fn is_foreground(&self) -> bool {
        true
    }
}

/// Optional application callbacks around crash processing and delivery
///
/// ## Threading
///
/// Methods are invoked from the background processing worker and from
/// the outbound channel's callback thread; implementations must be
/// thread-safe.
pub trait CrashReporterDelegate: Send + Sync {
    /// Returns false to veto a report; it is deleted like an unreadable dump
    fn should_process(&self, _report: &UserReport) -> bool {
        true
    }

    /// Attachments to send along with the report
    fn attachments(&self, _report: &UserReport) -> Vec<ErrorAttachment> {
        Vec::new()
    }

    /// Called when the channel is about to send the report
    fn will_send(&self, _report: &UserReport) {}

    /// Called when the report was delivered
    fn did_succeed(&self, _report: &UserReport) {}

    /// Called when the channel gave up on the report
    fn did_fail(&self, _report: &UserReport, _error: &str) {}
}

/// Delegate that accepts every report and ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDelegate;

impl CrashReporterDelegate for NoopDelegate {}
