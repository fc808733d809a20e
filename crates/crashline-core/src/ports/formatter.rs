//! Formatter port (driven/secondary port)
//!
//! Turns the opaque bytes of a dump into a [`StructuredLog`] and projects
//! that log into the [`UserReport`] shown to the application.
//! Symbolication, if any, happens behind this trait.

use crate::domain::record::{StructuredLog, UserReport};

/// Port trait for dump conversion
pub trait CrashFormatter: Send + Sync {
    /// Converts raw dump bytes into a structured log
    ///
    /// A failure means the dump is unparsable; the record is dropped and
    /// never retried.
    fn format(&self, bytes: &[u8]) -> anyhow::Result<StructuredLog>;

    /// Projects a structured log into its user-facing report
    fn to_user_report(&self, log: &StructuredLog) -> UserReport {
        UserReport::from(log)
    }
}
