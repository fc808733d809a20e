//! Error types for the crash reporter

use std::path::PathBuf;

use thiserror::Error;

use crashline_core::domain::DomainError;

/// Errors that can occur while configuring capture or processing crash files
///
/// None of these are fatal to the host: the reporter logs them and either
/// degrades (configuration) or treats the affected record as unavailable.
#[derive(Debug, Error)]
pub enum ReporterError {
    /// Capture handlers could not be installed; the reporter runs detect-only
    #[error("capture configuration failed: {0}")]
    Configuration(String),

    /// A crash file or the marker could not be read, written or deleted
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A dump could not be converted into a structured log
    #[error("unparsable crash dump {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    /// The debounce timer needs a Tokio runtime
    #[error("no Tokio runtime available to schedule crash processing")]
    NoRuntime,

    /// An operation was attempted in a lifecycle state that does not allow it
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The capture backend failed
    #[error("capture backend error: {0}")]
    Capture(#[from] anyhow::Error),
}

impl ReporterError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReporterError::Io {
            path: path.into(),
            source,
        }
    }
}
