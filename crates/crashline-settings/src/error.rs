//! Error types for the keyed store

use thiserror::Error;

/// Errors that can occur while loading or persisting settings
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The backing file could not be read or written
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file is not valid settings JSON
    #[error("settings file is corrupted: {0}")]
    Corrupted(#[from] serde_json::Error),
}
