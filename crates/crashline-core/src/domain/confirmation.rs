//! User confirmation outcomes
//!
//! The application answers a pending batch of crash reports with one of
//! three outcomes. `Always` also persists the consent flag so later
//! batches skip the question entirely.

use serde::{Deserialize, Serialize};

/// Decision taken by the user (or the application) on a pending batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserConfirmation {
    /// Discard every report of the batch without sending
    DontSend,
    /// Send this batch
    Send,
    /// Send this batch and every future batch without asking
    Always,
}

impl UserConfirmation {
    /// Returns true if the batch is delivered
    pub fn sends(&self) -> bool {
        !matches!(self, UserConfirmation::DontSend)
    }
}

impl std::fmt::Display for UserConfirmation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UserConfirmation::DontSend => "dont_send",
            UserConfirmation::Send => "send",
            UserConfirmation::Always => "always",
        };
        write!(f, "{}", s)
    }
}
