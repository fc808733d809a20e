//! Confirmation protocol
//!
//! The application sees the whole pending batch at once and answers with
//! one [`UserConfirmation`] for all of it. Silence is consent: without a
//! handler, or when the handler does not claim the decision, the batch is
//! sent right away.

use std::sync::Arc;

use tracing::{debug, info};

use crashline_core::domain::{UserConfirmation, UserReport};
use crashline_settings::KeyedStore;

/// Store key of the persisted "always send" flag
pub const ALWAYS_SEND_KEY: &str = "crashes.always_send";

/// Unprefixed key older releases wrote the flag under
pub const LEGACY_ALWAYS_SEND_KEY: &str = "CrashlineAlwaysSend";

/// Store key migrations applied on every enable
pub const KEY_MIGRATIONS: &[(&str, &str)] = &[(LEGACY_ALWAYS_SEND_KEY, ALWAYS_SEND_KEY)];

/// Inspects a batch; returns true if the application will ask the user and
/// answer later through `notify_user_confirmation`
pub type ConfirmationHandler = Arc<dyn Fn(&[UserReport]) -> bool + Send + Sync>;

/// Observes every confirmation decision along with the batch it applied to
pub type DecisionObserver = Arc<dyn Fn(UserConfirmation, &[UserReport]) + Send + Sync>;

/// Why a batch skipped the confirmation prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendNowReason {
    AlwaysSend,
    NoHandler,
    NoObjection,
}

impl std::fmt::Display for SendNowReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SendNowReason::AlwaysSend => "always_send",
            SendNowReason::NoHandler => "no_handler",
            SendNowReason::NoObjection => "no_objection",
        };
        write!(f, "{s}")
    }
}

/// Where a formatted batch goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationRoute {
    SendNow(SendNowReason),
    AwaitUser,
}

/// Decides whether `batch` needs an answer from the application.
///
/// The handler is not consulted when the always-send flag is set.
pub fn route(
    batch: &[UserReport],
    always_send: bool,
    handler: Option<&ConfirmationHandler>,
) -> ConfirmationRoute {
    let route = if always_send {
        ConfirmationRoute::SendNow(SendNowReason::AlwaysSend)
    } else {
        match handler {
            None => ConfirmationRoute::SendNow(SendNowReason::NoHandler),
            Some(handler) if handler(batch) => ConfirmationRoute::AwaitUser,
            Some(_) => ConfirmationRoute::SendNow(SendNowReason::NoObjection),
        }
    };
    debug!(batch = batch.len(), route = ?route, "Confirmation routed");
    route
}

/// Reads the persisted always-send flag
pub fn always_send(store: &KeyedStore) -> bool {
    store.get_as::<bool>(ALWAYS_SEND_KEY).unwrap_or(false)
}

/// Persists the always-send flag
pub fn set_always_send(store: &KeyedStore) {
    if store.update_object(true, ALWAYS_SEND_KEY, None) {
        info!("Crash reports will be sent without asking");
    }
}

/// Clears the always-send flag so the next batch asks again
pub fn reset_always_send(store: &KeyedStore) {
    store.remove(ALWAYS_SEND_KEY);
    info!("Crash report consent reset");
}
