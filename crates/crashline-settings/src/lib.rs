//! crashline Settings - Persisted keyed store
//!
//! Provides:
//! - `KeyedStore`: prefix-namespaced key/value store persisted as JSON, with
//!   dictionary merge and object update under an optional expiration
//! - `Clock`: time source for expiration, with a `ManualClock` for tests
//! - `shared()` / `reset_shared()`: lazily-initialised process-wide instance
//!
//! The reporter receives a `KeyedStore` explicitly; the shared instance only
//! exists for hosts that have no better place to keep one.

pub mod clock;
pub mod error;
pub mod store;

use std::sync::{Arc, Mutex};

use crashline_core::config::SettingsConfig;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SettingsError;
pub use store::{KeyedEntry, KeyedStore};

static SHARED: Mutex<Option<Arc<KeyedStore>>> = Mutex::new(None);

/// Returns the process-wide store, opening it at the default location on first use.
pub fn shared() -> Arc<KeyedStore> {
    let mut guard = SHARED.lock().unwrap_or_else(|e| e.into_inner());
    guard
        .get_or_insert_with(|| {
            let defaults = SettingsConfig::default();
            Arc::new(KeyedStore::open_or_empty(defaults.resolved_path(), &defaults.prefix))
        })
        .clone()
}

/// Installs `store` as the process-wide instance.
pub fn set_shared(store: Arc<KeyedStore>) {
    let mut guard = SHARED.lock().unwrap_or_else(|e| e.into_inner());
    *guard = Some(store);
}

/// Drops the process-wide instance; the next `shared()` call reopens it.
pub fn reset_shared() {
    let mut guard = SHARED.lock().unwrap_or_else(|e| e.into_inner());
    *guard = None;
}
