//! Capture backend port (driven/secondary port)
//!
//! The capture backend owns signal/exception interception and dump
//! production. crashline only asks whether a dump from a previous run is
//! pending, pulls its bytes, purges it, and installs the handlers once.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because capture failures are adapter-specific.
//! - [`SignalCallback`] is a plain function pointer: it runs in a restricted
//!   context (signal handler or panic hook) where allocating, locking and I/O
//!   are forbidden, so it cannot own captured state.
//! - [`CrashContext`] is `Copy` and fixed-size so the callback can store it
//!   with plain atomic writes.

use serde::{Deserialize, Serialize};

/// Fixed-size snapshot of the crashing context
///
/// Every field is a plain integer so the snapshot can be copied without
/// allocation from inside a restricted callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CrashContext {
    /// Signal number, or 0 for a non-signal crash (panic, exception)
    pub signal: i32,
    /// Faulting address when known
    pub fault_address: u64,
    /// Process id of the crashing process
    pub process_id: u32,
    /// Milliseconds since the Unix epoch at capture time
    pub timestamp_ms: u64,
}

/// Callback invoked by the capture backend from a restricted context
pub type SignalCallback = fn(&CrashContext);

/// Port trait for the low-level capture library
pub trait CaptureBackend: Send + Sync {
    /// Returns true if a dump produced by a previous run is waiting
    fn has_pending_dump(&self) -> bool;

    /// Loads the raw bytes of the pending dump
    fn load_pending_dump(&self) -> anyhow::Result<Vec<u8>>;

    /// Forgets the pending dump so it is not extracted twice
    ///
    /// Purging when nothing is pending must succeed.
    fn purge_pending_dump(&self) -> anyhow::Result<()>;

    /// Installs the capture handlers, calling `callback` at crash time
    fn install_handlers(&self, callback: SignalCallback) -> anyhow::Result<()>;

    /// Turns dump writing on or off without uninstalling the handlers
    ///
    /// Installed handlers stay in the chain after a disable; while
    /// disarmed they must neither write a dump nor call the callback.
    fn set_armed(&self, _armed: bool) {}
}

/// Opaque identity of a process-wide top-level exception handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerId(pub u64);

/// Port trait for the process-wide top-level exception handler chain
///
/// The configurator reads the current handler before and after the capture
/// backend installs its own, to verify that the installation took effect.
pub trait HandlerRegistry: Send + Sync {
    /// Identity of the handler currently installed, if any
    fn current_handler(&self) -> Option<HandlerId>;

    /// Registers the secondary handler that routes non-native exception
    /// propagation to the top-level handler
    fn register_forwarding_handler(&self) -> anyhow::Result<()>;
}
