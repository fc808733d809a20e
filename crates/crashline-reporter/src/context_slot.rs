//! Pre-reserved slot for the crashing context
//!
//! The capture backend calls [`record_crash_context`] from a restricted
//! context (a signal handler, or a panic hook on a dying thread). Nothing
//! there may allocate, lock or perform I/O, so the slot is a fixed set of
//! atomics written with plain stores. The reporter reads it back on its
//! next normal-context pass.
//!
//! The slot holds one snapshot. The first crash to claim it wins; later
//! crashes are ignored until the snapshot is taken.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, AtomicU8, Ordering};

use crashline_core::ports::CrashContext;

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const READY: u8 = 2;

/// Fixed-size, allocation-free storage for one [`CrashContext`]
#[derive(Debug)]
pub struct ContextSlot {
    armed: AtomicBool,
    state: AtomicU8,
    signal: AtomicI32,
    fault_address: AtomicU64,
    process_id: AtomicU32,
    timestamp_ms: AtomicU64,
}

impl ContextSlot {
    pub const fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
            state: AtomicU8::new(EMPTY),
            signal: AtomicI32::new(0),
            fault_address: AtomicU64::new(0),
            process_id: AtomicU32::new(0),
            timestamp_ms: AtomicU64::new(0),
        }
    }

    /// Starts accepting snapshots
    pub fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    /// Stops accepting snapshots; the installed hook stays in place but dormant
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Copies `ctx` into the slot. Async-signal-safe.
    ///
    /// Returns false when the slot is disarmed or already holds a snapshot.
    pub fn record(&self, ctx: &CrashContext) -> bool {
        if !self.armed.load(Ordering::Acquire) {
            return false;
        }
        if self
            .state
            .compare_exchange(EMPTY, WRITING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        self.signal.store(ctx.signal, Ordering::Relaxed);
        self.fault_address.store(ctx.fault_address, Ordering::Relaxed);
        self.process_id.store(ctx.process_id, Ordering::Relaxed);
        self.timestamp_ms.store(ctx.timestamp_ms, Ordering::Relaxed);
        self.state.store(READY, Ordering::Release);
        true
    }

    /// Removes and returns the stored snapshot, if a complete one exists
    pub fn take(&self) -> Option<CrashContext> {
        if self.state.load(Ordering::Acquire) != READY {
            return None;
        }
        let ctx = CrashContext {
            signal: self.signal.load(Ordering::Relaxed),
            fault_address: self.fault_address.load(Ordering::Relaxed),
            process_id: self.process_id.load(Ordering::Relaxed),
            timestamp_ms: self.timestamp_ms.load(Ordering::Relaxed),
        };
        self.state.store(EMPTY, Ordering::Release);
        Some(ctx)
    }
}

impl Default for ContextSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide slot filled by [`record_crash_context`]
pub static CRASH_CONTEXT: ContextSlot = ContextSlot::new();

/// Signal callback handed to the capture backend
pub fn record_crash_context(ctx: &CrashContext) {
    CRASH_CONTEXT.record(ctx);
}
