//! Port definitions (collaborator boundaries)
//!
//! This module defines the traits that separate the crash-report lifecycle
//! from the collaborators it drives. Implementations live in the host
//! application or in the adapters shipped by `crashline-reporter`.
//!
//! ## Ports Overview
//!
//! - [`CaptureBackend`] - Low-level dump capture (pending dump, handler install)
//! - [`HandlerRegistry`] - Process-wide top-level exception handler chain
//! - [`CrashFormatter`] - Dump to structured log conversion
//! - [`OutboundChannel`] - Hand-off to the telemetry transport
//! - [`DeliveryListener`] - Transport outcome callbacks
//! - [`AppStateProvider`] - Foreground state of the host application
//! - [`CrashReporterDelegate`] - Optional application hooks with no-op defaults

pub mod capture;
pub mod channel;
pub mod formatter;
pub mod host;

pub use capture::{CaptureBackend, CrashContext, HandlerId, HandlerRegistry, SignalCallback};
pub use channel::{DeliveryListener, DeliveryOutcome, OutboundChannel};
pub use formatter::CrashFormatter;
pub use host::{AlwaysForeground, AppStateProvider, CrashReporterDelegate, NoopDelegate};
