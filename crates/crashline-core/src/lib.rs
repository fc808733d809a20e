//! crashline Core - Domain types and collaborator boundaries
//!
//! This crate contains the pieces every other crashline crate shares:
//! - **Domain entities** - `CrashRecord`, `StructuredLog`, `UserReport`, `ErrorAttachment`
//! - **Confirmation outcomes** - `UserConfirmation`
//! - **Port definitions** - Traits for collaborators: `CaptureBackend`, `CrashFormatter`,
//!   `OutboundChannel`, `AppStateProvider`, `CrashReporterDelegate`, `HandlerRegistry`
//! - **Configuration** - Typed YAML configuration with validation and a builder
//!
//! # Architecture
//!
//! The domain module holds plain data with no I/O. Ports define the trait
//! interfaces the reporter drives; the host application (or the adapters
//! shipped in `crashline-reporter`) implements them.

pub mod config;
pub mod domain;
pub mod ports;
