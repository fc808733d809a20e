//! Domain entities
//!
//! This module contains the core domain types for crashline:
//! - Crash records and their derived representations
//! - Error attachments travelling with a structured log
//! - User confirmation outcomes
//! - Domain-specific error types

pub mod confirmation;
pub mod errors;
pub mod record;

// Re-export commonly used types
pub use confirmation::UserConfirmation;
pub use errors::DomainError;
pub use record::{
    CrashRecord, DeliveryPriority, ErrorAttachment, StructuredLog, UserReport, CRASH_LOG_KIND,
};
