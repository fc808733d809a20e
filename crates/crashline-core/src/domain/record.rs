//! Crash records and their derived representations
//!
//! A [`CrashRecord`] is created when a dump is discovered on disk, either
//! freshly pulled from the capture backend or left over from an interrupted
//! previous run. The formatter attaches a [`StructuredLog`] (transmit-ready)
//! and a [`UserReport`] (read-only projection handed to the application).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Log kind carried by every structured log produced for a crash.
///
/// Delivery events for other kinds are not forwarded to the crash delegate.
pub const CRASH_LOG_KIND: &str = "crash_report";

// ============================================================================
// DeliveryPriority
// ============================================================================

/// Priority requested from the outbound channel when a log is enqueued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPriority {
    /// Sent with the channel's regular batching
    Normal,
    /// Sent ahead of normal traffic
    #[default]
    High,
    /// Persisted and sent as soon as possible
    Critical,
}

impl std::fmt::Display for DeliveryPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeliveryPriority::Normal => "normal",
            DeliveryPriority::High => "high",
            DeliveryPriority::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for DeliveryPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(DeliveryPriority::Normal),
            "high" => Ok(DeliveryPriority::High),
            "critical" => Ok(DeliveryPriority::Critical),
            other => Err(format!("unknown delivery priority '{other}'")),
        }
    }
}

// ============================================================================
// ErrorAttachment
// ============================================================================

/// A file attached to a crash log at delivery time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorAttachment {
    pub id: Uuid,
    pub file_name: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl ErrorAttachment {
    /// Creates a `text/plain` attachment
    pub fn text(text: impl Into<String>, file_name: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.map(String::from),
            content_type: "text/plain".to_string(),
            data: text.into().into_bytes(),
        }
    }

    /// Creates a binary attachment with an explicit content type
    pub fn binary(data: Vec<u8>, file_name: Option<&str>, content_type: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.map(String::from),
            content_type: content_type.to_string(),
            data,
        }
    }

    /// An attachment is only sent when it carries data and a content type
    pub fn is_valid(&self) -> bool {
        !self.data.is_empty() && !self.content_type.is_empty()
    }
}

// ============================================================================
// StructuredLog
// ============================================================================

/// Normalized, transmit-ready representation of a dump plus metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredLog {
    pub id: Uuid,
    pub kind: String,
    /// When the log was produced from the dump
    pub timestamp: DateTime<Utc>,
    /// When the process crashed, if the dump recorded it
    pub crashed_at: Option<DateTime<Utc>>,
    pub process_id: Option<u32>,
    pub thread_name: Option<String>,
    /// Panic message, exception reason or signal description
    pub reason: String,
    pub location: Option<String>,
    pub stack_trace: Option<String>,
    pub app_version: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub attachments: Vec<ErrorAttachment>,
}

impl StructuredLog {
    /// Creates a crash log with the given reason and no optional metadata
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: CRASH_LOG_KIND.to_string(),
            timestamp: Utc::now(),
            crashed_at: None,
            process_id: None,
            thread_name: None,
            reason: reason.into(),
            location: None,
            stack_trace: None,
            app_version: None,
            properties: BTreeMap::new(),
            attachments: Vec::new(),
        }
    }

    /// Returns true if this log belongs to the crash subsystem
    pub fn is_crash(&self) -> bool {
        self.kind == CRASH_LOG_KIND
    }
}

// ============================================================================
// UserReport
// ============================================================================

/// Read-only projection of a [`StructuredLog`] exposed to the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReport {
    /// Identifier shared with the structured log it was projected from
    pub id: Uuid,
    pub reason: String,
    pub location: Option<String>,
    pub crashed_at: Option<DateTime<Utc>>,
    pub thread_name: Option<String>,
    pub process_id: Option<u32>,
    pub app_version: Option<String>,
}

impl From<&StructuredLog> for UserReport {
    fn from(log: &StructuredLog) -> Self {
        Self {
            id: log.id,
            reason: log.reason.clone(),
            location: log.location.clone(),
            crashed_at: log.crashed_at,
            thread_name: log.thread_name.clone(),
            process_id: log.process_id,
            app_version: log.app_version.clone(),
        }
    }
}

// ============================================================================
// CrashRecord
// ============================================================================

/// One undelivered crash, keyed by its file in the crash-storage root
///
/// The file path is the identity of the record and stays stable across
/// restarts. Raw bytes are loaded lazily and the derived representations
/// are attached once by the formatter.
#[derive(Debug, Clone)]
pub struct CrashRecord {
    path: PathBuf,
    raw_bytes: Option<Vec<u8>>,
    log: Option<StructuredLog>,
    report: Option<UserReport>,
}

impl CrashRecord {
    /// Creates a record for a dump file that has not been read yet
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            raw_bytes: None,
            log: None,
            report: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the dump, used as a short identifier
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn raw_bytes(&self) -> Option<&[u8]> {
        self.raw_bytes.as_deref()
    }

    pub fn set_raw_bytes(&mut self, bytes: Vec<u8>) {
        self.raw_bytes = Some(bytes);
    }

    /// Releases the raw bytes once the derived representations exist
    pub fn drop_raw_bytes(&mut self) {
        self.raw_bytes = None;
    }

    pub fn log(&self) -> Option<&StructuredLog> {
        self.log.as_ref()
    }

    pub fn report(&self) -> Option<&UserReport> {
        self.report.as_ref()
    }

    /// Attaches the formatter output to this record
    pub fn attach_derived(&mut self, log: StructuredLog, report: UserReport) {
        self.log = Some(log);
        self.report = Some(report);
    }

    /// Returns true once both derived representations are attached
    pub fn is_formatted(&self) -> bool {
        self.log.is_some() && self.report.is_some()
    }

    /// Consumes the record, returning its structured log if formatted
    pub fn into_log(self) -> Option<StructuredLog> {
        self.log
    }
}
