//! Formatter for dumps written by [`PanicCapture`](crate::panic_capture::PanicCapture)

use anyhow::Context;

use crashline_core::domain::StructuredLog;
use crashline_core::ports::CrashFormatter;

use crate::anonymizer::Anonymizer;
use crate::panic_capture::PanicDump;

/// Turns JSON [`PanicDump`]s into anonymized structured logs
#[derive(Debug, Clone)]
pub struct JsonDumpFormatter {
    anonymizer: Anonymizer,
}

impl JsonDumpFormatter {
    pub fn new(anonymizer: Anonymizer) -> Self {
        Self { anonymizer }
    }
}

impl CrashFormatter for JsonDumpFormatter {
    fn format(&self, bytes: &[u8]) -> anyhow::Result<StructuredLog> {
        let dump: PanicDump = serde_json::from_slice(bytes).context("not a panic dump")?;

        let mut log = StructuredLog::new(dump.message);
        log.id = dump.id;
        log.crashed_at = Some(dump.crashed_at);
        log.process_id = Some(dump.process_id);
        log.thread_name = dump.thread;
        log.location = Some(dump.location).filter(|l| !l.is_empty());
        log.stack_trace = Some(dump.backtrace).filter(|b| !b.is_empty());
        log.app_version = Some(dump.version);
        log.properties = dump.os_info.to_properties();

        self.anonymizer.anonymize_log(&mut log);
        Ok(log)
    }
}
