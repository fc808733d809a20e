//! CLI subcommands and the wiring they share

pub mod config;
pub mod consent;
pub mod process;
pub mod reports;
pub mod status;
pub mod test_crash;

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use crashline_core::config::Config;
use crashline_core::domain::{DeliveryPriority, StructuredLog};
use crashline_core::ports::OutboundChannel;
use crashline_reporter::{Anonymizer, CrashReporter, JsonDumpFormatter, PanicCapture};
use crashline_settings::KeyedStore;

/// Opens the settings store named in the configuration
pub(crate) fn open_settings(config: &Config) -> Result<KeyedStore> {
    let path = config.settings.resolved_path();
    KeyedStore::open(&path, &config.settings.prefix)
        .with_context(|| format!("Failed to open settings at {}", path.display()))
}

pub(crate) fn dump_formatter(config: &Config) -> JsonDumpFormatter {
    JsonDumpFormatter::new(Anonymizer::new(&config.anonymize))
}

/// Channel that keeps handed-off logs in memory for the command to print
#[derive(Default)]
pub(crate) struct CollectingChannel {
    logs: Mutex<Vec<(StructuredLog, DeliveryPriority)>>,
}

impl CollectingChannel {
    pub(crate) fn take(&self) -> Vec<(StructuredLog, DeliveryPriority)> {
        std::mem::take(&mut *self.logs.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl OutboundChannel for CollectingChannel {
    fn enqueue_for_delivery(&self, log: StructuredLog, priority: DeliveryPriority) {
        self.logs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((log, priority));
    }
}

/// Builds a reporter over the panic-hook capture backend
pub(crate) fn build_reporter(
    config: &Config,
    channel: Arc<CollectingChannel>,
) -> Result<CrashReporter> {
    let root = config.reporter.resolved_storage_root();
    let capture = Arc::new(PanicCapture::new(&root, env!("CARGO_PKG_VERSION")));
    let settings = Arc::new(open_settings(config)?);

    CrashReporter::builder(
        config.reporter.clone(),
        capture,
        Arc::new(dump_formatter(config)),
        channel,
    )
    .settings(settings)
    .build()
    .context("Failed to build crash reporter")
}
