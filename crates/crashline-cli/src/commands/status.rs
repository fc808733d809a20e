//! Status command - Show crash storage and consent status

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crashline_core::config::{Config, Distribution};
use crashline_core::ports::CaptureBackend;
use crashline_reporter::confirmation;
use crashline_reporter::queue::{self, CrashFileQueue};
use crashline_reporter::PanicCapture;
use crashline_settings::KeyedStore;

use crate::output::{format_size, OutputFormat};

/// Show crash storage and consent status
#[derive(Debug, Args)]
pub struct StatusCommand {}

#[derive(Debug, Serialize)]
struct StatusReport {
    storage_root: String,
    queued_reports: usize,
    queued_bytes: u64,
    analyzer_marker: bool,
    pending_dump: bool,
    always_send: bool,
    distribution: Distribution,
    debounce_ms: u64,
    process_in_background: bool,
    config_errors: Vec<String>,
}

impl StatusCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let report = collect(config)?;
        let formatter = format.formatter();

        if format.is_json() {
            formatter.print_json(&serde_json::to_value(&report)?);
            return Ok(());
        }

        formatter.success("crashline status");
        formatter.field("Storage root", &report.storage_root);
        formatter.field(
            "Queued reports",
            &format!("{} ({})", report.queued_reports, format_size(report.queued_bytes)),
        );
        formatter.field("Pending dump", yes_no(report.pending_dump));
        formatter.field("Analyzer marker", yes_no(report.analyzer_marker));
        formatter.field(
            "Consent",
            if report.always_send { "always send" } else { "ask" },
        );
        formatter.field(
            "Distribution",
            match report.distribution {
                Distribution::Development => "development",
                Distribution::Store => "store",
            },
        );
        formatter.field("Debounce", &format!("{} ms", report.debounce_ms));
        formatter.field("Background", yes_no(report.process_in_background));

        if report.analyzer_marker {
            formatter.warn("An extraction was interrupted; the next start retries it");
        }
        for error in &report.config_errors {
            formatter.warn(&format!("Config: {error}"));
        }
        Ok(())
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn collect(config: &Config) -> Result<StatusReport> {
    let root = config.reporter.resolved_storage_root();
    let files = queue::scan(&root)?;
    let queued_bytes = files
        .iter()
        .filter_map(|path| std::fs::metadata(path).ok())
        .map(|m| m.len())
        .sum();

    let capture = PanicCapture::new(&root, env!("CARGO_PKG_VERSION"));
    let store = KeyedStore::open_or_empty(config.settings.resolved_path(), &config.settings.prefix);
    store.migrate_keys(confirmation::KEY_MIGRATIONS, "crashline-cli");

    Ok(StatusReport {
        storage_root: root.display().to_string(),
        queued_reports: files.len(),
        queued_bytes,
        analyzer_marker: CrashFileQueue::new(&root).marker_exists(),
        pending_dump: capture.has_pending_dump(),
        always_send: confirmation::always_send(&store),
        distribution: config.reporter.distribution,
        debounce_ms: config.reporter.debounce_ms,
        process_in_background: config.reporter.process_in_background,
        config_errors: config.validate().iter().map(|e| e.to_string()).collect(),
    })
}
