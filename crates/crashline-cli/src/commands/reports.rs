//! Reports command - Inspect and delete queued crash reports
//!
//! Provides the `crashline reports` CLI command with subcommands:
//! - `list`: Show every queued report, oldest first
//! - `view <id>`: Display one report as its structured log
//! - `delete`: Remove reports from the crash root

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::Serialize;

use crashline_core::config::Config;
use crashline_core::domain::DomainError;
use crashline_core::ports::CrashFormatter;
use crashline_reporter::queue::{self, CrashFileQueue};

use super::dump_formatter;
use crate::output::{format_size, OutputFormat};

/// Report management subcommands
#[derive(Debug, Subcommand)]
pub enum ReportsCommand {
    /// List queued crash reports, oldest first
    List,
    /// View a queued crash report
    View {
        /// File name of the report in the crash root
        id: String,
    },
    /// Delete queued crash reports
    Delete {
        /// File name of the report to delete
        id: Option<String>,
        /// Delete every queued report
        #[arg(long)]
        all: bool,
    },
}

#[derive(Debug, Serialize)]
struct ReportSummary {
    id: String,
    size_bytes: u64,
    modified: Option<DateTime<Utc>>,
    reason: Option<String>,
}

impl ReportsCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let root = config.reporter.resolved_storage_root();
        match self {
            ReportsCommand::List => list(config, &root, format),
            ReportsCommand::View { id } => view(config, &root, id, format),
            ReportsCommand::Delete { id, all } => delete(&root, id.as_deref(), *all, format),
        }
    }
}

/// Maps a report id to its path, rejecting anything that is not a plain
/// queue file name
fn report_path(root: &Path, id: &str) -> Result<PathBuf, DomainError> {
    let plain = !id.contains('/') && !id.contains('\\') && id != "." && id != "..";
    if !plain || !queue::is_eligible_name(id) {
        return Err(DomainError::InvalidFileName(id.to_string()));
    }
    Ok(root.join(id))
}

fn summarize(config: &Config, path: &Path) -> ReportSummary {
    let metadata = std::fs::metadata(path).ok();
    let reason = std::fs::read(path)
        .ok()
        .and_then(|bytes| dump_formatter(config).format(&bytes).ok())
        .map(|log| log.reason);

    ReportSummary {
        id: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        size_bytes: metadata.as_ref().map(|m| m.len()).unwrap_or(0),
        modified: metadata
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from),
        reason,
    }
}

fn list(config: &Config, root: &Path, format: OutputFormat) -> Result<()> {
    let formatter = format.formatter();
    let reports: Vec<ReportSummary> = queue::scan(root)?
        .iter()
        .map(|path| summarize(config, path))
        .collect();

    if format.is_json() {
        formatter.print_json(&serde_json::to_value(&reports)?);
        return Ok(());
    }
    if reports.is_empty() {
        formatter.info("No queued crash reports.");
        return Ok(());
    }

    println!("{:<22} {:<17} {:>10}  Reason", "ID", "Modified", "Size");
    println!("{}", "-".repeat(72));
    for report in &reports {
        println!(
            "{:<22} {:<17} {:>10}  {}",
            report.id,
            report
                .modified
                .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
            format_size(report.size_bytes),
            report.reason.as_deref().unwrap_or("(unreadable)"),
        );
    }
    println!();
    println!("Total: {} report(s)", reports.len());
    Ok(())
}

fn view(config: &Config, root: &Path, id: &str, format: OutputFormat) -> Result<()> {
    let formatter = format.formatter();
    let path = report_path(root, id)?;
    if !path.is_file() {
        formatter.error(&format!("Report '{id}' not found"));
        return Ok(());
    }

    let bytes = std::fs::read(&path)?;
    let log = match dump_formatter(config).format(&bytes) {
        Ok(log) => log,
        Err(e) => {
            formatter.warn(&format!(
                "Report '{id}' ({}) cannot be formatted: {e:#}",
                format_size(bytes.len() as u64)
            ));
            return Ok(());
        }
    };

    if format.is_json() {
        formatter.print_json(&serde_json::to_value(&log)?);
        return Ok(());
    }

    formatter.success(&format!("Crash report {id}"));
    formatter.field("Log ID", &log.id.to_string());
    formatter.field("Reason", &log.reason);
    if let Some(at) = log.crashed_at {
        formatter.field("Crashed at", &at.to_rfc3339());
    }
    if let Some(thread) = &log.thread_name {
        formatter.field("Thread", thread);
    }
    if let Some(pid) = log.process_id {
        formatter.field("Process", &pid.to_string());
    }
    if let Some(location) = &log.location {
        formatter.field("Location", location);
    }
    if let Some(version) = &log.app_version {
        formatter.field("App version", version);
    }
    for (key, value) in &log.properties {
        formatter.field(key, value);
    }
    if let Some(trace) = &log.stack_trace {
        formatter.info("");
        formatter.info("Stack trace:");
        for line in trace.lines() {
            formatter.info(line);
        }
    }
    Ok(())
}

fn delete(root: &Path, id: Option<&str>, all: bool, format: OutputFormat) -> Result<()> {
    let formatter = format.formatter();
    let mut queue = CrashFileQueue::new(root);

    if all {
        queue.refresh()?;
        let count = queue.purge_all();
        formatter.success(&format!("Deleted {count} report(s)"));
    } else if let Some(id) = id {
        let path = report_path(root, id)?;
        if path.is_file() {
            queue.remove(&path)?;
            formatter.success(&format!("Deleted report '{id}'"));
        } else {
            formatter.error(&format!("Report '{id}' not found"));
        }
    } else {
        formatter.error("Specify a report ID or use --all");
    }
    Ok(())
}
