//! Test-crash command - Panic under the installed capture
//!
//! The panic hook writes a pending dump under the crash root; the next
//! `crashline process` extracts and delivers it.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use crashline_core::config::Config;

use super::{build_reporter, CollectingChannel};
use crate::output::OutputFormat;

/// Crash this process to exercise the pipeline
#[derive(Debug, Args)]
pub struct TestCrashCommand {}

impl TestCrashCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = format.formatter();
        let reporter = build_reporter(config, Arc::new(CollectingChannel::default()))?;

        let capture = reporter.enable();
        formatter.info(&format!("Capture: {capture}"));
        formatter.warn("Crashing now; run `crashline process` to deliver the report");

        reporter.generate_test_crash();

        // Only reached when the crash was ignored.
        formatter.error("Test crash ignored: store build or crash reporting disabled");
        Ok(())
    }
}
