//! Process command - Run one processing pass over the crash root
//!
//! Detects a pending dump, formats every queued report and answers the
//! confirmation question with `--decision`. Delivered reports are written
//! to stdout as structured logs.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tracing::info;

use crashline_core::config::Config;
use crashline_core::domain::UserConfirmation;
use crashline_core::ports::{DeliveryListener, DeliveryOutcome};
use crashline_reporter::CycleOutcome;

use super::{build_reporter, CollectingChannel};
use crate::output::OutputFormat;

/// Answer given when the batch needs confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Decision {
    /// Send this batch
    Send,
    /// Send this batch and every later one without asking
    Always,
    /// Delete the batch without sending
    DontSend,
}

impl From<Decision> for UserConfirmation {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Send => UserConfirmation::Send,
            Decision::Always => UserConfirmation::Always,
            Decision::DontSend => UserConfirmation::DontSend,
        }
    }
}

/// Process queued crash reports now
#[derive(Debug, Args)]
pub struct ProcessCommand {
    /// Answer used when the batch needs confirmation
    #[arg(long, value_enum, default_value = "send")]
    decision: Decision,
}

impl ProcessCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = format.formatter();
        let channel = Arc::new(CollectingChannel::default());
        let reporter = build_reporter(config, channel.clone())?;

        // Defer to --decision instead of sending unasked.
        reporter.set_confirmation_handler(Arc::new(|_| true));

        let capture = reporter.enable();
        info!(capture = %capture, "Crash reporting enabled");
        let crashed_last_session = reporter.has_crashed_in_last_session();

        let worker = reporter.clone();
        let mut outcome = tokio::task::spawn_blocking(move || worker.process_pending())
            .await
            .context("Processing task failed")?;

        if let CycleOutcome::AwaitingConfirmation(count) = outcome {
            info!(count, decision = ?self.decision, "Answering confirmation");
            outcome = reporter.notify_user_confirmation(self.decision.into())?;
        }

        let delivered = channel.take();
        for (log, _) in &delivered {
            reporter.on_delivery_event(log, &DeliveryOutcome::WillSend);
        }

        if format.is_json() {
            let logs: Vec<_> = delivered.iter().map(|(log, _)| log).collect();
            formatter.print_json(&serde_json::json!({
                "capture": capture,
                "crashed_last_session": crashed_last_session,
                "outcome": format!("{outcome:?}"),
                "delivered": logs,
            }));
        } else {
            if crashed_last_session {
                formatter.info("The previous session ended in a crash");
            }
            match outcome {
                CycleOutcome::Delivered(n) => {
                    formatter.success(&format!("Handed off {n} report(s)"));
                    for (log, priority) in &delivered {
                        formatter.info(&format!("{}  [{}]  {}", log.id, priority, log.reason));
                    }
                }
                CycleOutcome::Discarded(n) => {
                    formatter.success(&format!("Discarded {n} report(s)"))
                }
                CycleOutcome::Empty => formatter.info("No crash reports to process"),
                CycleOutcome::AbortedBackground => {
                    formatter.warn("Processing skipped while in the background")
                }
                CycleOutcome::SkippedBusy => formatter.warn("Another processing pass is active"),
                CycleOutcome::AwaitingConfirmation(n) => {
                    formatter.warn(&format!("{n} report(s) still await confirmation"))
                }
                CycleOutcome::Disabled => formatter.warn("Crash reporting is disabled"),
            }
        }

        for (log, _) in &delivered {
            reporter.on_delivery_event(log, &DeliveryOutcome::Succeeded);
        }
        Ok(())
    }
}
