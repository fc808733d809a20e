//! Consent command - View or change the stored "always send" flag

use anyhow::{Context, Result};
use clap::Subcommand;

use crashline_core::config::Config;
use crashline_reporter::confirmation::{self, KEY_MIGRATIONS};
use crashline_settings::KeyedStore;

use super::open_settings;
use crate::output::OutputFormat;

/// Consent subcommands
#[derive(Debug, Subcommand)]
pub enum ConsentCommand {
    /// Show whether reports are sent without asking
    Status,
    /// Send every future batch without asking
    Always,
    /// Forget the stored consent; the application asks again
    Reset,
}

impl ConsentCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let store = open_settings(config)?;
        store.migrate_keys(KEY_MIGRATIONS, "crashline-cli");

        match self {
            ConsentCommand::Status => {}
            ConsentCommand::Always => {
                confirmation::set_always_send(&store);
                flush(&store)?;
            }
            ConsentCommand::Reset => {
                confirmation::reset_always_send(&store);
                flush(&store)?;
            }
        }

        let always = confirmation::always_send(&store);
        let formatter = format.formatter();
        if format.is_json() {
            formatter.print_json(&serde_json::json!({ "always_send": always }));
            return Ok(());
        }

        let message = if always {
            "Crash reports are sent without asking"
        } else {
            "The application asks before sending crash reports"
        };
        match self {
            ConsentCommand::Status => formatter.info(message),
            _ => formatter.success(message),
        }
        Ok(())
    }
}

fn flush(store: &KeyedStore) -> Result<()> {
    store.flush().context("Failed to save settings")
}
