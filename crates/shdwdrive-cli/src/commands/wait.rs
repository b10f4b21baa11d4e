//! Wait command - poll an account until a file shows up or goes away
//!
//! Polls `list-objects` with the `polling` settings from the configuration.
//! Ctrl-C stops the loop.

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shdwdrive_core::domain::StoredFile;
use shdwdrive_core::poll::{PollCallbacks, PollOutcome, Poller};
use shdwdrive_core::ports::IFileReader;

use super::files::{file_reader, parse_account};
use crate::CliContext;

#[derive(Debug, Args)]
pub struct WaitCommand {
    /// Storage account key
    account: String,
    /// File name to wait for
    name: String,
    /// Wait for the file to disappear instead
    #[arg(long)]
    absent: bool,
}

/// Whether a listing shows the awaited state
fn is_settled(files: &[StoredFile], name: &str, absent: bool) -> bool {
    files.iter().any(|f| f.name == name) != absent
}

fn outcome_label<T>(outcome: &PollOutcome<T>) -> &'static str {
    match outcome {
        PollOutcome::Stopped(_) => "settled",
        PollOutcome::Exhausted => "exhausted",
        PollOutcome::DeadlineElapsed => "timed_out",
        PollOutcome::Cancelled => "cancelled",
    }
}

impl WaitCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let key = parse_account(&self.account)?;
        let reader = Arc::new(file_reader(ctx));
        let poller = Poller::new(ctx.config.polling.poll_config())
            .with_label(format!("wait:{key}/{}", self.name));

        info!(account = %key, name = %self.name, absent = self.absent, "Waiting for file");

        let request = {
            let reader = Arc::clone(&reader);
            let key = key.clone();
            move || {
                let reader = Arc::clone(&reader);
                let key = key.clone();
                async move { reader.list_files(&key).await }
            }
        };
        let name = self.name.clone();
        let absent = self.absent;
        let should_stop = move |files: &Vec<StoredFile>| is_settled(files, &name, absent);
        let callbacks = PollCallbacks::none()
            .on_stop(|files: &Vec<StoredFile>| debug!(files = files.len(), "Listing settled"))
            .on_failure(|| warn!("Gave up waiting"));

        let root = CancellationToken::new();
        let handle = poller.spawn(request, should_stop, callbacks, &root);
        let interrupt = handle.cancellation_token().clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        });
        let outcome = handle.outcome().await;
        let label = outcome_label(&outcome);
        let url = StoredFile::new(key, self.name.clone()).url(&ctx.config.network.cdn);

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "name": self.name,
                "absent": self.absent,
                "outcome": label,
                "url": url,
            }));
        }

        match outcome {
            PollOutcome::Stopped(_) => {
                if !ctx.is_json() {
                    let state = if self.absent { "is gone" } else { "is available" };
                    formatter.success(&format!("{} {state}", self.name));
                    if !self.absent {
                        formatter.info(&url);
                    }
                }
                Ok(())
            }
            PollOutcome::Exhausted => bail!("listing failed too many times in a row"),
            PollOutcome::DeadlineElapsed => bail!("timed out waiting for {}", self.name),
            PollOutcome::Cancelled => bail!("interrupted"),
        }
    }
}
