//! Message command - deliver a client message to the worker

use super::{lifecycle, Settings};
use crate::cli::args::MessageArgs;
use crate::error::ShellcacheResult;
use crate::ui;
use crate::worker::{MessageOutcome, WorkerMessage};

/// Execute the message command
pub async fn execute(args: MessageArgs, settings: &Settings) -> ShellcacheResult<()> {
    let Some(message) = WorkerMessage::parse(&args.message) else {
        ui::step_info(&format!("Unknown message {:?} ignored", args.message));
        return Ok(());
    };

    let worker = settings.worker().await?;
    match worker.handle_message(message).await? {
        MessageOutcome::Activated(report) => lifecycle::print_report(&report),
        MessageOutcome::NotWaiting(state) => {
            ui::step_info(&format!("Nothing waiting to activate (worker is {})", state))
        }
        MessageOutcome::Synced(report) => ui::step_ok_detail(
            "Sync complete",
            &format!("{} of {} resources stored", report.stored, report.requested),
        ),
    }

    Ok(())
}
