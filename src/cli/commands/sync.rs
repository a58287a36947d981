//! Sync command - make every resource available offline

use super::Settings;
use crate::error::ShellcacheResult;
use crate::ui;
use crate::worker::{MessageOutcome, WorkerMessage};

/// Execute the sync command
pub async fn execute(settings: &Settings) -> ShellcacheResult<()> {
    let worker = settings.worker().await?;

    if let MessageOutcome::Synced(report) = worker
        .handle_message(WorkerMessage::DownloadOffline)
        .await?
    {
        if report.requested == 0 {
            ui::step_ok("Every resource is already cached");
        } else {
            ui::step_ok_detail(
                "Sync complete",
                &format!("{} of {} resources stored", report.stored, report.requested),
            );
        }
    }

    Ok(())
}
