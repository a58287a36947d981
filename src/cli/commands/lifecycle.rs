//! Install, activate and update commands

use super::Settings;
use crate::error::{ShellcacheError, ShellcacheResult};
use crate::reconcile::ActivationReport;
use crate::ui;
use std::sync::Arc;

/// Stage the shell files
pub async fn install(settings: &Settings) -> ShellcacheResult<()> {
    let worker = settings.worker().await?;
    let staged = worker.install().await?;
    ui::step_ok_detail("Install complete", &format!("{} files staged", staged));
    Ok(())
}

/// Reconcile the content cache with the bundle
pub async fn activate(settings: &Settings) -> ShellcacheResult<()> {
    let worker = settings.worker().await?;
    let report = worker.activate().await?;
    print_report(&report);
    Ok(())
}

/// Install, then activate once staging succeeded
pub async fn update(settings: &Settings) -> ShellcacheResult<()> {
    let worker = Arc::new(settings.worker().await?);

    let staged = worker.install().await?;
    ui::step_ok_detail("Install complete", &format!("{} files staged", staged));

    let report = worker
        .spawn_activation()
        .await
        .map_err(|e| ShellcacheError::Internal(format!("activation task: {}", e)))??;
    print_report(&report);
    Ok(())
}

pub(super) fn print_report(report: &ActivationReport) {
    if report.fresh_install {
        ui::step_info("No previous manifest, content cache started empty");
    }
    ui::step_ok_detail(
        "Activation complete",
        &format!(
            "{} resources, {} evicted, {} retained, {} promoted",
            report.resources,
            report.evicted.len(),
            report.retained,
            report.promoted
        ),
    );
    for key in &report.evicted {
        ui::key_value("evicted", key);
    }
}
