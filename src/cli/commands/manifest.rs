//! Manifest command - build and compare asset manifests

use super::Settings;
use crate::cli::args::{ManifestAction, ManifestArgs, OutputFormat};
use crate::error::ShellcacheResult;
use crate::manifest::{AssetBundle, ManifestDiff, ResourceKey};
use crate::ui;
use console::style;
use std::path::PathBuf;

/// Execute the manifest command
pub async fn execute(args: ManifestArgs, settings: &Settings) -> ShellcacheResult<()> {
    match args.action {
        ManifestAction::Build { dir, core, output } => build(settings, dir, core, output).await,
        ManifestAction::Diff { format } => diff(settings, format).await,
    }
}

async fn build(
    settings: &Settings,
    dir: PathBuf,
    core: Vec<String>,
    output: Option<PathBuf>,
) -> ShellcacheResult<()> {
    let core = core
        .into_iter()
        .map(ResourceKey::new)
        .collect::<Result<Vec<_>, _>>()?;

    let bundle = AssetBundle::build_from_dir(&dir, core)?;
    let output = output.unwrap_or_else(|| settings.bundle_path.clone());
    bundle.save(&output).await?;

    ui::step_ok_detail(
        &format!("Wrote {}", output.display()),
        &format!(
            "{} resources, {} shell keys",
            bundle.resources.len(),
            bundle.core.len()
        ),
    );
    Ok(())
}

async fn diff(settings: &Settings, format: OutputFormat) -> ShellcacheResult<()> {
    let bundle = AssetBundle::load(&settings.bundle_path).await?;
    let stores = settings.stores();
    let committed = if stores.storage().has(&stores.names().manifest).await? {
        stores.manifest_store().await?.load().await?
    } else {
        None
    };

    let Some(committed) = committed else {
        match format {
            OutputFormat::Json => println!("{}", serde_json::json!({ "committed": null })),
            OutputFormat::Table => ui::step_info(
                "No committed manifest; the next activation flushes the content cache",
            ),
        }
        return Ok(());
    };

    let diff = bundle.resources.diff(&committed);
    match format {
        OutputFormat::Table => print_diff_table(&diff),
        OutputFormat::Json => print_diff_json(&diff)?,
    }
    Ok(())
}

fn print_diff_table(diff: &ManifestDiff) {
    if diff.is_empty() {
        println!("Bundle matches the committed manifest.");
        return;
    }

    for key in &diff.added {
        println!("  {} {}", style("+").green(), key);
    }
    for key in &diff.changed {
        println!("  {} {}", style("~").yellow(), key);
    }
    for key in &diff.removed {
        println!("  {} {}", style("-").red(), key);
    }

    println!();
    println!(
        "{} added, {} changed, {} removed, {} unchanged",
        diff.added.len(),
        diff.changed.len(),
        diff.removed.len(),
        diff.unchanged.len()
    );
}

fn print_diff_json(diff: &ManifestDiff) -> ShellcacheResult<()> {
    let json = serde_json::json!({
        "added": diff.added,
        "changed": diff.changed,
        "removed": diff.removed,
        "unchanged": diff.unchanged.len(),
    });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
