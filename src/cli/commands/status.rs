//! Status command - show committed manifest and cache state

use super::Settings;
use crate::error::ShellcacheResult;
use crate::manifest::AssetBundle;
use crate::ui;
use console::{style, Emoji};
use std::collections::HashSet;

static CHECK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "[--] ");
static WARN: Emoji<'_, '_> = Emoji("⚠ ", "[WARN] ");

/// Execute the status command
pub async fn execute(settings: &Settings) -> ShellcacheResult<()> {
    println!("{}", style("shellcache status").bold().cyan());

    let stores = settings.stores();

    let existing = stores.existing().await?;
    ui::section("Caches:");
    for (name, exists) in &existing {
        if *exists {
            println!("  {} {}", CHECK, name);
        } else {
            println!("  {} {} {}", CROSS, name, style("(absent)").dim());
        }
    }
    let [(_, has_content), _, (_, has_manifest)] = existing;

    // Opening a cache creates it, so only read caches that already exist
    ui::section("Committed manifest:");
    let record = if has_manifest {
        stores.manifest_store().await?.load_record().await?
    } else {
        None
    };
    match &record {
        Some(record) => {
            ui::key_value("resources", &record.manifest.len().to_string());
            if let Some(at) = record.committed_at {
                ui::key_value("committed", &at.to_rfc3339());
            }
            if let Some(worker) = &record.worker {
                ui::key_value("worker", worker);
            }
        }
        None => ui::step_info("None; the next activation starts from an empty cache"),
    }

    let manifest = record.map(|r| r.manifest);
    if let Some(manifest) = &manifest {
        let cached: HashSet<String> = if has_content {
            stores.content().await?.list_keys().await?.into_iter().collect()
        } else {
            HashSet::new()
        };
        let present = manifest
            .keys()
            .filter(|k| cached.contains(k.as_str()))
            .count();
        ui::key_value_status(
            "offline",
            &format!("{} of {} resources cached", present, manifest.len()),
            present == manifest.len(),
        );
    }

    ui::section("Asset bundle:");
    ui::key_value("path", &settings.bundle_path.display().to_string());
    match AssetBundle::load(&settings.bundle_path).await {
        Ok(bundle) => {
            ui::key_value("resources", &bundle.resources.len().to_string());
            ui::key_value("shell keys", &bundle.core.len().to_string());
            if let Some(committed) = &manifest {
                let diff = bundle.resources.diff(committed);
                if diff.is_empty() {
                    println!("  {} {}", CHECK, style("Up to date").green());
                } else {
                    println!(
                        "  {} {} ({} added, {} changed, {} removed)",
                        WARN,
                        style("Update pending").yellow(),
                        diff.added.len(),
                        diff.changed.len(),
                        diff.removed.len()
                    );
                }
            }
        }
        Err(e) => {
            ui::step_warn_hint(&e.to_string(), "Run: shellcache manifest build <dir>");
        }
    }

    ui::section("Origin:");
    ui::key_value("url", &settings.origin);

    Ok(())
}
