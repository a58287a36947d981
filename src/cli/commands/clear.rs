//! Clear command - delete every named cache

use super::Settings;
use crate::cli::args::ClearArgs;
use crate::error::ShellcacheResult;
use console::style;
use std::io::{self, Write};

/// Execute the clear command
pub async fn execute(args: ClearArgs, settings: &Settings) -> ShellcacheResult<()> {
    let stores = settings.stores();
    let existing: Vec<String> = stores
        .existing()
        .await?
        .into_iter()
        .filter_map(|(name, exists)| exists.then_some(name))
        .collect();

    if existing.is_empty() {
        println!("No caches to clear.");
        return Ok(());
    }

    println!("This will delete {} cache(s):", existing.len());
    for name in &existing {
        println!("  {} {}", style("•").red(), name);
    }
    println!();

    if !args.yes {
        print!("Are you sure? [y/N] ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    stores.delete_all().await?;
    println!("{} cleared {} cache(s)", style("✓").green(), existing.len());

    Ok(())
}
