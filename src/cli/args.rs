//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// shellcache - Manifest-reconciling content cache for web application shells
///
/// Precaches a manifest of versioned static resources, reconciles the cache
/// on upgrade, and serves requests cache-first (network-first for the root
/// document).
#[derive(Parser, Debug)]
#[command(name = "shellcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SHELLCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Asset bundle path (overrides [bundle] path)
    #[arg(long, global = true, env = "SHELLCACHE_BUNDLE")]
    pub bundle: Option<PathBuf>,

    /// Site origin (overrides [origin] url)
    #[arg(long, global = true, env = "SHELLCACHE_ORIGIN")]
    pub origin: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build or inspect asset manifests
    Manifest(ManifestArgs),

    /// Stage the shell files for the next activation
    Install,

    /// Reconcile the content cache with the asset bundle
    Activate,

    /// Install and activate in one step
    Update,

    /// Route one request through the cache
    Fetch(FetchArgs),

    /// Download every resource missing from the content cache
    Sync,

    /// Send a client message (skipWaiting, downloadOffline)
    Message(MessageArgs),

    /// Show committed manifest and cache state
    Status,

    /// Delete all caches
    Clear(ClearArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the manifest command
#[derive(Parser, Debug)]
pub struct ManifestArgs {
    /// Subcommand for manifest
    #[command(subcommand)]
    pub action: ManifestAction,
}

/// Manifest subcommands
#[derive(Subcommand, Debug)]
pub enum ManifestAction {
    /// Fingerprint a build output directory into an asset bundle
    Build {
        /// Build output directory
        dir: PathBuf,

        /// Shell keys restaged on every activation (comma-separated)
        #[arg(long, value_delimiter = ',')]
        core: Vec<String>,

        /// Output file (defaults to the configured bundle path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare the committed manifest with the asset bundle
    Diff {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}

/// Arguments for the fetch command
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Absolute request URL
    pub url: String,

    /// Request method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Write the response body to a file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the message command
#[derive(Parser, Debug)]
pub struct MessageArgs {
    /// Message name; unknown messages are ignored
    pub message: String,
}

/// Arguments for the clear command
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for listing commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_manifest_build() {
        let cli = Cli::parse_from([
            "shellcache",
            "manifest",
            "build",
            "web",
            "--core",
            "main.js,index.html",
        ]);
        match cli.command {
            Commands::Manifest(ManifestArgs {
                action: ManifestAction::Build { dir, core, output },
            }) => {
                assert_eq!(dir, PathBuf::from("web"));
                assert_eq!(core, vec!["main.js", "index.html"]);
                assert!(output.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn parses_message() {
        let cli = Cli::parse_from(["shellcache", "message", "skipWaiting"]);
        match cli.command {
            Commands::Message(MessageArgs { message }) => assert_eq!(message, "skipWaiting"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn parses_global_flags() {
        let cli = Cli::parse_from(["shellcache", "-vv", "status", "--origin", "https://a.example"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.origin.as_deref(), Some("https://a.example"));
    }
}
