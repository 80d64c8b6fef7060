//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Overrides;

pub mod commands;

/// podio-mirror - Mirror Podio applications into SQLite
#[derive(Parser, Debug)]
#[command(name = "podio-mirror", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.podio-mirror/data/mirror.db)
    #[arg(long, global = true, env = "PODIO_MIRROR_DB")]
    pub db: Option<PathBuf>,

    /// Config file (default: ~/.podio-mirror/config.json)
    #[arg(long, global = true, env = "PODIO_MIRROR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Flags shared by the commands that talk to Podio.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Application id to mirror (repeatable; replaces PODIO_APP_IDS)
    #[arg(long = "app", value_name = "APP_ID")]
    pub apps: Vec<i64>,

    /// Seconds between successful cycles (default: 28800)
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mirror continuously until stopped
    Run(SyncArgs),

    /// Run a single cycle and print its report
    Once(SyncArgs),

    /// Show mirrored tables and recent changes
    Status {
        /// Number of recent events to show
        #[arg(long, default_value_t = 20)]
        limit: u32,

        /// Only show events for this table
        #[arg(long)]
        table: Option<String>,
    },

    /// Show the resolved configuration (secrets masked)
    Config(SyncArgs),

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

impl Cli {
    /// Configuration overrides from global flags plus a command's sync flags.
    #[must_use]
    pub fn overrides(&self, args: &SyncArgs) -> Overrides {
        Overrides {
            config_path: self.config.clone(),
            db: self.db.clone(),
            interval_secs: args.interval,
            app_ids: args.apps.clone(),
        }
    }
}
