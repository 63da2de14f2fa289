use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Ledger database, overrides `database` in the config file
    #[arg(short, long)]
    pub database: Option<PathBuf>,

    /// More log output (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Sync every configured source (the default)
    Sync {
        /// Only sync the named sources
        #[arg(long, value_name = "NAME")]
        only: Vec<String>,
    },

    /// Mark an item so the next sync attempts it again
    Retry {
        /// Site key as stored in the ledger, e.g. Youtube
        #[arg(long)]
        site: String,
        #[arg(long)]
        id: String,
        /// Source name to store with the marker
        #[arg(long)]
        group: Option<String>,
    },

    /// Print every ledger row for an item
    History {
        #[arg(long)]
        site: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub fn action(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Sync { only: Vec::new() })
    }
}
