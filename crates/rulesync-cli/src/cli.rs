//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Rule and decoder deployment for detection nodes
#[derive(Parser, Debug)]
#[command(name = "rulesync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(
        short,
        long,
        global = true,
        env = "RULESYNC_CONFIG",
        default_value = "/etc/rulesync/config.toml"
    )]
    pub config: PathBuf,

    /// Override the configured node id
    #[arg(long, global = true, env = "RULESYNC_NODE_ID")]
    pub node_id: Option<String>,

    /// Override the configured authority API key
    #[arg(long, global = true, env = "RULESYNC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch the latest bundle and deploy it to this node
    Deploy {
        /// Continue even when the backup cannot be taken
        #[arg(long)]
        force: bool,

        /// Show what would change without touching live files
        #[arg(long)]
        dry_run: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show deployment statistics from the audit ledger
    Stats {
        /// Trailing window in days
        #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u32).range(1..))]
        days: u32,

        #[arg(long)]
        json: bool,
    },

    /// List the most recent deployments
    History {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// List registered nodes
    Nodes {
        #[arg(long)]
        json: bool,
    },

    /// Register a node or change its active flag
    Node {
        /// Node id
        id: String,

        /// Free-form description stored with the node
        #[arg(long)]
        description: Option<String>,

        #[arg(long, conflicts_with = "inactive")]
        active: bool,

        #[arg(long)]
        inactive: bool,
    },

    /// Print the current bundle hash of one file
    RemoteHash {
        /// File name, e.g. `local_rules.xml`
        name: String,
    },

    /// Print the effective configuration
    Config {
        #[arg(long)]
        json: bool,
    },
}
