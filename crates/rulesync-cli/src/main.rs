//! rulesync CLI
//!
//! Deploys rule and decoder bundles to this node and queries the audit
//! ledger.

mod cli;
mod commands;
mod context;
mod error;
mod logging;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands};
use context::Context;
use error::Result;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            std::process::exit(e.exit_code());
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("{}: could not initialize logging: {}", "warning".yellow().bold(), e);
    }

    let ctx = Context::load(&cli)?;
    tracing::debug!(config = %cli.config.display(), node = %ctx.config.node_id, "Loaded configuration");

    match cli.command {
        Commands::Deploy {
            force,
            dry_run,
            json,
        } => commands::run_deploy(&ctx, force, dry_run, json),
        Commands::Stats { days, json } => commands::run_stats(&ctx, days, json).map(|_| 0),
        Commands::History { limit, json } => commands::run_history(&ctx, limit, json).map(|_| 0),
        Commands::Nodes { json } => commands::run_nodes(&ctx, json).map(|_| 0),
        Commands::Node {
            id,
            description,
            active,
            inactive,
        } => commands::run_node(&ctx, &id, description.as_deref(), active, inactive).map(|_| 0),
        Commands::RemoteHash { name } => commands::run_remote_hash(&ctx, &name).map(|_| 0),
        Commands::Config { json } => commands::run_show_config(&ctx, json).map(|_| 0),
    }
}
