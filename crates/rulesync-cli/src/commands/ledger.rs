//! Audit ledger queries: stats, history, nodes

use colored::Colorize;

use rulesync_ledger::{DeploymentRecord, Outcome};

use crate::context::Context;
use crate::error::{CliError, Result};

pub fn run_stats(ctx: &Context, days: u32, json: bool) -> Result<()> {
    let stats = ctx.ledger()?.query_stats(days)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!(
        "{} Deployments in the last {} days",
        "=>".blue().bold(),
        stats.window_days
    );
    println!(
        "   {} total, {} successful, {} failed ({} rolled back)",
        stats.total,
        stats.successful.to_string().green(),
        stats.failed.to_string().red(),
        stats.rolled_back
    );
    println!("   success rate {:.2}%", stats.success_rate);

    if !stats.by_node.is_empty() {
        println!();
        println!("{}", "By node".bold());
        for node in &stats.by_node {
            println!(
                "   {} {} total, {} ok, {} failed, last {}",
                node.node_id.cyan(),
                node.total,
                node.successful,
                node.failed,
                node.last_deployment.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
            );
        }
    }

    if !stats.daily.is_empty() {
        println!();
        println!("{}", "By day".bold());
        for day in &stats.daily {
            println!(
                "   {} {} total, {} ok, {} failed",
                day.day, day.total, day.successful, day.failed
            );
        }
    }
    Ok(())
}

pub fn run_history(ctx: &Context, limit: usize, json: bool) -> Result<()> {
    let records = ctx.ledger()?.recent_deployments(limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No deployments recorded.");
        return Ok(());
    }
    for record in &records {
        print_record(record);
    }
    Ok(())
}

fn print_record(record: &DeploymentRecord) {
    let outcome = match record.outcome {
        Outcome::Success => record.outcome.as_str().green().bold(),
        Outcome::RolledBack => record.outcome.as_str().yellow().bold(),
        Outcome::Failed => record.outcome.as_str().red().bold(),
    };
    println!(
        "{} {} {} {} rules={} decoders={}",
        record.started_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
        record.node_id.cyan(),
        outcome,
        record.action.as_str(),
        record.files_applied.rules,
        record.files_applied.decoders
    );
    if let Some(detail) = &record.error_detail {
        println!("   {}", detail.dimmed());
    }
}

pub fn run_nodes(ctx: &Context, json: bool) -> Result<()> {
    let nodes = ctx.ledger()?.list_nodes()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&nodes)?);
        return Ok(());
    }
    if nodes.is_empty() {
        println!("No nodes registered.");
        return Ok(());
    }
    for node in &nodes {
        let status = if node.active {
            "active".green()
        } else {
            "inactive".red()
        };
        let last_success = node
            .last_success_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".into());
        println!(
            "{} [{}] {} deployments, last success {}",
            node.node_id.cyan().bold(),
            status,
            node.deployment_count,
            last_success.dimmed()
        );
        if let Some(description) = &node.description {
            println!("   {}", description);
        }
    }
    Ok(())
}

pub fn run_node(
    ctx: &Context,
    id: &str,
    description: Option<&str>,
    active: bool,
    inactive: bool,
) -> Result<()> {
    let ledger = ctx.ledger()?;
    ledger.register_node(id, description)?;
    if active || inactive {
        ledger.set_node_active(id, active)?;
    }

    let node = ledger
        .node(id)?
        .ok_or_else(|| CliError::user(format!("node {} was not registered", id)))?;
    let status = if node.active { "active" } else { "inactive" };
    println!("{} {} is {}", "OK".green().bold(), node.node_id.cyan(), status);
    Ok(())
}
