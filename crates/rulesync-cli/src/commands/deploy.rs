//! The deploy command

use colored::Colorize;

use rulesync_core::{RunOptions, RunReport, SyncPlan};
use rulesync_ledger::Outcome;
use rulesync_transport::Category;

use crate::context::Context;
use crate::error::Result;

/// Exit code for a deployment that was rolled back
pub const EXIT_ROLLED_BACK: i32 = 2;

/// Run one deployment and return the process exit code.
pub fn run_deploy(ctx: &Context, force: bool, dry_run: bool, json: bool) -> Result<i32> {
    let orchestrator = ctx.orchestrator()?;

    if !json {
        let verb = if dry_run { "Planning" } else { "Deploying" };
        println!(
            "{} {} bundle for {}...",
            "=>".blue().bold(),
            verb,
            ctx.config.node_id.cyan()
        );
    }

    let report = orchestrator.run(RunOptions { force, dry_run })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(exit_code(&report))
}

fn exit_code(report: &RunReport) -> i32 {
    match report.outcome() {
        Outcome::Success => 0,
        Outcome::RolledBack => EXIT_ROLLED_BACK,
        Outcome::Failed => 1,
    }
}

fn print_report(report: &RunReport) {
    let path: Vec<String> = report.transitions.iter().map(|s| s.to_string()).collect();
    println!("   {}", path.join(" -> ").dimmed());

    if let Some(plan) = &report.plan {
        for category in Category::ALL {
            print_plan(category, plan.category(category));
        }
    }

    let record = &report.record;
    if let Some(generation) = &record.generation {
        println!("   {} {}", "generation".dimmed(), generation);
    }
    if let Some(backup) = &report.backup {
        println!("   {} {}", "backup".dimmed(), backup.display());
    }
    if record.backup_skipped {
        println!("   {} deployed without a backup", "!".yellow());
    }

    let applied = record.files_applied;
    match record.outcome {
        Outcome::Success if report.dry_run => {
            let pending = report.plan.as_ref().is_some_and(|p| p.required());
            if pending {
                println!("{} Dry run: changes above would be deployed.", "PLAN".cyan().bold());
            } else {
                println!("{} Dry run: node is already up to date.", "OK".green().bold());
            }
        }
        Outcome::Success if applied.total() == 0 => {
            println!("{} No changes. Node is up to date.", "OK".green().bold());
        }
        Outcome::Success => {
            println!(
                "{} Deployed {} rules and {} decoders.",
                "OK".green().bold(),
                applied.rules,
                applied.decoders
            );
        }
        Outcome::RolledBack => {
            println!("{} Previous configuration restored.", "ROLLED BACK".yellow().bold());
        }
        Outcome::Failed => {
            println!("{} Deployment failed.", "FAILED".red().bold());
        }
    }
    if let Some(detail) = &record.error_detail {
        println!("   {}", detail.red());
    }

    if let Some(e) = &report.ledger_error {
        println!("   {} ledger: {}", "!".yellow(), e);
    }
    if let Some(e) = &report.report_error {
        println!("   {} report: {}", "!".yellow(), e);
    }
}

fn print_plan(category: Category, plan: &SyncPlan) {
    if !plan.required {
        println!("   {} {}", category.to_string().bold(), "unchanged".dimmed());
        return;
    }
    println!(
        "   {} {} added, {} replaced, {} removed",
        category.to_string().bold(),
        plan.to_add.len(),
        plan.to_replace.len(),
        plan.to_remove.len()
    );
    for file in &plan.to_add {
        println!("     {} {}", "+".green(), file.name);
    }
    for file in &plan.to_replace {
        println!("     {} {}", "~".yellow(), file.name);
    }
    for name in &plan.to_remove {
        println!("     {} {}", "-".red(), name);
    }
}
