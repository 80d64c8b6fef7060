//! Run and once command implementations.

use crate::config::{resolve, MirrorConfig, Overrides};
use crate::error::{Error, Result};
use crate::remote::PodioConnector;
use crate::sync::{CycleReport, Decision, Outcome, PassReport, Scheduler};
use colored::Colorize;
use tracing::info;

fn connector(config: &MirrorConfig) -> Result<PodioConnector> {
    PodioConnector::new(
        &config.endpoint,
        config.credentials.clone(),
        config.request_timeout,
    )
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}

/// Execute the run command: cycle until the process is killed.
///
/// # Errors
///
/// Returns an error if configuration is incomplete or the first
/// authentication is rejected.
pub fn execute_run(overrides: &Overrides) -> Result<()> {
    let config = resolve(overrides)?;
    let connector = connector(&config)?;

    info!(
        apps = ?config.app_ids,
        db = %config.db_path.display(),
        interval_secs = config.interval.as_secs(),
        "Starting mirror"
    );

    let rt = runtime()?;
    let mut scheduler = Scheduler::new(connector, &config);
    rt.block_on(scheduler.run())
}

/// Execute the once command: a single cycle, then print its report.
///
/// # Errors
///
/// Returns an error if configuration is incomplete, authentication fails,
/// or the report cannot be serialized.
pub fn execute_once(overrides: &Overrides, json: bool) -> Result<()> {
    let config = resolve(overrides)?;
    let connector = connector(&config)?;

    let rt = runtime()?;
    let mut scheduler = Scheduler::new(connector, &config);
    let report = rt.block_on(scheduler.run_once())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &CycleReport) {
    let decision = match report.decision {
        Decision::Steady => "complete".green(),
        Decision::RateLimited => "rate limited".yellow(),
        Decision::Retry => "incomplete".red(),
    };
    let heading = format!("Cycle {}:", report.cycle);
    println!("{} {}", heading.bold(), decision);

    println!();
    println!("{}", "Schema pass".cyan().bold());
    print_pass(&report.schema, false);

    println!();
    println!("{}", "Item pass".cyan().bold());
    match &report.items {
        Some(items) => {
            print_pass(items, true);
            let totals = items.totals();
            println!(
                "  {} fetched, {} inserted, {} replaced, {} unchanged",
                totals.fetched, totals.inserted, totals.replaced, totals.unchanged
            );
        }
        None => println!("  {}", "skipped".dimmed()),
    }
}

fn print_pass(pass: &PassReport, with_stats: bool) {
    for app in &pass.applications {
        let outcome = if app.outcome == Outcome::Ok {
            app.outcome.as_str().green()
        } else {
            app.outcome.as_str().yellow()
        };
        let table = app.table.as_deref().unwrap_or("-");

        if with_stats && app.outcome == Outcome::Ok {
            println!(
                "  {:>12}  {:<40} {}  (+{} ~{} ={})",
                app.app_id,
                table,
                outcome,
                app.stats.inserted,
                app.stats.replaced,
                app.stats.unchanged
            );
        } else {
            println!("  {:>12}  {:<40} {}", app.app_id, table, outcome);
        }
    }

    if let Some(halt) = pass.halt {
        println!("  {} {}", "stopped:".red(), halt);
    }
}
