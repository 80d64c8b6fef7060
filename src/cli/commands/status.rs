//! Status command implementation.

use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use crate::storage::{Event, TableSummary, TargetStore};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

/// Output for status command.
#[derive(Serialize)]
struct StatusOutput<'a> {
    database: String,
    tables: &'a [TableSummary],
    events: &'a [Event],
}

/// Execute status command.
///
/// # Errors
///
/// Returns `DatabaseMissing` when no mirror database exists yet.
pub fn execute(
    db_path: Option<&Path>,
    config_path: Option<&Path>,
    table: Option<&str>,
    limit: u32,
    json: bool,
) -> Result<()> {
    let db_path = resolve_db_path(db_path, config_path)
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))?;

    let store = TargetStore::open_existing(&db_path)?;
    let tables = store.summaries()?;
    let events = store.recent_events(table, Some(limit))?;

    if json {
        let output = StatusOutput {
            database: db_path.display().to_string(),
            tables: &tables,
            events: &events,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("{}", "podio-mirror status".bold());
    println!("Database: {}", db_path.display());
    println!();

    if tables.is_empty() {
        println!("No mirrored tables yet.");
        println!();
        println!("Run one cycle with: podio-mirror once");
    } else {
        println!("{}", "Tables".cyan().bold());
        for summary in &tables {
            println!(
                "  {:<50} {:>8} rows  {}",
                summary.name,
                summary.rows,
                summary
                    .newest_event
                    .as_deref()
                    .map_or_else(|| "-".dimmed().to_string(), str::to_string)
            );
        }
    }

    if !events.is_empty() {
        println!();
        println!("{}", "Recent changes".cyan().bold());
        for event in &events {
            let when = chrono::DateTime::from_timestamp_millis(event.created_at)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            let entity = event
                .entity_id
                .as_deref()
                .map(|id| format!(" #{id}"))
                .unwrap_or_default();
            let detail = event
                .detail
                .as_deref()
                .map(|d| format!(" ({d})"))
                .unwrap_or_default();
            println!(
                "  {}  {:<16} {}{}{}",
                when.dimmed(),
                event.event_type.as_str(),
                event.table_name,
                entity,
                detail.dimmed()
            );
        }
    }

    Ok(())
}
