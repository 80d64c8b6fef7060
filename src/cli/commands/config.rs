//! Config command implementation.

use crate::config::{default_config_path, resolve_partial, Overrides, DEFAULT_INTERVAL_SECS};
use crate::error::Result;
use crate::remote::DEFAULT_ENDPOINT;
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct ConfigOutput {
    config_file: Option<String>,
    resolved: crate::config::PartialConfig,
    /// First missing setting, if the configuration cannot run yet.
    missing: Option<String>,
}

/// Show the merged configuration with secrets masked.
///
/// An incomplete configuration is reported, not treated as an error.
///
/// # Errors
///
/// Returns an error if the config file or an environment variable is malformed.
pub fn execute(overrides: &Overrides, json: bool) -> Result<()> {
    let partial = resolve_partial(overrides)?;
    let missing = match partial.clone().into_config() {
        Ok(_) => None,
        Err(crate::Error::NotConfigured(name)) => Some(name),
        Err(e) => return Err(e),
    };

    let config_file = overrides
        .config_path
        .clone()
        .or_else(default_config_path)
        .map(|p| p.display().to_string());

    let output = ConfigOutput {
        config_file,
        resolved: partial.masked(),
        missing,
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    let not_set = || "(not set)".dimmed().to_string();
    let resolved = &output.resolved;

    println!("{}", "podio-mirror configuration".bold());
    println!(
        "Config file:   {}",
        output.config_file.clone().unwrap_or_else(not_set)
    );
    println!();
    println!("Client id:     {}", resolved.client_id.clone().unwrap_or_else(not_set));
    println!("Client secret: {}", resolved.client_secret.clone().unwrap_or_else(not_set));
    println!("Username:      {}", resolved.username.clone().unwrap_or_else(not_set));
    println!("Password:      {}", resolved.password.clone().unwrap_or_else(not_set));
    println!(
        "Applications:  {}",
        resolved
            .app_ids
            .as_ref()
            .filter(|ids| !ids.is_empty())
            .map_or_else(not_set, |ids| {
                ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
            })
    );
    println!(
        "Interval:      {}s",
        resolved.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS)
    );
    println!(
        "Database:      {}",
        resolved
            .db_path
            .as_ref()
            .map(|p| p.display().to_string())
            .or_else(|| crate::config::default_db_path().map(|p| p.display().to_string()))
            .unwrap_or_else(not_set)
    );
    println!(
        "Endpoint:      {}",
        resolved.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    );

    println!();
    match &output.missing {
        Some(name) => println!("{} {name} is not set", "Incomplete:".yellow().bold()),
        None => println!("{}", "Ready to run.".green()),
    }

    Ok(())
}
