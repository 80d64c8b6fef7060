//! Version command implementation.

use crate::error::Result;
use crate::remote::DEFAULT_ENDPOINT;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    sqlite: &'a str,
    endpoint: &'a str,
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };
    let sqlite = rusqlite::version();

    if json {
        let output = VersionOutput {
            version,
            build,
            sqlite,
            endpoint: DEFAULT_ENDPOINT,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("podio-mirror {version} ({build}, sqlite {sqlite})");
    Ok(())
}
