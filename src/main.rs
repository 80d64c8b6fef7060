//! podio-mirror CLI entry point.

use clap::Parser;
use podio_mirror::cli::commands;
use podio_mirror::cli::{Cli, Commands};
use podio_mirror::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // `run` is a daemon: log progress by default
    let default_level = if matches!(cli.command, Commands::Run(_)) {
        1
    } else {
        0
    };
    init_tracing(cli.verbose.max(default_level), cli.quiet);

    let json = cli.json;

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info,reqwest=warn,hyper=warn"),
            2 => EnvFilter::new("debug,rusqlite=info,reqwest=info,hyper=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    match &cli.command {
        Commands::Run(args) => commands::sync::execute_run(&cli.overrides(args)),
        Commands::Once(args) => commands::sync::execute_once(&cli.overrides(args), json),

        Commands::Status { limit, table } => commands::status::execute(
            cli.db.as_deref(),
            cli.config.as_deref(),
            table.as_deref(),
            *limit,
            json,
        ),

        Commands::Config(args) => commands::config::execute(&cli.overrides(args), json),

        Commands::Version => commands::version::execute(json),
        Commands::Completions { shell } => commands::completions::execute(shell),
    }
}
