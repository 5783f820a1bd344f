//! dbmig Command-Line Interface
//!
//! Migrates embedded database directories to the format of the installed
//! engine, and inspects version markers and legacy builds.

mod args;
mod commands;
mod error;

use args::{Cli, Command, VersionCommand};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dbmig=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate(args) => commands::migrate(args),
        Command::Version(VersionCommand::Show(args)) => commands::version_show(args),
        Command::Version(VersionCommand::Set(args)) => commands::version_set(args),
        Command::Resolve(args) => commands::resolve(args),
    };

    match result {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", error::report(&e));
            std::process::exit(1);
        }
    }
}
