//! CLI error type.

use dbmig_core::{EngineError, MigrationError};
use thiserror::Error;

/// Errors reported by a CLI command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("current engine: {0}")]
    Engine(#[from] EngineError),
}

/// Render `error` followed by each cause on its own `caused by:` line.
///
/// Causes whose text already appears in the message above them are skipped.
pub fn report(error: &dyn std::error::Error) -> String {
    let mut out = error.to_string();
    let mut previous = out.clone();
    let mut source = error.source();
    while let Some(cause) = source {
        let message = cause.to_string();
        if !previous.contains(&message) {
            out.push_str("\n  caused by: ");
            out.push_str(&message);
        }
        previous = message;
        source = cause.source();
    }
    out
}
