//! Command implementations.

use crate::args::{MigrateArgs, ResolveArgs, SetArgs, ShowArgs};
use crate::error::CliError;
use dbmig_core::{
    Engine, HostedEngine, LegacyEngineLoader, LegacyRelease, VersionManager, VersionMarkerStore,
};
use std::fmt::Write;
use tracing::{info, warn};

/// Run a migration with the installed engine hosted out of process.
pub fn migrate(args: MigrateArgs) -> Result<String, CliError> {
    let plan = args.into_config();
    let loader = LegacyEngineLoader::new(plan.loader)?;
    let manager = VersionManager::new(plan.migration, loader);

    let engine = HostedEngine::spawn(&plan.engine)?;
    info!(
        build_id = engine.build_id(),
        dir = %manager.database_dir().display(),
        "current engine started"
    );

    let result = manager.migrate_if_needed(
        &engine,
        plan.new_database,
        &plan.url,
        &plan.user,
        &plan.password,
    );
    if let Err(e) = engine.shutdown(plan.shutdown_timeout) {
        warn!(error = %e, "current engine did not shut down cleanly");
    }

    Ok(result?.to_string())
}

/// Print the recorded version.
pub fn version_show(args: ShowArgs) -> Result<String, CliError> {
    let store = VersionMarkerStore::new(&args.database_dir);
    let version = store.current_version(args.default_version)?;
    if store.exists() {
        Ok(version.to_string())
    } else {
        Ok(format!("{} (default, no marker at {})", version, store.path().display()))
    }
}

/// Overwrite the recorded version.
pub fn version_set(args: SetArgs) -> Result<String, CliError> {
    let store = VersionMarkerStore::new(&args.database_dir);
    store.write_version(args.version)?;
    Ok(format!("version marker set to {}", args.version))
}

/// Describe the legacy build a version resolves to.
pub fn resolve(args: ResolveArgs) -> Result<String, CliError> {
    let release = LegacyRelease::resolve(args.version, args.current_build)?;
    let file_name = release.archive_file_name(&args.archive_prefix, &args.archive_extension);

    let mut out = String::new();
    let _ = writeln!(out, "release line:  {}", release.line);
    let _ = writeln!(out, "full version:  {}", release.full_version());
    let _ = writeln!(
        out,
        "script dialect: {}",
        if release.needs_legacy_script_dialect() { "1.x" } else { "current" }
    );
    match args.legacy_repository {
        Some(repository) => {
            let path = repository.join(&file_name);
            let state = if path.is_file() { "present" } else { "missing" };
            let _ = write!(out, "archive:       {} ({})", path.display(), state);
        }
        None => {
            let _ = write!(out, "archive:       {}", file_name);
        }
    }
    Ok(out)
}
