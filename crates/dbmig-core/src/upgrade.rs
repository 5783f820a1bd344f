//! Dump-and-reload upgrade of one database.
//!
//! The live files are never opened by the legacy engine. It reads a copy, the
//! live set is moved aside, and the current engine rebuilds the database from
//! the exported script. A failed reload puts the moved-aside files back.

use crate::config::{MigrationConfig, DEFAULT_WORKING_COPY_SUFFIX};
use crate::engine::{ConnectionProperties, Engine};
use crate::error::{EngineError, MigrationError};
use crate::fileset::{remove_file_logged, Backup, DatabaseFileSet};
use crate::legacy::{LegacyEngineLoader, LegacyRelease};
use crate::session::{MigrationSession, MigrationState};
use crate::url::{quote_sql_string, ConnectionInfo, DEFAULT_URL_PREFIX};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Extension of the exported script, appended to the database name.
pub const SCRIPT_SUFFIX: &str = ".script.sql";

/// URL settings carried from the live URL to the dump URL.
const DUMP_SETTINGS: [&str; 3] = ["FILE_LOCK", "MV_STORE", "CIPHER"];

/// Runs the dump-and-reload procedure.
#[derive(Debug, Clone)]
pub struct Upgrader {
    loader: LegacyEngineLoader,
    url_prefix: String,
    working_copy_suffix: String,
}

impl Upgrader {
    /// Create an upgrader with default URL prefix and working copy suffix.
    pub fn new(loader: LegacyEngineLoader) -> Self {
        Self {
            loader,
            url_prefix: DEFAULT_URL_PREFIX.to_string(),
            working_copy_suffix: DEFAULT_WORKING_COPY_SUFFIX.to_string(),
        }
    }

    /// Create an upgrader using the settings of a migration config.
    pub fn from_config(loader: LegacyEngineLoader, config: &MigrationConfig) -> Self {
        Self {
            loader,
            url_prefix: config.url_prefix.clone(),
            working_copy_suffix: config.working_copy_suffix.clone(),
        }
    }

    pub fn loader(&self) -> &LegacyEngineLoader {
        &self.loader
    }

    /// Move the database at `url` from `version` to `engine`'s build.
    ///
    /// Returns `false` without touching anything when the URL does not name
    /// a file database.
    pub fn upgrade(
        &self,
        engine: &dyn Engine,
        url: &str,
        properties: &ConnectionProperties,
        version: u32,
        session: &mut MigrationSession,
    ) -> Result<bool, MigrationError> {
        let info = ConnectionInfo::parse(url, &self.url_prefix, properties)
            .map_err(|e| MigrationError::Config(e.to_string()))?;
        if !info.is_persistent() || info.is_remote() {
            info!(url, "database is not file based, nothing to migrate");
            session.advance(MigrationState::NoOpComplete)?;
            return Ok(false);
        }
        let name = info
            .database_path()
            .map_err(|e| MigrationError::Config(e.to_string()))?
            .to_string_lossy()
            .into_owned();
        // Fail on unknown versions before any file is copied.
        let release = LegacyRelease::resolve(version, engine.build_id())?;

        session.advance(MigrationState::Preparing)?;
        let working_name = format!("{}{}", name, self.working_copy_suffix);
        let live = DatabaseFileSet::new(&name);
        let working = DatabaseFileSet::new(&working_name);
        let script = PathBuf::from(format!("{}{}", name, SCRIPT_SUFFIX));
        session.set_files(live.clone(), working.clone(), script.clone());

        // Leftovers of an interrupted run must not leak into the copy.
        working.delete();
        if let Err(e) = live.copy_to(&working) {
            cleanup(&working, &script);
            return Err(MigrationError::DumpFailed {
                version,
                source: e.into(),
            });
        }

        session.advance(MigrationState::Dumping)?;
        let script_suffix = match info.property("CIPHER") {
            Some(_) => format!(" CIPHER AES PASSWORD '{}' --hide--", Uuid::new_v4()),
            None => String::new(),
        };
        let dump_url = self.dump_url(&info, &working_name);
        if let Err(e) = self.dump(&release, engine.build_id(), &dump_url, properties, &script, &script_suffix) {
            cleanup(&working, &script);
            return Err(e);
        }

        session.advance(MigrationState::SwappingFiles)?;
        let backup = match live.backup_rename() {
            Ok(backup) => backup,
            Err(e) => {
                cleanup(&working, &script);
                return Err(MigrationError::ReloadFailed { source: e.into() });
            }
        };
        session.set_backup(backup.clone());

        session.advance(MigrationState::Reloading)?;
        let mut command = format!(
            "RUNSCRIPT FROM {}{}",
            quote_sql_string(&script.to_string_lossy()),
            script_suffix
        );
        if release.needs_legacy_script_dialect() {
            command.push_str(" FROM_1X");
        }
        let reloaded = run_statement(engine, url, properties, &command);

        let result = match reloaded {
            Ok(()) => {
                session.advance(MigrationState::PersistingMarker)?;
                info!(from = version, to = engine.build_id(), "database reloaded with current engine");
                Ok(true)
            }
            Err(reload) => {
                session.advance(MigrationState::RollingBack)?;
                warn!(error = %reload, "reload failed, restoring original files");
                Err(rollback(&live, &backup, reload))
            }
        };
        cleanup(&working, &script);
        result
    }

    fn dump_url(&self, info: &ConnectionInfo, working_name: &str) -> String {
        let mut url = format!("{}{};ACCESS_MODE_DATA=r", self.url_prefix, working_name);
        for key in DUMP_SETTINGS {
            if let Some(value) = info.property(key) {
                url.push_str(&format!(";{}={}", key, value));
            }
        }
        url
    }

    fn dump(
        &self,
        release: &LegacyRelease,
        current_build_id: u32,
        url: &str,
        properties: &ConnectionProperties,
        script: &Path,
        script_suffix: &str,
    ) -> Result<(), MigrationError> {
        let legacy = self.loader.load(release.version, current_build_id)?;
        let command = format!(
            "SCRIPT TO {}{}",
            quote_sql_string(&script.to_string_lossy()),
            script_suffix
        );
        debug!(release = %release, url, "exporting working copy");
        let exported = run_statement(&legacy, url, properties, &command);

        if let Err(e) = legacy.unload() {
            warn!(release = %release, error = %e, "legacy engine did not shut down cleanly");
        }
        exported.map_err(|source| MigrationError::DumpFailed {
            version: release.version,
            source,
        })
    }
}

fn run_statement(
    engine: &dyn Engine,
    url: &str,
    properties: &ConnectionProperties,
    sql: &str,
) -> Result<(), EngineError> {
    let mut connection = engine.connect(url, properties)?;
    connection.execute(sql)?;
    Ok(())
}

fn rollback(live: &DatabaseFileSet, backup: &Backup, reload: EngineError) -> MigrationError {
    match live.restore_rename(backup) {
        Ok(_) => MigrationError::ReloadFailed { source: reload },
        Err(source) => {
            error!(
                base = %live.base().display(),
                reload_error = %reload,
                error = %source,
                "rollback failed, database files left under backup names"
            );
            MigrationError::RollbackFailed {
                base: live.base().to_path_buf(),
                reload: reload.to_string(),
                source,
            }
        }
    }
}

fn cleanup(working: &DatabaseFileSet, script: &Path) {
    remove_file_logged(script);
    let failed = working.delete();
    if failed > 0 {
        warn!(base = %working.base().display(), failed, "working copy not fully removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoaderConfig;
    use tempfile::TempDir;

    fn upgrader(dir: &TempDir) -> Upgrader {
        Upgrader::new(LegacyEngineLoader::new(LoaderConfig::new(dir.path())).unwrap())
    }

    #[test]
    fn test_dump_url_carries_settings() {
        let dir = TempDir::new().unwrap();
        let props = ConnectionProperties::new().with("MV_STORE", "TRUE");
        let info = ConnectionInfo::parse("jdbc:h2:/db/app;CIPHER=AES;IFEXISTS=TRUE", "jdbc:h2:", &props)
            .unwrap();
        let url = upgrader(&dir).dump_url(&info, "/db/app-migration");
        assert_eq!(
            url,
            "jdbc:h2:/db/app-migration;ACCESS_MODE_DATA=r;MV_STORE=TRUE;CIPHER=AES"
        );
    }

    #[test]
    fn test_plain_dump_url() {
        let dir = TempDir::new().unwrap();
        let info = ConnectionInfo::parse("jdbc:h2:/db/app", "jdbc:h2:", &ConnectionProperties::new())
            .unwrap();
        assert_eq!(
            upgrader(&dir).dump_url(&info, "/db/app-migration"),
            "jdbc:h2:/db/app-migration;ACCESS_MODE_DATA=r"
        );
    }
}
