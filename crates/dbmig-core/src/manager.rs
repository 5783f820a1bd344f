//! Version manager: decides whether a database needs migrating and records
//! the engine build once it no longer does.

use crate::config::MigrationConfig;
use crate::engine::{ConnectionProperties, Engine};
use crate::error::MigrationError;
use crate::legacy::LegacyEngineLoader;
use crate::marker::VersionMarkerStore;
use crate::session::{MigrationOutcome, MigrationSession, MigrationState};
use crate::upgrade::Upgrader;
use std::path::Path;
use tracing::{debug, error, info};

/// Keeps one database directory in the format of the installed engine.
#[derive(Debug, Clone)]
pub struct VersionManager {
    config: MigrationConfig,
    marker: VersionMarkerStore,
    upgrader: Upgrader,
}

impl VersionManager {
    /// Create a manager for `config.database_dir`.
    pub fn new(config: MigrationConfig, loader: LegacyEngineLoader) -> Self {
        let marker = VersionMarkerStore::new(&config.database_dir)
            .with_file_name(config.marker_file_name.clone());
        let upgrader = Upgrader::from_config(loader, &config);
        Self {
            config,
            marker,
            upgrader,
        }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn database_dir(&self) -> &Path {
        &self.config.database_dir
    }

    pub fn marker(&self) -> &VersionMarkerStore {
        &self.marker
    }

    /// Version recorded for the database, or the configured default.
    pub fn current_version(&self) -> Result<u32, MigrationError> {
        self.marker.current_version(self.config.default_version)
    }

    /// Bring the database at `url` to `engine`'s format if it is not there
    /// already, then record `engine.build_id()`.
    ///
    /// With `is_new_database` the version check is skipped and only the
    /// marker is written.
    pub fn migrate_if_needed(
        &self,
        engine: &dyn Engine,
        is_new_database: bool,
        url: &str,
        user: &str,
        password: &str,
    ) -> Result<MigrationOutcome, MigrationError> {
        let properties = ConnectionProperties::credentials(user, password);
        let mut session = MigrationSession::new(engine.build_id());
        self.run(&mut session, engine, is_new_database, url, &properties)
    }

    /// Drive `session` to a terminal state.
    pub fn run(
        &self,
        session: &mut MigrationSession,
        engine: &dyn Engine,
        is_new_database: bool,
        url: &str,
        properties: &ConnectionProperties,
    ) -> Result<MigrationOutcome, MigrationError> {
        let result = self.run_session(session, engine, is_new_database, url, properties);
        match &result {
            Ok(outcome) => info!(
                outcome = %outcome,
                elapsed_ms = session.elapsed_ms(),
                "version check finished"
            ),
            Err(e) => {
                let state = session.state();
                session.fail(e);
                error!(kind = %e.kind(), error = %e, %state, "migration failed");
            }
        }
        result
    }

    fn run_session(
        &self,
        session: &mut MigrationSession,
        engine: &dyn Engine,
        is_new_database: bool,
        url: &str,
        properties: &ConnectionProperties,
    ) -> Result<MigrationOutcome, MigrationError> {
        let target = engine.build_id();

        let outcome = if is_new_database {
            debug!(version = target, "new database, skipping version check");
            session.advance(MigrationState::NoOpComplete)?;
            MigrationOutcome::NewDatabase { version: target }
        } else {
            let version = self.current_version()?;
            session.set_from_version(version);
            if version == target {
                debug!(version, "database format matches current engine");
                session.advance(MigrationState::NoOpComplete)?;
                MigrationOutcome::UpToDate { version }
            } else {
                info!(
                    from = version,
                    to = target,
                    dir = %self.config.database_dir.display(),
                    "migrating database"
                );
                if self.upgrader.upgrade(engine, url, properties, version, session)? {
                    MigrationOutcome::Migrated {
                        from: version,
                        to: target,
                    }
                } else {
                    MigrationOutcome::NotApplicable { version: target }
                }
            }
        };

        if session.state() == MigrationState::NoOpComplete {
            session.advance(MigrationState::PersistingMarker)?;
        }
        self.marker.write_version(target)?;
        session.complete(outcome)?;
        Ok(outcome)
    }
}
