//! Migration session state.

use crate::error::{MigrationError, MigrationErrorKind};
use crate::fileset::{Backup, DatabaseFileSet};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Migration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationState {
    /// Reading the version marker.
    CheckingVersion,
    /// Nothing to migrate.
    NoOpComplete,
    /// Copying the live files to the working copy.
    Preparing,
    /// Exporting the working copy with the legacy engine.
    Dumping,
    /// Moving the live files to their backup names.
    SwappingFiles,
    /// Replaying the script with the current engine.
    Reloading,
    /// Restoring the backup after a failed reload.
    RollingBack,
    /// Writing the new version marker.
    PersistingMarker,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
}

impl MigrationState {
    /// Whether the session can move from `self` to `next`.
    ///
    /// Any non-terminal state may fail.
    pub fn can_transition_to(self, next: MigrationState) -> bool {
        use MigrationState::*;

        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (CheckingVersion, NoOpComplete)
                | (CheckingVersion, Preparing)
                | (NoOpComplete, PersistingMarker)
                | (Preparing, Dumping)
                | (Dumping, SwappingFiles)
                | (SwappingFiles, Reloading)
                | (Reloading, PersistingMarker)
                | (Reloading, RollingBack)
                | (PersistingMarker, Done)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, MigrationState::Done | MigrationState::Failed)
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationState::CheckingVersion => "checking_version",
            MigrationState::NoOpComplete => "no_op_complete",
            MigrationState::Preparing => "preparing",
            MigrationState::Dumping => "dumping",
            MigrationState::SwappingFiles => "swapping_files",
            MigrationState::Reloading => "reloading",
            MigrationState::RollingBack => "rolling_back",
            MigrationState::PersistingMarker => "persisting_marker",
            MigrationState::Done => "done",
            MigrationState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a successful session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Fresh database; the marker was initialised.
    NewDatabase { version: u32 },
    /// Files already match the current engine.
    UpToDate { version: u32 },
    /// Files were moved from one build to another.
    Migrated { from: u32, to: u32 },
    /// In-memory or remote database; nothing on disk to migrate.
    NotApplicable { version: u32 },
}

impl fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationOutcome::NewDatabase { version } => {
                write!(f, "new database, version marker set to {}", version)
            }
            MigrationOutcome::UpToDate { version } => write!(f, "up to date at {}", version),
            MigrationOutcome::Migrated { from, to } => write!(f, "migrated from {} to {}", from, to),
            MigrationOutcome::NotApplicable { version } => write!(
                f,
                "not a file database, version marker set to {}",
                version
            ),
        }
    }
}

/// A transition the state graph does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: MigrationState,
    pub to: MigrationState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid migration state transition {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// One run of the migration state machine.
#[derive(Debug, Clone)]
pub struct MigrationSession {
    from_version: Option<u32>,
    target_version: u32,
    state: MigrationState,
    history: Vec<MigrationState>,
    live: Option<DatabaseFileSet>,
    working: Option<DatabaseFileSet>,
    script: Option<PathBuf>,
    backup: Option<Backup>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    outcome: Option<MigrationOutcome>,
    error_kind: Option<MigrationErrorKind>,
}

impl MigrationSession {
    /// Start a session migrating towards `target_version`.
    pub fn new(target_version: u32) -> Self {
        Self {
            from_version: None,
            target_version,
            state: MigrationState::CheckingVersion,
            history: vec![MigrationState::CheckingVersion],
            live: None,
            working: None,
            script: None,
            backup: None,
            started_at: Utc::now(),
            finished_at: None,
            outcome: None,
            error_kind: None,
        }
    }

    /// Move to `next`.
    pub fn advance(&mut self, next: MigrationState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(from = %self.state, to = %next, "migration state");
        self.state = next;
        self.history.push(next);
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Finish successfully.
    pub fn complete(&mut self, outcome: MigrationOutcome) -> Result<(), InvalidTransition> {
        self.advance(MigrationState::Done)?;
        self.outcome = Some(outcome);
        Ok(())
    }

    /// Finish with `error`. A session that already finished is left as is.
    pub fn fail(&mut self, error: &MigrationError) {
        if self.advance(MigrationState::Failed).is_ok() {
            self.error_kind = Some(error.kind());
        }
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// Every state visited, in order.
    pub fn history(&self) -> &[MigrationState] {
        &self.history
    }

    pub fn from_version(&self) -> Option<u32> {
        self.from_version
    }

    pub fn set_from_version(&mut self, version: u32) {
        self.from_version = Some(version);
    }

    pub fn target_version(&self) -> u32 {
        self.target_version
    }

    /// Record the files this session works on.
    pub fn set_files(&mut self, live: DatabaseFileSet, working: DatabaseFileSet, script: PathBuf) {
        self.live = Some(live);
        self.working = Some(working);
        self.script = Some(script);
    }

    pub fn live_files(&self) -> Option<&DatabaseFileSet> {
        self.live.as_ref()
    }

    pub fn working_copy(&self) -> Option<&DatabaseFileSet> {
        self.working.as_ref()
    }

    /// Record the live files moved aside for the reload.
    pub fn set_backup(&mut self, backup: Backup) {
        self.backup = Some(backup);
    }

    pub fn backup(&self) -> Option<&Backup> {
        self.backup.as_ref()
    }

    /// Backup names of the live files moved aside by this session.
    pub fn backup_files(&self) -> Vec<PathBuf> {
        self.backup.as_ref().map(Backup::files).unwrap_or_default()
    }

    pub fn script_path(&self) -> Option<&Path> {
        self.script.as_deref()
    }

    pub fn outcome(&self) -> Option<MigrationOutcome> {
        self.outcome
    }

    pub fn error_kind(&self) -> Option<MigrationErrorKind> {
        self.error_kind
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Session duration in milliseconds, up to now if still running.
    pub fn elapsed_ms(&self) -> i64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds()
    }
}
