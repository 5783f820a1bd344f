//! Core error types.

use crate::session::InvalidTransition;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by an engine, or by the transport to a hosted engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error talking to an engine host.
    #[error("protocol error: {0}")]
    Protocol(#[from] dbmig_proto::Error),

    /// The engine rejected a request.
    #[error("engine error: {message}")]
    Remote {
        /// Message reported by the engine.
        message: String,
    },

    /// The engine host is gone.
    #[error("engine host exited: {0}")]
    HostExited(String),

    /// The connection URL could not be understood.
    #[error("invalid connection url: {0}")]
    InvalidUrl(String),

    /// No connection is open.
    #[error("no open connection")]
    NotConnected,
}

impl EngineError {
    /// Create an engine-reported error.
    pub fn remote(message: impl Into<String>) -> Self {
        EngineError::Remote {
            message: message.into(),
        }
    }
}

/// Migration error taxonomy, without the causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationErrorKind {
    /// No marker and no configured default.
    MissingVersionMarker,
    /// The marker exists but cannot be read or parsed.
    InvalidVersionMarker,
    /// The version is outside every known release line.
    UnsupportedVersion,
    /// No usable packaged build for the required version.
    LegacyBuildUnavailable,
    /// Exporting with the legacy build failed.
    DumpFailed,
    /// Replaying the script with the current build failed.
    ReloadFailed,
    /// Restoring the backup after a failed reload failed.
    RollbackFailed,
    /// Persisting the new marker failed.
    VersionMarkerWriteFailed,
    /// Invalid configuration or connection URL.
    Configuration,
}

impl std::fmt::Display for MigrationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationErrorKind::MissingVersionMarker => write!(f, "missing_version_marker"),
            MigrationErrorKind::InvalidVersionMarker => write!(f, "invalid_version_marker"),
            MigrationErrorKind::UnsupportedVersion => write!(f, "unsupported_version"),
            MigrationErrorKind::LegacyBuildUnavailable => write!(f, "legacy_build_unavailable"),
            MigrationErrorKind::DumpFailed => write!(f, "dump_failed"),
            MigrationErrorKind::ReloadFailed => write!(f, "reload_failed"),
            MigrationErrorKind::RollbackFailed => write!(f, "rollback_failed"),
            MigrationErrorKind::VersionMarkerWriteFailed => write!(f, "version_marker_write_failed"),
            MigrationErrorKind::Configuration => write!(f, "configuration"),
        }
    }
}

/// Migration errors.
///
/// Every variant is fatal to the invocation that produced it; nothing is
/// retried internally.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The marker file is absent and no default version was configured.
    #[error("version marker {path} is missing and no default version has been configured")]
    MissingVersionMarker {
        /// Expected marker location.
        path: PathBuf,
    },

    /// The marker file could not be read.
    #[error("failed to read version marker {path}: {source}")]
    MarkerUnreadable {
        /// Marker location.
        path: PathBuf,
        /// Underlying read error.
        #[source]
        source: std::io::Error,
    },

    /// The marker file does not contain a decimal version.
    #[error("version marker {path} does not contain a version number: {contents:?}")]
    InvalidVersionMarker {
        /// Marker location.
        path: PathBuf,
        /// What the file contained.
        contents: String,
        /// Parse error.
        #[source]
        source: std::num::ParseIntError,
    },

    /// The version is outside every known release line.
    #[error("unsupported engine version {version}: {reason}")]
    UnsupportedVersion {
        /// Requested version.
        version: u32,
        /// Which rule rejected it.
        reason: String,
    },

    /// No usable packaged build exists for the version.
    #[error("no usable legacy build for version {version} at {path}: {reason}")]
    LegacyBuildUnavailable {
        /// Requested version.
        version: u32,
        /// Archive location.
        path: PathBuf,
        /// Why the build cannot be used.
        reason: String,
    },

    /// Exporting the working copy with the legacy build failed.
    #[error("dump with legacy engine {version} failed: {source}")]
    DumpFailed {
        /// Legacy engine version.
        version: u32,
        /// Underlying failure.
        #[source]
        source: EngineError,
    },

    /// Replaying the script with the current engine failed; the live files
    /// were restored.
    #[error("reload with the current engine failed, original files restored: {source}")]
    ReloadFailed {
        /// Underlying failure.
        #[source]
        source: EngineError,
    },

    /// Restoring the backup after a failed reload failed. The live files are
    /// left under their backup names and need manual recovery.
    #[error(
        "rollback of {base} failed, manual recovery required (reload error: {reload}): {source}"
    )]
    RollbackFailed {
        /// Database base path.
        base: PathBuf,
        /// The reload failure that triggered the rollback.
        reload: String,
        /// Why the restore failed.
        #[source]
        source: std::io::Error,
    },

    /// The new marker could not be persisted.
    #[error("failed to write version marker {path}: {source}")]
    VersionMarkerWriteFailed {
        /// Marker location.
        path: PathBuf,
        /// Underlying write error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The session was driven through a transition its state graph forbids.
    #[error(transparent)]
    InvalidState(#[from] InvalidTransition),
}

impl MigrationError {
    /// The taxonomy value of this error.
    pub fn kind(&self) -> MigrationErrorKind {
        match self {
            MigrationError::MissingVersionMarker { .. } => MigrationErrorKind::MissingVersionMarker,
            MigrationError::MarkerUnreadable { .. } | MigrationError::InvalidVersionMarker { .. } => {
                MigrationErrorKind::InvalidVersionMarker
            }
            MigrationError::UnsupportedVersion { .. } => MigrationErrorKind::UnsupportedVersion,
            MigrationError::LegacyBuildUnavailable { .. } => {
                MigrationErrorKind::LegacyBuildUnavailable
            }
            MigrationError::DumpFailed { .. } => MigrationErrorKind::DumpFailed,
            MigrationError::ReloadFailed { .. } => MigrationErrorKind::ReloadFailed,
            MigrationError::RollbackFailed { .. } => MigrationErrorKind::RollbackFailed,
            MigrationError::VersionMarkerWriteFailed { .. } => {
                MigrationErrorKind::VersionMarkerWriteFailed
            }
            MigrationError::Config(_) | MigrationError::InvalidState(_) => {
                MigrationErrorKind::Configuration
            }
        }
    }

    /// Whether re-running the migration is known to be safe.
    ///
    /// False only when live files may have been left under their backup names.
    pub fn is_retry_safe(&self) -> bool {
        self.kind() != MigrationErrorKind::RollbackFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_kind_mapping() {
        let err = MigrationError::MissingVersionMarker {
            path: PathBuf::from("/data/dbmig-version.txt"),
        };
        assert_eq!(err.kind(), MigrationErrorKind::MissingVersionMarker);

        let err = MigrationError::DumpFailed {
            version: 196,
            source: EngineError::remote("table locked"),
        };
        assert_eq!(err.kind(), MigrationErrorKind::DumpFailed);
        assert!(err.is_retry_safe());

        let err = MigrationError::RollbackFailed {
            base: PathBuf::from("/data/app"),
            reload: "syntax error".to_string(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.kind(), MigrationErrorKind::RollbackFailed);
        assert!(!err.is_retry_safe());
    }

    #[test]
    fn test_rollback_failure_keeps_both_causes() {
        let err = MigrationError::RollbackFailed {
            base: PathBuf::from("/data/app"),
            reload: "syntax error in script".to_string(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let message = err.to_string();
        assert!(message.contains("syntax error in script"));
        assert!(message.contains("denied"));
        assert!(message.contains("manual recovery"));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(MigrationErrorKind::DumpFailed.to_string(), "dump_failed");
        assert_eq!(
            MigrationErrorKind::LegacyBuildUnavailable.to_string(),
            "legacy_build_unavailable"
        );
    }

    #[test]
    fn test_invalid_marker_source() {
        let source = "abc".parse::<u32>().unwrap_err();
        let err = MigrationError::InvalidVersionMarker {
            path: PathBuf::from("marker"),
            contents: "abc".to_string(),
            source,
        };
        assert_eq!(err.kind(), MigrationErrorKind::InvalidVersionMarker);
        assert!(std::error::Error::source(&err).is_some());
    }
}
