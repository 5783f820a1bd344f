//! Loader and migration configuration.

use crate::marker::VERSION_FILE_NAME;
use crate::url::DEFAULT_URL_PREFIX;
use std::path::PathBuf;
use std::time::Duration;

/// Default archive file name prefix.
pub const DEFAULT_ARCHIVE_PREFIX: &str = "engine";

/// Default archive file extension.
pub const DEFAULT_ARCHIVE_EXTENSION: &str = "zip";

/// Default wait for a legacy host to exit after `shutdown`.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Default suffix of the working copy's base name.
pub const DEFAULT_WORKING_COPY_SUFFIX: &str = "-migration";

/// Legacy engine loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Directory holding the packaged legacy builds.
    pub repository: PathBuf,
    /// Archive file name prefix.
    pub archive_prefix: String,
    /// Archive file extension, without the dot.
    pub archive_extension: String,
    /// How long `unload` waits for the host to exit before killing it.
    pub shutdown_timeout: Duration,
    /// Parent of the private extraction directories. System temp dir if unset.
    pub work_dir: Option<PathBuf>,
}

impl LoaderConfig {
    /// Create a configuration for the given repository directory.
    pub fn new(repository: impl Into<PathBuf>) -> Self {
        Self {
            repository: repository.into(),
            archive_prefix: DEFAULT_ARCHIVE_PREFIX.to_string(),
            archive_extension: DEFAULT_ARCHIVE_EXTENSION.to_string(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            work_dir: None,
        }
    }

    /// Set the archive file name prefix.
    pub fn with_archive_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.archive_prefix = prefix.into();
        self
    }

    /// Set the archive file extension.
    pub fn with_archive_extension(mut self, extension: impl Into<String>) -> Self {
        self.archive_extension = extension.into();
        self
    }

    /// Set the host shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the parent of the private extraction directories.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }
}

/// Migration configuration for one database directory.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Directory holding the database files and the version marker.
    pub database_dir: PathBuf,
    /// Version assumed when the marker is absent.
    pub default_version: Option<u32>,
    /// Marker file name inside `database_dir`.
    pub marker_file_name: String,
    /// Connection URL prefix.
    pub url_prefix: String,
    /// Suffix appended to the database name for the working copy.
    pub working_copy_suffix: String,
}

impl MigrationConfig {
    /// Create a configuration for the given database directory.
    pub fn new(database_dir: impl Into<PathBuf>) -> Self {
        Self {
            database_dir: database_dir.into(),
            default_version: None,
            marker_file_name: VERSION_FILE_NAME.to_string(),
            url_prefix: DEFAULT_URL_PREFIX.to_string(),
            working_copy_suffix: DEFAULT_WORKING_COPY_SUFFIX.to_string(),
        }
    }

    /// Set the version assumed when no marker exists.
    pub fn with_default_version(mut self, version: u32) -> Self {
        self.default_version = Some(version);
        self
    }

    /// Set the marker file name.
    pub fn with_marker_file_name(mut self, name: impl Into<String>) -> Self {
        self.marker_file_name = name.into();
        self
    }

    /// Set the connection URL prefix.
    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = prefix.into();
        self
    }

    /// Set the working copy suffix.
    pub fn with_working_copy_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.working_copy_suffix = suffix.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_defaults() {
        let config = LoaderConfig::new("/opt/legacy");
        assert_eq!(config.repository, PathBuf::from("/opt/legacy"));
        assert_eq!(config.archive_prefix, "engine");
        assert_eq!(config.archive_extension, "zip");
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        assert!(config.work_dir.is_none());
    }

    #[test]
    fn test_loader_builder() {
        let config = LoaderConfig::new("/opt/legacy")
            .with_archive_prefix("h2")
            .with_archive_extension("jar")
            .with_shutdown_timeout(Duration::from_millis(500))
            .with_work_dir("/var/tmp");
        assert_eq!(config.archive_prefix, "h2");
        assert_eq!(config.archive_extension, "jar");
        assert_eq!(config.shutdown_timeout, Duration::from_millis(500));
        assert_eq!(config.work_dir, Some(PathBuf::from("/var/tmp")));
    }

    #[test]
    fn test_migration_defaults() {
        let config = MigrationConfig::new("./data");
        assert_eq!(config.default_version, None);
        assert_eq!(config.marker_file_name, "dbmig-version.txt");
        assert_eq!(config.url_prefix, "jdbc:h2:");
        assert_eq!(config.working_copy_suffix, "-migration");
    }

    #[test]
    fn test_migration_builder() {
        let config = MigrationConfig::new("./data")
            .with_default_version(196)
            .with_marker_file_name("VERSION")
            .with_url_prefix("db:")
            .with_working_copy_suffix(".work");
        assert_eq!(config.default_version, Some(196));
        assert_eq!(config.marker_file_name, "VERSION");
        assert_eq!(config.url_prefix, "db:");
        assert_eq!(config.working_copy_suffix, ".work");
    }
}
