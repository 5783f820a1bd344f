//! Version marker store.
//!
//! A small text file next to the database records the engine build that last
//! wrote it, as a decimal integer.

use crate::error::MigrationError;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default marker file name.
pub const VERSION_FILE_NAME: &str = "dbmig-version.txt";

/// Reads and writes the version marker of one database directory.
#[derive(Debug, Clone)]
pub struct VersionMarkerStore {
    directory: PathBuf,
    file_name: String,
}

impl VersionMarkerStore {
    /// Create a store using the default file name.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            file_name: VERSION_FILE_NAME.to_string(),
        }
    }

    /// Use a different marker file name.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Full path of the marker file.
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    /// Whether the marker file is present.
    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    /// Read the recorded version, if the marker exists.
    pub fn read_version(&self) -> Result<Option<u32>, MigrationError> {
        let path = self.path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(MigrationError::MarkerUnreadable { path, source }),
        };

        let trimmed = contents.trim_matches(|c: char| c.is_ascii_whitespace());
        match trimmed.parse::<u32>() {
            Ok(version) => Ok(Some(version)),
            Err(source) => Err(MigrationError::InvalidVersionMarker {
                path,
                contents,
                source,
            }),
        }
    }

    /// The recorded version, or `default` when no marker exists.
    pub fn current_version(&self, default: Option<u32>) -> Result<u32, MigrationError> {
        match self.read_version()? {
            Some(version) => Ok(version),
            None => match default {
                Some(version) => {
                    debug!(version, path = %self.path().display(), "no version marker, using default");
                    Ok(version)
                }
                None => Err(MigrationError::MissingVersionMarker { path: self.path() }),
            },
        }
    }

    /// Record `version`, replacing the marker atomically.
    pub fn write_version(&self, version: u32) -> Result<(), MigrationError> {
        let path = self.path();
        self.write_atomic(&path, version)
            .map_err(|source| MigrationError::VersionMarkerWriteFailed { path, source })?;
        debug!(version, path = %self.path().display(), "version marker written");
        Ok(())
    }

    fn write_atomic(&self, path: &Path, version: u32) -> io::Result<()> {
        let mut file = tempfile::Builder::new()
            .prefix(".dbmig-version")
            .tempfile_in(&self.directory)?;
        file.write_all(version.to_string().as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}
