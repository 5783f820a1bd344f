//! Loading packaged legacy builds.

use super::archive::EngineArchive;
use super::release::LegacyRelease;
use crate::config::LoaderConfig;
use crate::engine::{Connection, ConnectionProperties, Driver, Engine};
use crate::error::{EngineError, MigrationError};
use crate::hosted::{HostCommand, HostedEngine};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Extension of the optional checksum sidecar next to an archive.
pub const CHECKSUM_EXTENSION: &str = "sha256";

/// Finds, verifies and starts packaged legacy builds.
#[derive(Debug, Clone)]
pub struct LegacyEngineLoader {
    config: LoaderConfig,
}

impl LegacyEngineLoader {
    /// Create a loader. The repository directory must exist.
    pub fn new(config: LoaderConfig) -> Result<Self, MigrationError> {
        if !config.repository.is_dir() {
            return Err(MigrationError::Config(format!(
                "legacy engine repository {} is not a directory",
                config.repository.display()
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Archive location for a release.
    pub fn archive_path(&self, release: &LegacyRelease) -> PathBuf {
        self.config.repository.join(
            release.archive_file_name(&self.config.archive_prefix, &self.config.archive_extension),
        )
    }

    /// Load the build that wrote `version` files.
    ///
    /// The returned engine must be released with [`LegacyEngine::unload`].
    pub fn load(&self, version: u32, current_build_id: u32) -> Result<LegacyEngine, MigrationError> {
        let release = LegacyRelease::resolve(version, current_build_id)?;
        let path = self.archive_path(&release);
        let unavailable = |reason: String| MigrationError::LegacyBuildUnavailable {
            version,
            path: path.clone(),
            reason,
        };

        let bytes = fs::read(&path).map_err(|e| unavailable(e.to_string()))?;
        verify_checksum(&path, &bytes).map_err(&unavailable)?;

        let archive = EngineArchive::read(&bytes, release.expected_entry_count())
            .map_err(|e| unavailable(e.to_string()))?;
        let manifest = archive.manifest().map_err(|e| unavailable(e.to_string()))?;
        debug!(
            archive = %path.display(),
            entries = archive.len(),
            launcher = %manifest.launcher,
            "legacy archive unpacked"
        );

        let context = self
            .private_dir(&release)
            .map_err(|e| unavailable(format!("cannot create private directory: {}", e)))?;
        archive
            .materialize(context.path(), &manifest.launcher)
            .map_err(|e| unavailable(e.to_string()))?;

        let command = HostCommand::new(context.path().join(&manifest.launcher))
            .with_args(manifest.args)
            .with_working_dir(context.path())
            .with_clean_env();
        let host = HostedEngine::spawn(&command)
            .map_err(|e| unavailable(format!("engine host failed to start: {}", e)))?;

        if host.build_id() != version {
            return Err(unavailable(format!(
                "archive contains build {}",
                host.build_id()
            )));
        }

        info!(
            version,
            release = %release,
            pid = host.pid(),
            "legacy engine loaded"
        );
        Ok(LegacyEngine {
            release,
            host: Some(host),
            context: Some(context),
            shutdown_timeout: self.config.shutdown_timeout,
        })
    }

    fn private_dir(&self, release: &LegacyRelease) -> io::Result<TempDir> {
        let prefix = format!("dbmig-legacy-{}-", release.full_version());
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        match &self.config.work_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
    }
}

/// Check `<archive>.sha256` when it exists.
fn verify_checksum(archive: &Path, bytes: &[u8]) -> Result<(), String> {
    let mut sidecar = archive.as_os_str().to_owned();
    sidecar.push(".");
    sidecar.push(CHECKSUM_EXTENSION);
    let sidecar = PathBuf::from(sidecar);

    let expected = match fs::read_to_string(&sidecar) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(format!("cannot read {}: {}", sidecar.display(), e)),
    };
    let expected = expected
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let actual = hex::encode(Sha256::digest(bytes));
    if expected != actual {
        return Err(format!(
            "checksum mismatch: {} lists {}, archive is {}",
            sidecar.display(),
            expected,
            actual
        ));
    }
    Ok(())
}

/// A loaded legacy build.
///
/// Owns the host process and the private directory the build was unpacked
/// into. Dropping it without [`unload`](Self::unload) kills the host.
pub struct LegacyEngine {
    release: LegacyRelease,
    host: Option<HostedEngine>,
    context: Option<TempDir>,
    shutdown_timeout: std::time::Duration,
}

impl LegacyEngine {
    pub fn release(&self) -> &LegacyRelease {
        &self.release
    }

    /// Private directory holding the unpacked build.
    pub fn context_dir(&self) -> Option<&Path> {
        self.context.as_ref().map(TempDir::path)
    }

    /// Shut the host down and delete the private directory.
    pub fn unload(mut self) -> Result<(), EngineError> {
        let result = match self.host.take() {
            Some(host) => host.shutdown(self.shutdown_timeout),
            None => Ok(()),
        };
        self.remove_context();
        debug!(release = %self.release, "legacy engine unloaded");
        result
    }

    fn remove_context(&mut self) {
        if let Some(context) = self.context.take() {
            let path = context.path().to_path_buf();
            if let Err(e) = context.close() {
                warn!(path = %path.display(), error = %e, "failed to remove legacy engine directory");
            }
        }
    }
}

impl Drop for LegacyEngine {
    fn drop(&mut self) {
        if self.host.take().is_some() {
            debug!(release = %self.release, "legacy engine dropped without unload");
        }
        self.remove_context();
    }
}

impl Driver for LegacyEngine {
    fn connect(
        &self,
        url: &str,
        properties: &ConnectionProperties,
    ) -> Result<Box<dyn Connection>, EngineError> {
        self.host
            .as_ref()
            .ok_or(EngineError::NotConnected)?
            .connect(url, properties)
    }
}

impl Engine for LegacyEngine {
    fn build_id(&self) -> u32 {
        self.release.version
    }
}
