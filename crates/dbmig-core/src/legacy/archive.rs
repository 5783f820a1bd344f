//! Packaged legacy build archives.
//!
//! An archive is a zip file holding everything a legacy engine host needs to
//! run, plus an optional `manifest.json` naming the launcher.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::ZipArchive;

/// Archive entry holding the launch manifest.
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// Launcher used when the archive carries no manifest.
pub const DEFAULT_LAUNCHER: &str = "bin/engine-host";

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Archive errors.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("unsafe archive entry: {0}")]
    UnsafeEntry(String),

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("launcher {0} is not in the archive")]
    MissingLauncher(String),
}

/// How to start the host packaged in an archive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineManifest {
    /// Launcher path relative to the archive root.
    #[serde(default = "default_launcher")]
    pub launcher: String,
    /// Extra launcher arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_launcher() -> String {
    DEFAULT_LAUNCHER.to_string()
}

impl Default for EngineManifest {
    fn default() -> Self {
        Self {
            launcher: default_launcher(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct ArchiveEntry {
    data: Vec<u8>,
    mode: Option<u32>,
}

/// The unpacked contents of an archive, held in memory.
#[derive(Debug)]
pub struct EngineArchive {
    entries: HashMap<PathBuf, ArchiveEntry>,
}

impl EngineArchive {
    /// Unpack every file entry of `bytes`.
    pub fn read(bytes: &[u8], capacity: usize) -> Result<Self, ArchiveError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        let mut entries = HashMap::with_capacity(capacity);

        for index in 0..zip.len() {
            let mut file = zip.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            let mode = file.unix_mode();
            if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
                return Err(ArchiveError::UnsafeEntry(format!(
                    "{} is a symbolic link",
                    file.name()
                )));
            }
            let name = file
                .enclosed_name()
                .map(Path::to_path_buf)
                .ok_or_else(|| ArchiveError::UnsafeEntry(file.name().to_string()))?;

            // The declared size is only a hint; a corrupt header may overstate it.
            let mut data = Vec::with_capacity(file.size().min(bytes.len() as u64) as usize);
            file.read_to_end(&mut data)?;
            entries.insert(name, ArchiveEntry { data, mode });
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(Path::new(name))
    }

    /// The launch manifest, or the default one if the archive has none.
    pub fn manifest(&self) -> Result<EngineManifest, ArchiveError> {
        let manifest = match self.entries.get(Path::new(MANIFEST_ENTRY)) {
            Some(entry) => serde_json::from_slice(&entry.data)
                .map_err(|e| ArchiveError::Manifest(e.to_string()))?,
            None => EngineManifest::default(),
        };
        if !self.contains(&manifest.launcher) {
            return Err(ArchiveError::MissingLauncher(manifest.launcher));
        }
        Ok(manifest)
    }

    /// Write every entry below `dir`, making `launcher` executable.
    pub fn materialize(&self, dir: &Path, launcher: &str) -> Result<(), ArchiveError> {
        for (name, entry) in &self.entries {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &entry.data)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mut mode = entry.mode.map(|m| m & 0o777).unwrap_or(0o644);
                if name.as_path() == Path::new(launcher) {
                    mode |= 0o755;
                }
                fs::set_permissions(&path, fs::Permissions::from_mode(mode | 0o600))?;
            }
            #[cfg(not(unix))]
            let _ = launcher;
        }
        Ok(())
    }
}
