//! Release lines of historical engine builds.

use crate::error::MigrationError;
use std::fmt;

/// Builds up to this version wrote scripts in the 1.x dialect.
pub const LEGACY_DIALECT_MAX_VERSION: u32 = 200;

/// Builds from this version on carry larger archives.
const LARGE_ARCHIVE_MIN_VERSION: u32 = 198;

/// A published release line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReleaseLine {
    V1_2,
    V1_3,
    V1_4,
    V2_0,
}

impl ReleaseLine {
    /// Map a build version to its release line.
    pub fn resolve(version: u32, current_build_id: u32) -> Result<Self, MigrationError> {
        match version {
            v if v >= 201 => {
                if v % 2 != 0 {
                    Err(unsupported(v, "2.x builds are even-numbered"))
                } else if v > current_build_id {
                    Err(unsupported(
                        v,
                        &format!("newer than the current engine build {}", current_build_id),
                    ))
                } else {
                    Ok(ReleaseLine::V2_0)
                }
            }
            177..=200 => Ok(ReleaseLine::V1_4),
            147 => Err(unsupported(147, "build 147 was never published")),
            146..=176 => Ok(ReleaseLine::V1_3),
            120..=145 => Ok(ReleaseLine::V1_2),
            v => Err(unsupported(v, "older than any supported release line")),
        }
    }

    /// Version prefix, e.g. `1.4`.
    pub fn prefix(self) -> &'static str {
        match self {
            ReleaseLine::V1_2 => "1.2",
            ReleaseLine::V1_3 => "1.3",
            ReleaseLine::V1_4 => "1.4",
            ReleaseLine::V2_0 => "2.0",
        }
    }
}

impl fmt::Display for ReleaseLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.x", self.prefix())
    }
}

fn unsupported(version: u32, reason: &str) -> MigrationError {
    MigrationError::UnsupportedVersion {
        version,
        reason: reason.to_string(),
    }
}

/// A specific historical build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LegacyRelease {
    pub version: u32,
    pub line: ReleaseLine,
}

impl LegacyRelease {
    /// Resolve a build version against the current engine build.
    pub fn resolve(version: u32, current_build_id: u32) -> Result<Self, MigrationError> {
        Ok(Self {
            version,
            line: ReleaseLine::resolve(version, current_build_id)?,
        })
    }

    /// Full version string, e.g. `1.4.196`.
    pub fn full_version(&self) -> String {
        format!("{}.{}", self.line.prefix(), self.version)
    }

    /// File name of this build's archive, e.g. `engine-1.4.196.zip`.
    pub fn archive_file_name(&self, prefix: &str, extension: &str) -> String {
        format!("{}-{}.{}", prefix, self.full_version(), extension)
    }

    /// Whether scripts written by this build must be replayed in the 1.x
    /// compatibility mode.
    pub fn needs_legacy_script_dialect(&self) -> bool {
        self.version <= LEGACY_DIALECT_MAX_VERSION
    }

    /// Initial capacity for the in-memory archive entry map.
    pub fn expected_entry_count(&self) -> usize {
        if self.version >= LARGE_ARCHIVE_MIN_VERSION {
            2048
        } else {
            1024
        }
    }
}

impl fmt::Display for LegacyRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_version())
    }
}
