//! Legacy engine builds.
//!
//! Historical builds are shipped as archives in a repository directory, one
//! per build, named `<prefix>-<line>.<version>.<ext>`. Loading one unpacks it
//! into a private directory and starts its engine host there. Nothing of the
//! legacy build is ever linked into this process.

pub mod archive;
pub mod loader;
pub mod release;

pub use archive::{ArchiveError, EngineArchive, EngineManifest, DEFAULT_LAUNCHER, MANIFEST_ENTRY};
pub use loader::{LegacyEngine, LegacyEngineLoader, CHECKSUM_EXTENSION};
pub use release::{LegacyRelease, ReleaseLine, LEGACY_DIALECT_MAX_VERSION};
