//! dbmig Core - format-version migration for embedded databases.
//!
//! An embedded engine stores its files in an on-disk format tied to the
//! engine build that wrote them. When the installed engine is upgraded, files
//! written by an older build may no longer open. This crate detects that
//! situation through a small version marker kept next to the database. It then
//! moves the data forward: the old build exports a portable script and the
//! current build replays it.
//!
//! The old build never runs inside this process. Its packaged archive is
//! unpacked into a private directory and started as an engine host that speaks
//! the [`dbmig_proto`] line protocol, so two builds of the same engine never
//! share an address space.
//!
//! # Example
//!
//! ```ignore
//! use dbmig_core::{LegacyEngineLoader, LoaderConfig, MigrationConfig, VersionManager};
//!
//! let loader = LegacyEngineLoader::new(LoaderConfig::new("/opt/app/legacy-engines"))?;
//! let manager = VersionManager::new(
//!     MigrationConfig::new("./data").with_default_version(196),
//!     loader,
//! );
//!
//! // `engine` is the currently installed engine, implementing `Engine`.
//! let outcome = manager.migrate_if_needed(&engine, false, "jdbc:h2:./data/app", "sa", "")?;
//! println!("{outcome}");
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod fileset;
pub mod host;
pub mod hosted;
pub mod legacy;
pub mod manager;
pub mod marker;
pub mod session;
pub mod upgrade;
pub mod url;

pub use config::{LoaderConfig, MigrationConfig};
pub use engine::{Connection, ConnectionProperties, Driver, Engine};
pub use error::{EngineError, MigrationError, MigrationErrorKind};
pub use fileset::{Backup, DatabaseFileSet};
pub use hosted::{HostCommand, HostedConnection, HostedEngine};
pub use legacy::{LegacyEngine, LegacyEngineLoader, LegacyRelease, ReleaseLine};
pub use manager::VersionManager;
pub use marker::VersionMarkerStore;
pub use session::{InvalidTransition, MigrationOutcome, MigrationSession, MigrationState};
pub use upgrade::Upgrader;
pub use url::ConnectionInfo;

/// Re-export protocol types.
pub use dbmig_proto as proto;
