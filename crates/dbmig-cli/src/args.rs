//! Command-line arguments.

use clap::{Args, Parser, Subcommand};
use dbmig_core::config::{DEFAULT_ARCHIVE_EXTENSION, DEFAULT_ARCHIVE_PREFIX};
use dbmig_core::url::DEFAULT_URL_PREFIX;
use dbmig_core::{HostCommand, LoaderConfig, MigrationConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Default host shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Embedded database format migration.
#[derive(Parser, Debug)]
#[command(name = "dbmig")]
#[command(version, about = "Migrate embedded database files between engine builds")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bring a database to the installed engine's format if needed.
    Migrate(MigrateArgs),

    /// Inspect or set the version marker.
    #[command(subcommand)]
    Version(VersionCommand),

    /// Show which legacy build a version needs.
    Resolve(ResolveArgs),
}

#[derive(Subcommand, Debug)]
pub enum VersionCommand {
    /// Print the recorded version.
    Show(ShowArgs),

    /// Overwrite the recorded version.
    Set(SetArgs),
}

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Directory holding the database files and the version marker.
    #[arg(long)]
    pub database_dir: PathBuf,

    /// Connection URL of the database.
    #[arg(long)]
    pub url: String,

    /// Database user.
    #[arg(long, default_value = "")]
    pub user: String,

    /// Database password.
    #[arg(long, default_value = "", env = "DBMIG_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Directory holding packaged legacy builds.
    #[arg(long, env = "DBMIG_LEGACY_REPOSITORY")]
    pub legacy_repository: PathBuf,

    /// Version assumed when the database has no version marker.
    #[arg(long)]
    pub default_version: Option<u32>,

    /// The database was just created; only record the engine build.
    #[arg(long)]
    pub new_database: bool,

    /// Engine host program for the installed engine.
    #[arg(long, env = "DBMIG_ENGINE")]
    pub engine: PathBuf,

    /// Argument passed to the engine host (repeatable).
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    pub engine_args: Vec<String>,

    /// Connection URL prefix.
    #[arg(long, default_value = DEFAULT_URL_PREFIX)]
    pub url_prefix: String,

    /// Legacy archive file name prefix.
    #[arg(long, default_value = DEFAULT_ARCHIVE_PREFIX)]
    pub archive_prefix: String,

    /// Legacy archive file extension.
    #[arg(long, default_value = DEFAULT_ARCHIVE_EXTENSION)]
    pub archive_extension: String,

    /// Seconds to wait for an engine host to exit.
    #[arg(long, default_value_t = DEFAULT_SHUTDOWN_TIMEOUT_SECS)]
    pub shutdown_timeout: u64,
}

/// Everything `migrate` needs, in library terms.
#[derive(Debug, Clone)]
pub struct MigratePlan {
    pub migration: MigrationConfig,
    pub loader: LoaderConfig,
    pub engine: HostCommand,
    pub url: String,
    pub user: String,
    pub password: String,
    pub new_database: bool,
    pub shutdown_timeout: Duration,
}

impl MigrateArgs {
    /// Convert command-line arguments to library configuration.
    pub fn into_config(self) -> MigratePlan {
        let shutdown_timeout = Duration::from_secs(self.shutdown_timeout);

        let mut migration =
            MigrationConfig::new(self.database_dir).with_url_prefix(self.url_prefix);
        if let Some(version) = self.default_version {
            migration = migration.with_default_version(version);
        }

        let loader = LoaderConfig::new(self.legacy_repository)
            .with_archive_prefix(self.archive_prefix)
            .with_archive_extension(self.archive_extension)
            .with_shutdown_timeout(shutdown_timeout);

        let engine = HostCommand::new(self.engine).with_args(self.engine_args);

        MigratePlan {
            migration,
            loader,
            engine,
            url: self.url,
            user: self.user,
            password: self.password,
            new_database: self.new_database,
            shutdown_timeout,
        }
    }
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Directory holding the version marker.
    #[arg(long)]
    pub database_dir: PathBuf,

    /// Version assumed when there is no marker.
    #[arg(long)]
    pub default_version: Option<u32>,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Directory holding the version marker.
    #[arg(long)]
    pub database_dir: PathBuf,

    /// Version to record.
    #[arg(long)]
    pub version: u32,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Engine build version to resolve.
    pub version: u32,

    /// Build id of the installed engine.
    #[arg(long)]
    pub current_build: u32,

    /// Repository to look for the archive in.
    #[arg(long, env = "DBMIG_LEGACY_REPOSITORY")]
    pub legacy_repository: Option<PathBuf>,

    /// Legacy archive file name prefix.
    #[arg(long, default_value = DEFAULT_ARCHIVE_PREFIX)]
    pub archive_prefix: String,

    /// Legacy archive file extension.
    #[arg(long, default_value = DEFAULT_ARCHIVE_EXTENSION)]
    pub archive_extension: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_migrate_into_config() {
        let cli = parse(&[
            "dbmig",
            "migrate",
            "--database-dir",
            "/srv/data",
            "--url",
            "jdbc:h2:/srv/data/app",
            "--user",
            "sa",
            "--legacy-repository",
            "/opt/legacy",
            "--default-version",
            "196",
            "--engine",
            "/opt/engine/bin/engine-host",
            "--engine-arg=--quiet",
            "--engine-arg",
            "-Xmx1g",
        ]);
        let Command::Migrate(args) = cli.command else {
            panic!("expected migrate");
        };
        let plan = args.into_config();

        assert_eq!(plan.migration.database_dir, PathBuf::from("/srv/data"));
        assert_eq!(plan.migration.default_version, Some(196));
        assert_eq!(plan.migration.url_prefix, "jdbc:h2:");
        assert_eq!(plan.loader.repository, PathBuf::from("/opt/legacy"));
        assert_eq!(plan.loader.archive_prefix, "engine");
        assert_eq!(plan.loader.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(plan.engine.args, vec!["--quiet", "-Xmx1g"]);
        assert_eq!(plan.user, "sa");
        assert_eq!(plan.password, "");
        assert!(!plan.new_database);
    }

    #[test]
    fn test_version_subcommands() {
        let cli = parse(&["dbmig", "version", "set", "--database-dir", "d", "--version", "224"]);
        assert!(matches!(
            cli.command,
            Command::Version(VersionCommand::Set(SetArgs { version: 224, .. }))
        ));

        let cli = parse(&["dbmig", "version", "show", "--database-dir", "d"]);
        assert!(matches!(
            cli.command,
            Command::Version(VersionCommand::Show(ShowArgs {
                default_version: None,
                ..
            }))
        ));
    }

    #[test]
    fn test_resolve_args() {
        let cli = parse(&["dbmig", "resolve", "196", "--current-build", "224"]);
        let Command::Resolve(args) = cli.command else {
            panic!("expected resolve");
        };
        assert_eq!(args.version, 196);
        assert_eq!(args.current_build, 224);
        assert_eq!(args.archive_extension, "zip");
    }

    #[test]
    fn test_migrate_requires_url() {
        assert!(Cli::try_parse_from([
            "dbmig",
            "migrate",
            "--database-dir",
            "d",
            "--legacy-repository",
            "r",
            "--engine",
            "e"
        ])
        .is_err());
    }
}
