//! Shared fixtures: an in-process current engine and packaged legacy builds
//! whose host is a POSIX shell script.

#![allow(dead_code)]

use dbmig_core::{
    Connection, ConnectionProperties, Driver, Engine, EngineError, LegacyEngineLoader,
    LegacyRelease, LoaderConfig, MigrationConfig, VersionManager, VersionMarkerStore,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::ZipWriter;

/// Build id of the engine under test.
pub const CURRENT_BUILD: u32 = 224;

const URL_PREFIX: &str = "jdbc:h2:";

/// What the packaged legacy host does with `SCRIPT TO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// Copy the store verbatim; it is already a replayable script.
    Copy,
    /// Write a script the current engine cannot replay.
    Garbage,
    /// Answer with an error.
    Fail,
}

const HOST_SCRIPT: &str = r#"#!/bin/sh
build=__BUILD__
db=
while IFS= read -r line; do
  case "$line" in
    *'"op":"hello"'*)
      echo "legacy host $build ready" >&2
      printf '{"status":"ok","build_id":%s,"protocol_version":1}\n' "$build"
      ;;
    *'"op":"connect"'*)
      url=$(printf '%s\n' "$line" | sed 's/.*"url":"\([^"]*\)".*/\1/')
      db=$(printf '%s\n' "$url" | sed -e 's/^jdbc:h2://' -e 's/;.*//' -e 's/^file://')
      if [ -f "$db.mv.db" ]; then
        echo '{"status":"ok"}'
      else
        echo '{"status":"error","message":"database not found"}'
      fi
      ;;
    *'"op":"execute"'*)
      target=$(printf '%s\n' "$line" | sed "s/.*SCRIPT TO '\([^']*\)'.*/\1/")
      __EXPORT__
      ;;
    *'"op":"close"'*)
      echo '{"status":"ok"}'
      ;;
    *'"op":"shutdown"'*)
      echo '{"status":"ok"}'
      exit 0
      ;;
    *)
      echo '{"status":"error","message":"unknown request"}'
      ;;
  esac
done
"#;

const EXPORT_COPY: &str = r#"if cp "$db.mv.db" "$target"; then
        echo '{"status":"ok","update_count":0}'
      else
        echo '{"status":"error","message":"export failed"}'
      fi"#;

const EXPORT_GARBAGE: &str = r#"{ echo "INSERT INTO groups(name) VALUES ('partial')"; echo 'THIS IS NOT SQL'; } > "$target"
      echo '{"status":"ok","update_count":0}'"#;

const EXPORT_FAIL: &str = r#"echo '{"status":"error","message":"table GROUPS is locked"}'"#;

/// Shell host script for a legacy build.
pub fn host_script(build: u32, mode: ExportMode) -> String {
    let export = match mode {
        ExportMode::Copy => EXPORT_COPY,
        ExportMode::Garbage => EXPORT_GARBAGE,
        ExportMode::Fail => EXPORT_FAIL,
    };
    HOST_SCRIPT
        .replace("__BUILD__", &build.to_string())
        .replace("__EXPORT__", export)
}

/// Zip archive holding `entries`; `launcher` is marked executable.
pub fn build_archive(entries: &[(&str, &[u8])], launcher: &str) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        let mode = if *name == launcher { 0o755 } else { 0o644 };
        writer
            .start_file(*name, FileOptions::default().unix_permissions(mode))
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Archive of a legacy build with the default launcher.
pub fn legacy_archive(build: u32, mode: ExportMode) -> Vec<u8> {
    let script = host_script(build, mode);
    build_archive(
        &[
            ("bin/engine-host", script.as_bytes()),
            ("lib/README", b"legacy engine payload"),
        ],
        "bin/engine-host",
    )
}

/// Contents of a store file written by `build`.
pub fn legacy_store(build: u32) -> String {
    format!(
        "-- format {}\n\
         CREATE TABLE groups(id INT AUTO_INCREMENT, name VARCHAR)\n\
         CREATE TABLE users(id INT AUTO_INCREMENT, name VARCHAR)\n\
         INSERT INTO groups(name) VALUES ('admins')\n\
         INSERT INTO groups(name) VALUES ('staff')\n\
         INSERT INTO users(name) VALUES ('alice')\n\
         INSERT INTO users(name) VALUES ('bob')\n",
        build
    )
}

/// A database directory plus a legacy build repository.
pub struct TestContext {
    pub data: PathBuf,
    pub repository: PathBuf,
    _dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let repository = dir.path().join("legacy");
        fs::create_dir(&data).unwrap();
        fs::create_dir(&repository).unwrap();
        Self {
            data,
            repository,
            _dir: dir,
        }
    }

    /// Database base path.
    pub fn base(&self) -> PathBuf {
        self.data.join("app")
    }

    pub fn url(&self) -> String {
        format!("{}{}", URL_PREFIX, self.base().display())
    }

    pub fn store_path(&self) -> PathBuf {
        self.data.join("app.mv.db")
    }

    pub fn marker(&self) -> VersionMarkerStore {
        VersionMarkerStore::new(&self.data)
    }

    /// Lay down a database written by `build` and record it in the marker.
    pub fn write_database(&self, build: u32) {
        fs::write(self.store_path(), legacy_store(build)).unwrap();
        fs::write(self.data.join("app.lobs.db"), format!("lobs of {}", build)).unwrap();
        self.marker().write_version(build).unwrap();
    }

    /// Publish a legacy build archive in the repository.
    pub fn install_legacy_build(&self, version: u32, mode: ExportMode) -> PathBuf {
        self.install_archive(version, &legacy_archive(version, mode))
    }

    pub fn install_archive(&self, version: u32, bytes: &[u8]) -> PathBuf {
        let release = LegacyRelease::resolve(version, CURRENT_BUILD).unwrap();
        let path = self
            .repository
            .join(format!("engine-{}.zip", release.full_version()));
        fs::write(&path, bytes).unwrap();
        path
    }

    pub fn loader(&self) -> LegacyEngineLoader {
        LegacyEngineLoader::new(LoaderConfig::new(&self.repository)).unwrap()
    }

    pub fn manager(&self, default_version: Option<u32>) -> VersionManager {
        let mut config = MigrationConfig::new(&self.data);
        if let Some(version) = default_version {
            config = config.with_default_version(version);
        }
        VersionManager::new(config, self.loader())
    }

    /// Every file in the data directory with its contents.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        fs::read_dir(&self.data)
            .unwrap()
            .map(|entry| {
                let entry = entry.unwrap();
                let name = entry.file_name().to_string_lossy().into_owned();
                let contents = fs::read(entry.path()).unwrap_or_default();
                (name, contents)
            })
            .collect()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.snapshot().into_keys().collect()
    }
}

/// In-process stand-in for the installed engine.
///
/// Its store is a text file: a `-- format <build>` header followed by the
/// statements that built it. Opening a store written by another build fails.
pub struct FakeEngine {
    build_id: u32,
    statements: Arc<Mutex<Vec<String>>>,
    next_ids: Arc<Mutex<BTreeMap<String, u64>>>,
    sabotage_rollback: bool,
    block_after_reload: Option<PathBuf>,
}

impl FakeEngine {
    pub fn new(build_id: u32) -> Self {
        Self {
            build_id,
            statements: Arc::new(Mutex::new(Vec::new())),
            next_ids: Arc::new(Mutex::new(BTreeMap::new())),
            sabotage_rollback: false,
            block_after_reload: None,
        }
    }

    /// After a successful reload, put a non-empty directory at `path` so
    /// nothing can be renamed onto it.
    pub fn blocking_after_reload(mut self, path: impl Into<PathBuf>) -> Self {
        self.block_after_reload = Some(path.into());
        self
    }

    /// Make every reload fail and leave a directory where the store file
    /// belongs, so the rollback cannot put the backup back.
    pub fn sabotaging_rollback(mut self) -> Self {
        self.sabotage_rollback = true;
        self
    }

    /// Every statement executed so far.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    /// Insert a row and return the id it was given.
    pub fn insert(&self, url: &str, table: &str, name: &str) -> u64 {
        let mut conn = self
            .connect(url, &ConnectionProperties::credentials("sa", ""))
            .unwrap();
        conn.execute(&format!("INSERT INTO {}(name) VALUES ('{}')", table, name))
            .unwrap();
        self.next_ids.lock()[table]
    }
}

impl Driver for FakeEngine {
    fn connect(
        &self,
        url: &str,
        _properties: &ConnectionProperties,
    ) -> Result<Box<dyn Connection>, EngineError> {
        let rest = url
            .strip_prefix(URL_PREFIX)
            .ok_or_else(|| EngineError::InvalidUrl(url.to_string()))?;
        let name = rest.split(';').next().unwrap_or_default();
        let name = name.strip_prefix("file:").unwrap_or(name);
        let store = PathBuf::from(format!("{}.mv.db", name));

        if self.sabotage_rollback {
            fs::create_dir_all(&store)?;
            fs::write(store.join("lock"), b"held")?;
        } else if store.exists() {
            let contents = fs::read_to_string(&store)?;
            let header = contents.lines().next().unwrap_or_default();
            let expected = format!("-- format {}", self.build_id);
            if header != expected {
                return Err(EngineError::remote(format!(
                    "unsupported file format: {:?}",
                    header
                )));
            }
        } else {
            fs::write(&store, format!("-- format {}\n", self.build_id))?;
        }

        if store.is_file() {
            let contents = fs::read_to_string(&store)?;
            let mut ids = self.next_ids.lock();
            ids.clear();
            for table in contents.lines().filter_map(inserted_table) {
                *ids.entry(table.to_string()).or_insert(0) += 1;
            }
        }

        Ok(Box::new(FakeConnection {
            store,
            statements: Arc::clone(&self.statements),
            next_ids: Arc::clone(&self.next_ids),
            broken: self.sabotage_rollback,
            block_after_reload: self.block_after_reload.clone(),
        }))
    }
}

impl Engine for FakeEngine {
    fn build_id(&self) -> u32 {
        self.build_id
    }
}

struct FakeConnection {
    store: PathBuf,
    statements: Arc<Mutex<Vec<String>>>,
    next_ids: Arc<Mutex<BTreeMap<String, u64>>>,
    broken: bool,
    block_after_reload: Option<PathBuf>,
}

impl FakeConnection {
    fn append(&self, line: &str) -> Result<(), EngineError> {
        let mut file = fs::OpenOptions::new().append(true).open(&self.store)?;
        writeln!(file, "{}", line)?;
        if let Some(table) = inserted_table(line) {
            *self.next_ids.lock().entry(table.to_string()).or_insert(0) += 1;
        }
        Ok(())
    }

    fn run_script(&self, path: &Path) -> Result<u64, EngineError> {
        let script = fs::read_to_string(path)?;
        let mut count = 0;
        for line in script.lines().map(str::trim) {
            if line.is_empty() || line.starts_with("--") {
                continue;
            }
            if !(line.starts_with("CREATE TABLE ") || line.starts_with("INSERT INTO ")) {
                return Err(EngineError::remote(format!("syntax error in script: {}", line)));
            }
            self.append(line)?;
            count += 1;
        }
        Ok(count)
    }
}

impl Connection for FakeConnection {
    fn execute(&mut self, sql: &str) -> Result<u64, EngineError> {
        self.statements.lock().push(sql.to_string());
        if self.broken {
            return Err(EngineError::remote("store is locked"));
        }
        if let Some(rest) = sql.strip_prefix("RUNSCRIPT FROM '") {
            let end = rest
                .find('\'')
                .ok_or_else(|| EngineError::remote("unterminated script path"))?;
            let count = self.run_script(Path::new(&rest[..end]))?;
            if let Some(path) = &self.block_after_reload {
                if path.is_file() {
                    fs::remove_file(path)?;
                }
                fs::create_dir_all(path)?;
                fs::write(path.join("held"), b"held")?;
            }
            return Ok(count);
        }
        if sql.starts_with("INSERT INTO ") {
            self.append(sql)?;
            return Ok(1);
        }
        Err(EngineError::remote(format!("unsupported statement: {}", sql)))
    }
}

/// Table named by an `INSERT INTO <table>(...)` line.
fn inserted_table(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("INSERT INTO ")?;
    rest.split('(').next()
}

/// Rows of `table` in the store at `base`.
pub fn count_rows(base: &Path, table: &str) -> usize {
    let store = PathBuf::from(format!("{}.mv.db", base.display()));
    let prefix = format!("INSERT INTO {}(", table);
    fs::read_to_string(store)
        .unwrap()
        .lines()
        .filter(|line| line.starts_with(&prefix))
        .count()
}
