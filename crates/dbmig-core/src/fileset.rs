//! Database file sets.
//!
//! A database named `base` lives in `base` + each suffix (`app.mv.db`,
//! `app.lobs.db`). Every operation here acts on the whole set.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Main store file suffix.
pub const STORE_FILE_SUFFIX: &str = ".mv.db";

/// Large-object store file suffix.
pub const LOB_FILE_SUFFIX: &str = ".lobs.db";

/// Suffix appended to a file when it is backed up.
pub const BACKUP_SUFFIX: &str = ".bak";

/// The files that make up one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseFileSet {
    base: PathBuf,
    suffixes: Vec<String>,
}

impl DatabaseFileSet {
    /// A file set with the default suffixes.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self::with_suffixes(base, &[STORE_FILE_SUFFIX, LOB_FILE_SUFFIX])
    }

    /// A file set with custom suffixes.
    pub fn with_suffixes(base: impl Into<PathBuf>, suffixes: &[&str]) -> Self {
        Self {
            base: base.into(),
            suffixes: suffixes.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    /// A set with the same suffixes whose base name has `suffix` appended.
    pub fn sibling(&self, suffix: &str) -> Self {
        Self {
            base: append(&self.base, suffix),
            suffixes: self.suffixes.clone(),
        }
    }

    /// Every member path, present or not.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.suffixes.iter().map(|s| append(&self.base, s)).collect()
    }

    /// Member paths that currently exist.
    pub fn existing_files(&self) -> Vec<PathBuf> {
        self.paths().into_iter().filter(|p| p.exists()).collect()
    }

    /// Backup paths of every member.
    pub fn backup_paths(&self) -> Vec<PathBuf> {
        self.paths()
            .iter()
            .map(|p| append(p, BACKUP_SUFFIX))
            .collect()
    }

    /// Copy every existing member onto `target`, overwriting. Returns the
    /// number of files copied.
    pub fn copy_to(&self, target: &DatabaseFileSet) -> io::Result<usize> {
        let mut copied = 0;
        for (source, destination) in self.paths().iter().zip(target.paths()) {
            if !source.exists() {
                continue;
            }
            fs::copy(source, &destination)?;
            let modified = fs::metadata(source)?.modified()?;
            File::options()
                .write(true)
                .open(&destination)?
                .set_modified(modified)?;
            debug!(from = %source.display(), to = %destination.display(), "copied database file");
            copied += 1;
        }
        Ok(copied)
    }

    /// Rename every existing member to its backup name.
    ///
    /// If a rename fails, the files already renamed are moved back before the
    /// error is returned. The returned [`Backup`] lists exactly the files
    /// moved, so backups left over from an earlier run are never mistaken
    /// for members of this one.
    pub fn backup_rename(&self) -> io::Result<Backup> {
        let mut renamed: Vec<(PathBuf, PathBuf)> = Vec::new();
        for path in self.paths() {
            if !path.exists() {
                continue;
            }
            let backup = append(&path, BACKUP_SUFFIX);
            if let Err(e) = fs::rename(&path, &backup) {
                for (original, moved) in renamed.iter().rev() {
                    if let Err(undo) = fs::rename(moved, original) {
                        warn!(path = %moved.display(), error = %undo, "failed to undo backup rename");
                    }
                }
                return Err(e);
            }
            renamed.push((path, backup));
        }
        debug!(base = %self.base.display(), files = renamed.len(), "database files backed up");
        Ok(Backup { renamed })
    }

    /// Undo `backup`, moving each backed up file to its live name.
    ///
    /// A live member that was not part of the backup did not exist when the
    /// set was backed up and is removed. Other `.bak` files are left alone.
    pub fn restore_rename(&self, backup: &Backup) -> io::Result<usize> {
        let mut restored = 0;
        for path in self.paths() {
            match backup.backup_of(&path) {
                Some(moved) => {
                    fs::rename(moved, &path)?;
                    restored += 1;
                }
                None if path.exists() => fs::remove_file(&path)?,
                None => {}
            }
        }
        debug!(base = %self.base.display(), files = restored, "database files restored");
        Ok(restored)
    }

    /// Remove every member. Returns how many existing files could not be
    /// removed.
    pub fn delete(&self) -> usize {
        self.paths()
            .iter()
            .filter(|path| path.exists() && !remove_file_logged(path))
            .count()
    }
}

/// Files renamed by one [`DatabaseFileSet::backup_rename`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Backup {
    renamed: Vec<(PathBuf, PathBuf)>,
}

impl Backup {
    pub fn len(&self) -> usize {
        self.renamed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renamed.is_empty()
    }

    /// Backup names, in member order.
    pub fn files(&self) -> Vec<PathBuf> {
        self.renamed.iter().map(|(_, backup)| backup.clone()).collect()
    }

    fn backup_of(&self, original: &Path) -> Option<&Path> {
        self.renamed
            .iter()
            .find(|(path, _)| path == original)
            .map(|(_, backup)| backup.as_path())
    }
}

/// Remove a file, logging failure. Returns false if it still exists.
pub fn remove_file_logged(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove file");
            false
        }
    }
}

fn append(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
