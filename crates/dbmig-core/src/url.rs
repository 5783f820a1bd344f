//! Connection URL parsing.
//!
//! URLs look like `<prefix><name>[;KEY=VALUE]*`, for example
//! `jdbc:h2:./data/app;CIPHER=AES;FILE_LOCK=NO`.

use crate::engine::ConnectionProperties;
use crate::error::EngineError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default URL prefix.
pub const DEFAULT_URL_PREFIX: &str = "jdbc:h2:";

const FILE_SCHEME: &str = "file:";
const MEMORY_SCHEME: &str = "mem:";
const REMOTE_SCHEMES: [&str; 2] = ["tcp:", "ssl:"];
const HOME_PREFIX: &str = "~";
const IMPLICIT_RELATIVE_PATH: &str = "IMPLICIT_RELATIVE_PATH";

/// A parsed connection URL together with its property bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    prefix: String,
    name: String,
    settings: BTreeMap<String, String>,
    properties: ConnectionProperties,
}

impl ConnectionInfo {
    /// Parse a URL.
    pub fn parse(
        url: &str,
        prefix: &str,
        properties: &ConnectionProperties,
    ) -> Result<Self, EngineError> {
        let rest = url.strip_prefix(prefix).ok_or_else(|| {
            EngineError::InvalidUrl(format!("{} does not start with {}", url, prefix))
        })?;

        let mut parts = rest.split(';');
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(EngineError::InvalidUrl(format!(
                "{} does not name a database",
                url
            )));
        }

        let mut settings = BTreeMap::new();
        for part in parts {
            if part.trim().is_empty() {
                continue;
            }
            let (key, value) = part.split_once('=').ok_or_else(|| {
                EngineError::InvalidUrl(format!("setting {:?} in {} has no value", part, url))
            })?;
            settings.insert(key.trim().to_ascii_uppercase(), value.to_string());
        }

        Ok(Self {
            prefix: prefix.to_string(),
            name: name.to_string(),
            settings,
            properties: properties.clone(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Database name, without a `file:` scheme.
    pub fn name(&self) -> &str {
        self.name.strip_prefix(FILE_SCHEME).unwrap_or(&self.name)
    }

    /// Absolute base path of a file database.
    ///
    /// A leading `~` stands for the home directory and `./name` is taken
    /// relative to the working directory. A bare relative name such as
    /// `data/app` is rejected unless `IMPLICIT_RELATIVE_PATH=TRUE` is set.
    pub fn database_path(&self) -> Result<PathBuf, EngineError> {
        let name = self.name();
        let path = if let Some(rest) = name.strip_prefix(HOME_PREFIX) {
            let home = dirs::home_dir().ok_or_else(|| {
                EngineError::InvalidUrl(format!("no home directory to expand {}", name))
            })?;
            home.join(rest.trim_start_matches(['/', '\\']))
        } else {
            let path = Path::new(name);
            if path.is_absolute() {
                path.to_path_buf()
            } else if name.starts_with('.') || self.implicit_relative_path() {
                std::env::current_dir()?.join(path)
            } else {
                return Err(EngineError::InvalidUrl(format!(
                    "{} is a relative path; use ./{} or an absolute path",
                    name, name
                )));
            }
        };
        Ok(normalize(&path))
    }

    fn implicit_relative_path(&self) -> bool {
        self.property(IMPLICIT_RELATIVE_PATH)
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }

    /// Whether the database is reached over the network.
    pub fn is_remote(&self) -> bool {
        REMOTE_SCHEMES.iter().any(|scheme| self.name.starts_with(scheme))
    }

    /// Whether the database lives in files.
    pub fn is_persistent(&self) -> bool {
        !self.name.starts_with(MEMORY_SCHEME)
    }

    /// A setting given in the URL itself.
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings
            .get(&key.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// A setting from the URL, falling back to the property bag.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.setting(key).or_else(|| self.properties.get(key))
    }

    pub fn properties(&self) -> &ConnectionProperties {
        &self.properties
    }
}

/// Drop `.` segments and fold `..` into its parent, without touching the
/// filesystem.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Quote a value as an SQL string literal.
pub fn quote_sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
