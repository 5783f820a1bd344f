//! Driver boundary to embedded engines.
//!
//! The migrator never links an engine directly. Both the current engine and
//! every legacy build are reached through these traits: the current one is
//! supplied by the caller, legacy ones are provided by
//! [`LegacyEngine`](crate::legacy::LegacyEngine).

use crate::error::EngineError;
use std::collections::BTreeMap;
use std::fmt;

/// Property key holding the user name.
pub const USER_PROPERTY: &str = "user";

/// Property key holding the password.
pub const PASSWORD_PROPERTY: &str = "password";

/// Ordered string property bag passed alongside a connection URL.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionProperties {
    entries: BTreeMap<String, String>,
}

impl ConnectionProperties {
    /// Create an empty property bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a property bag holding user and password.
    pub fn credentials(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new()
            .with(USER_PROPERTY, user)
            .with(PASSWORD_PROPERTY, password)
    }

    /// Add a property.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a property, replacing any previous value under the same key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Look up a property. Keys compare case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        if let Some(value) = self.entries.get(key) {
            return Some(value);
        }
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// The user name, if set.
    pub fn user(&self) -> Option<&str> {
        self.get(USER_PROPERTY)
    }

    /// The password, if set.
    pub fn password(&self) -> Option<&str> {
        self.get(PASSWORD_PROPERTY)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy the properties into a plain map for the wire.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries.clone()
    }
}

impl From<BTreeMap<String, String>> for ConnectionProperties {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }
}

// Keep passwords out of logs.
impl fmt::Debug for ConnectionProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.entries {
            if key.eq_ignore_ascii_case(PASSWORD_PROPERTY) {
                map.entry(key, &"***");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

/// An open connection to an engine.
pub trait Connection {
    /// Execute a statement, returning its update count.
    fn execute(&mut self, sql: &str) -> Result<u64, EngineError>;
}

/// Something that can open connections.
pub trait Driver {
    /// Open a connection to `url`.
    fn connect(
        &self,
        url: &str,
        properties: &ConnectionProperties,
    ) -> Result<Box<dyn Connection>, EngineError>;
}

/// An engine build.
pub trait Engine: Driver {
    /// Build identifier of this engine. Written to the version marker after a
    /// successful migration.
    fn build_id(&self) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials() {
        let props = ConnectionProperties::credentials("sa", "secret");
        assert_eq!(props.user(), Some("sa"));
        assert_eq!(props.password(), Some("secret"));
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let props = ConnectionProperties::new().with("CIPHER", "AES");
        assert_eq!(props.get("cipher"), Some("AES"));
        assert_eq!(props.get("Cipher"), Some("AES"));
        assert_eq!(props.get("file_lock"), None);
    }

    #[test]
    fn test_debug_masks_password() {
        let props = ConnectionProperties::credentials("sa", "hunter2");
        let rendered = format!("{:?}", props);
        assert!(rendered.contains("sa"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_set_replaces() {
        let mut props = ConnectionProperties::new();
        props.set("user", "a");
        props.set("user", "b");
        assert_eq!(props.user(), Some("b"));
        assert_eq!(props.len(), 1);
    }
}
