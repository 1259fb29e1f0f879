//! Versioned key naming for the shared store.

use std::fmt;

/// A versioned key namespace.
///
/// Bumping the version lets a new serialization format roll out next to
/// data written by older processes instead of rewriting it in place.
/// Callers receive their namespace as configuration; nothing in the
/// pipeline hardcodes a storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    name: String,
    version: u32,
}

impl Keyspace {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Storage key for the namespace itself, e.g. `post_recommended/v2`.
    pub fn key(&self) -> String {
        format!("{}/v{}", self.name, self.version)
    }

    /// Storage key scoped to one owner, e.g. `cached_sessions/v2:user:7`.
    pub fn scoped(&self, owner: &str) -> String {
        format!("{}/v{}:{}", self.name, self.version, owner)
    }
}

impl fmt::Display for Keyspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}
