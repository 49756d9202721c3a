//! Ephemeral session store
//!
//! The idempotency markers and pending intents must survive a hard reload
//! within one browsing context but are otherwise best-effort: the backend's
//! own idempotency is the real guarantee, the session store only prevents
//! duplicate user-visible effects. The trait keeps the backing store
//! swappable (in-memory map, persisted file, embedded key-value store) so
//! business logic never touches it as ambient global state.

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Error;

/// Valid ASCII characters for namespace and key strings in the session store
pub const SESSION_KEY_ALPHABET: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_-";

/// Maximum length for namespace and key strings in the session store
pub const SESSION_KEY_MAX_LEN: usize = 120;

/// Validates that a string contains only valid store characters and is within
/// length limits
pub fn validate_session_key(s: &str) -> Result<(), Error> {
    if s.is_empty() {
        return Err(Error::SessionKey("key must not be empty".to_string()));
    }

    if s.len() > SESSION_KEY_MAX_LEN {
        return Err(Error::SessionKey(format!(
            "`{s}` exceeds the maximum of {SESSION_KEY_MAX_LEN} characters"
        )));
    }

    if !s.chars().all(|c| SESSION_KEY_ALPHABET.contains(c)) {
        return Err(Error::SessionKey(format!(
            "`{s}` contains characters outside the allowed alphabet"
        )));
    }

    Ok(())
}

/// Session-scoped key-value store
///
/// Implementations are free to persist however they like as long as values
/// written in one context instance are visible to a later instance of the
/// same browsing session.
#[async_trait]
pub trait SessionStore: Debug + Send + Sync {
    /// Read a value
    async fn read(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Write a value
    async fn write(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), Error>;

    /// Remove a value; removing an absent key is not an error
    async fn remove(&self, namespace: &str, key: &str) -> Result<(), Error>;

    /// List keys in a namespace
    async fn list(&self, namespace: &str) -> Result<Vec<String>, Error>;
}

/// In-memory [`SessionStore`]
///
/// Shared by cloning; clones see the same underlying map, which is what a
/// second mount of the same screen within one session observes.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    entries: std::sync::Arc<RwLock<HashMap<(String, String), Vec<u8>>>>,
}

impl InMemorySessionStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn read(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, Error> {
        validate_session_key(namespace)?;
        validate_session_key(key)?;

        Ok(self
            .entries
            .read()
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    async fn write(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), Error> {
        validate_session_key(namespace)?;
        validate_session_key(key)?;

        self.entries
            .write()
            .insert((namespace.to_string(), key.to_string()), value.to_vec());

        Ok(())
    }

    async fn remove(&self, namespace: &str, key: &str) -> Result<(), Error> {
        validate_session_key(namespace)?;
        validate_session_key(key)?;

        self.entries
            .write()
            .remove(&(namespace.to_string(), key.to_string()));

        Ok(())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<String>, Error> {
        validate_session_key(namespace)?;

        let mut keys: Vec<String> = self
            .entries
            .read()
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();

        Ok(keys)
    }
}
