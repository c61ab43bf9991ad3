//! Server-side sessions.
//!
//! A [`Session`] is a JSON key-value map plus a reserved last-access timestamp. The durable
//! copy lives in a [`SessionStore`]; [`SessionManager`] correlates requests with stored
//! sessions through a cookie, attaches the session before a handler runs and writes it back
//! once the response is complete.
//!
//! Two stores are built in: [`MemoryStore`] (in-process, swept periodically) and
//! [`FileStore`] (one JSON file per session id). The manager picks the file store when a
//! session directory is configured and the memory store otherwise.

mod file;
mod id;
mod manager;
mod memory;

pub use file::FileStore;
pub use id::{generate_session_id, generate_unique_id};
pub use manager::SessionManager;
pub use memory::{MemoryStore, Sweeper};

use crate::error::EngineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Name of the reserved last-access field in the serialized form.
pub const LAST_ACCESS_KEY: &str = "__lastAccessTime";

/// Persistence backend for sessions.
///
/// A missing session is `Ok(None)`; errors are reserved for real I/O failures and are
/// logged by the caller, never surfaced to the client.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Session>, EngineError>;

    async fn set(&self, id: &str, session: &Session) -> Result<(), EngineError>;

    async fn delete(&self, id: &str) -> Result<(), EngineError>;
}

#[async_trait]
impl<S: SessionStore + ?Sized> SessionStore for std::sync::Arc<S> {
    async fn get(&self, id: &str) -> Result<Option<Session>, EngineError> {
        (**self).get(id).await
    }

    async fn set(&self, id: &str, session: &Session) -> Result<(), EngineError> {
        (**self).set(id, session).await
    }

    async fn delete(&self, id: &str) -> Result<(), EngineError> {
        (**self).delete(id).await
    }
}

#[async_trait]
impl<S: SessionStore + ?Sized> SessionStore for Box<S> {
    async fn get(&self, id: &str) -> Result<Option<Session>, EngineError> {
        (**self).get(id).await
    }

    async fn set(&self, id: &str, session: &Session) -> Result<(), EngineError> {
        (**self).set(id, session).await
    }

    async fn delete(&self, id: &str) -> Result<(), EngineError> {
        (**self).delete(id).await
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "__lastAccessTime", default)]
    last_access: u64,
    #[serde(flatten)]
    data: Map<String, Value>,
}

impl Session {
    /// Creates an empty session stamped with the current time.
    pub fn new() -> Self {
        Self { last_access: now_millis(), data: Map::new() }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Reads a value and deserializes it, `None` when absent or of another shape.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data.get(key).and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Stores a value, returning the previous one. The reserved timestamp key is refused.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        if key == LAST_ACCESS_KEY {
            warn!(key = %key, "refusing to overwrite reserved session key");
            return None;
        }
        self.data.insert(key, value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Milliseconds since the unix epoch of the last access.
    pub fn last_access(&self) -> u64 {
        self.last_access
    }

    pub fn touch(&mut self) {
        self.last_access = now_millis();
    }

    /// `true` when the last access is older than `timeout`.
    pub fn is_expired(&self, timeout: Duration) -> bool {
        idle_for(self.last_access) > timeout
    }

    #[cfg(test)]
    pub(crate) fn with_last_access(mut self, last_access: u64) -> Self {
        self.last_access = last_access;
        self
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

pub(crate) fn idle_for(timestamp_millis: u64) -> Duration {
    Duration::from_millis(now_millis().saturating_sub(timestamp_millis))
}
