use crate::error::EngineError;
use crate::session::{Session, SessionStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

/// In-process session store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: DashMap<String, Session>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Removes every session idle for longer than `max_idle`, returning how many were removed.
    pub fn sweep(&self, max_idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(max_idle));
        before.saturating_sub(self.sessions.len())
    }

    /// Starts the periodic sweep for a session `timeout`.
    ///
    /// The sweep runs every 4x `timeout` and evicts sessions idle for more than 2x `timeout`,
    /// so a session is never evicted while a request could still accept it. Must be called
    /// within a Tokio runtime; the task stops when the returned [`Sweeper`] or the store is
    /// dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, timeout: Duration) -> Sweeper {
        let store: Weak<Self> = Arc::downgrade(self);
        let interval = timeout.saturating_mul(4).max(Duration::from_millis(10));
        let max_idle = timeout.saturating_mul(2);

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let removed = store.sweep(max_idle);
                if removed > 0 {
                    debug!(removed, remaining = store.len(), "swept expired sessions");
                }
            }
        });

        Sweeper { handle }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Session>, EngineError> {
        Ok(self.sessions.get(id).map(|entry| entry.value().clone()))
    }

    async fn set(&self, id: &str, session: &Session) -> Result<(), EngineError> {
        self.sessions.insert(id.to_string(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), EngineError> {
        self.sessions.remove(id);
        Ok(())
    }
}

/// Handle of the background sweep task, aborts the task when dropped.
#[derive(Debug)]
pub struct Sweeper {
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::session::{Session, SessionStore, now_millis};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn get_set_delete() {
        let store = MemoryStore::new();
        assert!(store.get("a").await.unwrap().is_none());

        let mut session = Session::new();
        session.set("k", "v");
        store.set("a", &session).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(session));

        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn sweep_uses_given_idle_bound() {
        let store = MemoryStore::new();
        let now = now_millis();
        store.set("fresh", &Session::new()).await.unwrap();
        store.set("grace", &Session::new().with_last_access(now - 90_000)).await.unwrap();
        store.set("stale", &Session::new().with_last_access(now - 200_000)).await.unwrap();

        // timeout 60s: the sweeper evicts beyond 120s of idleness
        let removed = store.sweep(Duration::from_secs(120));
        assert_eq!(removed, 1);
        assert!(store.get("grace").await.unwrap().is_some());
        assert!(store.get("stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sweeper_runs_periodically() {
        let store = Arc::new(MemoryStore::new());
        let stale = Session::new().with_last_access(now_millis() - 10_000);
        store.set("stale", &stale).await.unwrap();

        let _sweeper = store.spawn_sweeper(Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(store.is_empty());
    }
}
