use crate::error::EngineError;
use crate::session::id::{SEPARATOR, timestamp_of};
use crate::session::{Session, SessionStore, idle_for};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Session store keeping one JSON file per session id inside a directory.
///
/// Expired files are not removed automatically, the embedding application schedules
/// [`FileStore::clear`].
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    id_length: usize,
    timeout: Duration,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>, id_length: usize, timeout: Duration) -> Self {
        Self { dir: dir.into(), id_length, timeout }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, id: &str) -> Result<PathBuf, EngineError> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(EngineError::session(format!("invalid session id '{id}'")));
        }
        Ok(self.dir.join(id))
    }

    /// Deletes session files created more than 24x the timeout ago.
    ///
    /// Only files whose name looks like a session id (configured length, timestamp prefix)
    /// are considered. Returns the number of deleted files.
    pub async fn clear(&self) -> Result<usize, EngineError> {
        let max_age = self.timeout.saturating_mul(24);
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.len() != self.id_length || !name.contains(SEPARATOR) {
                continue;
            }
            let Some(created) = timestamp_of(name) else {
                continue;
            };
            if idle_for(created) <= max_age {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(file = %name, cause = %e, "failed to remove expired session file"),
            }
        }

        debug!(removed, dir = %self.dir.display(), "cleared expired session files");
        Ok(removed)
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn get(&self, id: &str) -> Result<Option<Session>, EngineError> {
        let path = self.path_of(id)?;
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&content) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(id, cause = %e, "corrupt session file, treating as empty");
                Ok(None)
            }
        }
    }

    async fn set(&self, id: &str, session: &Session) -> Result<(), EngineError> {
        let path = self.path_of(id)?;
        let content = serde_json::to_vec(session).map_err(EngineError::session)?;
        match tokio::fs::write(&path, &content).await {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&self.dir).await?;
                tokio::fs::write(&path, &content).await?;
            }
            result => result?,
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), EngineError> {
        let path = self.path_of(id)?;
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
