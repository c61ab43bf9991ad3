use crate::config::ServerConfig;
use crate::cookies::CookieOptions;
use crate::request::RequestContext;
use crate::response::ResponseContext;
use crate::session::{FileStore, MemoryStore, Session, SessionStore, Sweeper, generate_session_id};
use arc_swap::ArcSwap;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Correlates requests with stored sessions through the session cookie.
pub struct SessionManager {
    store: ArcSwap<Box<dyn SessionStore>>,
    timeout: Duration,
    id_length: usize,
    cookie_name: String,
    domain: Option<String>,
    server_id: String,
    /// Built-in memory store still waiting for its sweep task.
    memory: Option<Arc<MemoryStore>>,
    sweeper: OnceCell<Sweeper>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("timeout", &self.timeout)
            .field("id_length", &self.id_length)
            .field("cookie_name", &self.cookie_name)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Uses a [`FileStore`] when `sessionDir` is configured, a swept [`MemoryStore`] otherwise.
    ///
    /// The memory sweep starts with the first hydrated request, so the manager can be built
    /// outside a Tokio runtime.
    pub fn from_config(config: &ServerConfig) -> Self {
        let timeout = config.session_timeout();
        match &config.session_dir {
            Some(dir) => {
                info!(dir = %dir.display(), "using file session store");
                Self::with_store(config, FileStore::new(dir, config.session_length, timeout))
            }
            None => {
                let memory = Arc::new(MemoryStore::new());
                Self::assemble(config, Box::new(Arc::clone(&memory)), Some(memory))
            }
        }
    }

    pub fn with_store(config: &ServerConfig, store: impl SessionStore + 'static) -> Self {
        Self::assemble(config, Box::new(store), None)
    }

    fn assemble(config: &ServerConfig, store: Box<dyn SessionStore>, memory: Option<Arc<MemoryStore>>) -> Self {
        Self {
            store: ArcSwap::from_pointee(store),
            timeout: config.session_timeout(),
            id_length: config.session_length,
            cookie_name: config.session_cookie.clone(),
            domain: config.session_domain.clone(),
            server_id: config.server_id.clone(),
            memory,
            sweeper: OnceCell::new(),
        }
    }

    /// Overrides the validity window taken from the configuration.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Swaps the active store. Requests already holding the previous store finish with it.
    pub fn replace_store(&self, store: impl SessionStore + 'static) {
        let store: Box<dyn SessionStore> = Box::new(store);
        self.store.store(Arc::new(store));
        info!("session store replaced");
    }

    pub fn store(&self) -> Arc<Box<dyn SessionStore>> {
        self.store.load_full()
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Attaches the session referenced by the request cookie, or a new one.
    ///
    /// A stored session is accepted when it exists and was accessed within the timeout;
    /// otherwise the stale entry is deleted and a fresh session is issued with a new cookie.
    pub async fn hydrate(&self, req: &mut RequestContext, resp: &mut ResponseContext) {
        self.start_sweeper();
        let store = self.store.load_full();

        let candidate = req.cookie(&self.cookie_name).filter(|id| id.len() == self.id_length).map(str::to_string);
        if let Some(id) = candidate {
            match store.get(&id).await {
                Ok(Some(mut session)) if !session.is_expired(self.timeout) => {
                    session.touch();
                    req.attach_session(id, session);
                    return;
                }
                Ok(_) => {
                    debug!(id = %id, "session missing or expired");
                    if let Err(e) = store.delete(&id).await {
                        warn!(id = %id, cause = %e, "failed to delete expired session");
                    }
                }
                Err(e) => warn!(id = %id, cause = %e, "failed to load session"),
            }
        }

        self.create(req, resp);
    }

    fn start_sweeper(&self) {
        if let Some(memory) = &self.memory {
            self.sweeper.get_or_init(|| {
                debug!(timeout = ?self.timeout, "starting memory session sweeper");
                memory.spawn_sweeper(self.timeout)
            });
        }
    }

    fn create(&self, req: &mut RequestContext, resp: &mut ResponseContext) {
        let id = generate_session_id(self.id_length, &self.server_id);

        let mut options = CookieOptions::default().path("/").http_only(true);
        if let Some(domain) = &self.domain {
            options = options.domain(domain.clone());
        }
        resp.set_cookie(&self.cookie_name, Some(&id), &options);

        debug!(id = %id, "created session");
        req.attach_session(id, Session::new());
    }

    /// Writes the attached session back to the store, if any.
    pub async fn persist(&self, req: &mut RequestContext) {
        let Some(active) = req.take_session() else {
            return;
        };
        let store = self.store.load_full();
        if let Err(e) = store.set(&active.id, &active.session).await {
            error!(id = %active.id, cause = %e, "failed to persist session");
        }
    }
}
