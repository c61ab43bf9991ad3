//! Engine configuration.
//!
//! [`ServerConfig`] is deserialized from TOML. Every key is optional and falls back to
//! [`ServerConfig::default`]. A typical document:
//!
//! ```toml
//! root = "."
//! home = "./public"
//! port = 8080
//! listDir = false
//! cache = true
//! templateCache = true
//! showError = false
//! defaultPage = "index.html"
//! 404 = "/templates/404.html"
//! sessionTimeout = 1440
//! sessionDir = "/var/lib/site/sessions"
//! sessionLength = 36
//! serverID = "a1"
//! ```

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Server root, templates named with a leading `/` resolve against it.
    pub root: PathBuf,
    /// Document root for static files and relative template names.
    pub home: PathBuf,
    pub host: String,
    pub port: u16,
    pub https_port: Option<u16>,
    pub https_key: Option<PathBuf>,
    pub https_cert: Option<PathBuf>,
    pub list_dir: bool,
    /// Enables `304 Not Modified` answers for static files.
    pub cache: bool,
    pub debug: bool,
    pub template_cache: bool,
    pub show_error: bool,
    pub default_page: Option<String>,
    /// Template rendered for 404 responses.
    #[serde(rename = "404")]
    pub not_found: Option<String>,
    /// Session validity window, in seconds.
    pub session_timeout: u64,
    pub session_dir: Option<PathBuf>,
    pub session_domain: Option<String>,
    pub session_length: usize,
    pub session_cookie: String,
    pub upload_dir: Option<PathBuf>,
    #[serde(rename = "serverID")]
    pub server_id: String,
    /// Upper bound for a single request, in seconds.
    pub request_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            home: PathBuf::from("."),
            host: "127.0.0.1".into(),
            port: 8080,
            https_port: None,
            https_key: None,
            https_cert: None,
            list_dir: false,
            cache: true,
            debug: false,
            template_cache: true,
            show_error: false,
            default_page: Some("index.html".into()),
            not_found: None,
            session_timeout: 1440,
            session_dir: None,
            session_domain: None,
            session_length: 36,
            session_cookie: "SESSIONID".into(),
            upload_dir: None,
            server_id: String::new(),
            request_timeout: 30,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn https_enabled(&self) -> bool {
        self.https_port.is_some() || self.https_key.is_some() || self.https_cert.is_some()
    }
}
