use std::error::Error;
use std::io;
use thiserror::Error;

/// Boxed error returned by filters, handlers and pluggable collaborators.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Result of a filter or handler invocation.
pub type HandlerResult = Result<(), BoxError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("form decode error: {reason}")]
    Form { reason: String },

    #[error("template error: {reason}")]
    Template { reason: String },

    #[error("session error: {reason}")]
    Session { reason: String },
}

impl EngineError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn form<S: ToString>(str: S) -> Self {
        Self::Form { reason: str.to_string() }
    }

    pub fn template<S: ToString>(str: S) -> Self {
        Self::Template { reason: str.to_string() }
    }

    pub fn session<S: ToString>(str: S) -> Self {
        Self::Session { reason: str.to_string() }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("failed to parse config: {source}")]
    Parse {
        #[from]
        source: toml::de::Error,
    },
}
