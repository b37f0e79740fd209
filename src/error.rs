use thiserror::Error;

use crate::core::hooks::Surface;

/// Unified error type for panel access
#[derive(Error, Debug)]
pub enum HubError {
    /// The request never produced a response (DNS, connect, timeout)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The panel answered with a non-success status
    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No panel with this id is configured
    #[error("Unknown panel: {0}")]
    UnknownPanel(String),

    /// The panel has no credential for the requested surface
    #[error("{surface} API is not configured for panel {panel}")]
    NotConfigured { panel: String, surface: Surface },

    /// A panel-bound handle was given an entity that belongs to another panel
    #[error("Scope error: handle bound to panel '{expected}' cannot address entities of panel '{actual}'")]
    Scope { expected: String, actual: String },

    /// The session was closed by the registry
    #[error("Session for panel {0} is closed")]
    SessionClosed(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, HubError>;

impl HubError {
    /// Scope errors are programmer errors and must not be retried
    pub fn is_scope(&self) -> bool {
        matches!(self, HubError::Scope { .. })
    }
}

impl From<toml::de::Error> for HubError {
    fn from(err: toml::de::Error) -> Self {
        HubError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for HubError {
    fn from(err: reqwest::Error) -> Self {
        HubError::Transport(err.to_string())
    }
}
