//! Configuration module
//!
//! CLI argument parsing with environment variable support, plus the TOML panels
//! file that lists every panel the registry talks to.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::HubError;

/// Parse duration string (e.g., "5s", "2m") or plain seconds
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    if let Ok(d) = humantime::parse_duration(s) {
        return Ok(d);
    }
    s.parse::<u64>().map(Duration::from_secs).map_err(|_| {
        format!(
            "Invalid duration '{}'. Use formats like '5s', '2m', '1h' or plain seconds",
            s
        )
    })
}

/// Default panels file
const DEFAULT_CONFIG_FILE: &str = "ptero-hub.toml";

/// CLI arguments
///
/// Supports environment variables with PTERO_HUB_ prefix
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Query and control servers across several panels")]
#[command(rename_all = "snake_case")]
pub struct CliArgs {
    /// Panels file (.toml) with one [[panels]] entry per panel
    #[arg(short = 'c', long = "config_file", env = "PTERO_HUB_CONFIG_FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: PathBuf,

    /// HTTP request timeout (e.g., "15s", default: 15s)
    #[arg(long = "request_timeout", env = "PTERO_HUB_REQUEST_TIMEOUT", default_value = "15s", value_parser = parse_duration)]
    pub request_timeout: Duration,

    /// Console websocket connect timeout (default: 10s)
    #[arg(long = "connect_timeout", env = "PTERO_HUB_CONNECT_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub connect_timeout: Duration,

    /// Log mode: trace, debug, info, warn, error (default: info)
    #[arg(long = "log_mode", env = "PTERO_HUB_LOG_MODE", default_value = "info")]
    pub log_mode: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List servers from every panel with a client key
    Servers {
        /// Skip resource and node/owner resolution
        #[arg(long)]
        fast: bool,
    },
    /// Show one server, searching panels in configuration order
    Server { id: String },
    /// Send a console command and print the first line of output
    Command {
        id: String,
        command: String,
        /// How long to wait for console output (default: 5s)
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },
    /// List nodes of one panel through its application API
    Nodes { panel: String },
}

impl CliArgs {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the CLI arguments
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(anyhow!("request_timeout must be greater than 0"));
        }
        if self.connect_timeout.is_zero() {
            return Err(anyhow!("connect_timeout must be greater than 0"));
        }
        if let Command::Command {
            timeout: Some(timeout),
            ..
        } = &self.command
        {
            if timeout.is_zero() {
                return Err(anyhow!("command timeout must be greater than 0"));
            }
        }
        if !self.config_file.exists() {
            return Err(anyhow!(
                "Panels file not found: {}",
                self.config_file.display()
            ));
        }
        let ext = self
            .config_file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        if !ext.eq_ignore_ascii_case("toml") {
            return Err(anyhow!(
                "Invalid panels file format: expected .toml extension"
            ));
        }
        Ok(())
    }

    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            request_timeout: self.request_timeout,
            connect_timeout: self.connect_timeout,
        }
    }
}

/// Timeouts applied by the default transports
#[derive(Debug, Clone, Copy)]
pub struct TransportSettings {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// One panel installation
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct PanelConfig {
    /// Routing key, unique within a registry
    pub id: String,
    /// API root, e.g. `https://panel.example.com/api`
    pub base_url: String,
    /// Client API key; without it client operations are disabled for the panel
    #[serde(default)]
    pub client_key: Option<String>,
    /// Application API key; without it application operations are disabled
    #[serde(default)]
    pub app_key: Option<String>,
}

impl fmt::Debug for PanelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("PanelConfig")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .field("client_key", &redact(&self.client_key))
            .field("app_key", &redact(&self.app_key))
            .finish()
    }
}

impl PanelConfig {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            client_key: None,
            app_key: None,
        }
    }

    pub fn with_client_key(mut self, key: impl Into<String>) -> Self {
        self.client_key = Some(key.into());
        self
    }

    pub fn with_app_key(mut self, key: impl Into<String>) -> Self {
        self.app_key = Some(key.into());
        self
    }

    /// Client key, ignoring blank values
    pub fn client_key(&self) -> Option<&str> {
        self.client_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    /// Application key, ignoring blank values
    pub fn app_key(&self) -> Option<&str> {
        self.app_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    /// `scheme://host[:port]` of the base URL, sent as the websocket Origin
    pub fn origin(&self) -> Result<String, HubError> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| HubError::Config(format!("invalid base_url for panel {}: {}", self.id, e)))?;
        Ok(url.origin().ascii_serialization())
    }

    fn validate(&self) -> Result<(), HubError> {
        if self.id.trim().is_empty() {
            return Err(HubError::Config("panel id must not be empty".to_string()));
        }
        let url = Url::parse(&self.base_url).map_err(|e| {
            HubError::Config(format!("invalid base_url for panel {}: {}", self.id, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(HubError::Config(format!(
                "base_url for panel {} must use http or https",
                self.id
            )));
        }
        Ok(())
    }
}

/// Panels file contents
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub panels: Vec<PanelConfig>,
}

impl HubConfig {
    pub fn new(panels: Vec<PanelConfig>) -> Self {
        Self { panels }
    }

    /// Load and validate a panels file
    pub fn load(path: &Path) -> Result<Self, HubError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HubError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, HubError> {
        let config: HubConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject empty or duplicate ids and malformed URLs
    pub fn validate(&self) -> Result<(), HubError> {
        let mut seen = HashSet::new();
        for panel in &self.panels {
            panel.validate()?;
            if !seen.insert(panel.id.as_str()) {
                return Err(HubError::Config(format!(
                    "duplicate panel id '{}'",
                    panel.id
                )));
            }
        }
        Ok(())
    }
}
