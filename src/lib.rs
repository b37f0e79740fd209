//! Multi-panel client for Pterodactyl-style hosting panels
//!
//! Architecture:
//! - `core/`: registry, application directory, console capture, transport traits
//! - `api/`: per-panel sessions, application handles, server models
//! - `transport/`: reqwest and tokio-tungstenite implementations
//! - `config`, `logger`, `error`: ambient plumbing shared by the binary

pub mod api;
pub mod config;
pub mod core;
pub mod error;
pub mod logger;
pub mod transport;

pub use crate::api::{ApplicationApi, ClientServer, NewUser, PanelSession};
pub use crate::config::{HubConfig, PanelConfig, TransportSettings};
pub use crate::core::console::outcome_to_wire;
pub use crate::core::{
    ApplicationDirectory, CaptureFailure, CaptureOutcome, Completeness, EntityKind, PanelRegistry,
    Surface,
};
pub use crate::error::{HubError, Result};
