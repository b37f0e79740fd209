//! Aggregation core
//!
//! - Transport traits the rest of the crate is written against
//! - Panel registry with cross-panel fan-out
//! - Application directory cache
//! - Console capture protocol
//! - Console socket tracking

pub mod console;
pub mod directory;
pub mod hooks;
pub mod registry;
mod sockets;

pub use console::{CaptureFailure, CaptureOutcome, ConsoleCapture, DEFAULT_CAPTURE_TIMEOUT};
pub use directory::{ApplicationDirectory, Completeness, Entity, EntityKind, ServerLinks};
pub use hooks::{PanelId, Surface};
pub use registry::{PanelRegistry, PanelRegistryBuilder};
pub use sockets::{SocketId, SocketTracker};
