//! Panel API layer
//!
//! - `session`: authenticated transport pair for one (panel, surface)
//! - `application`: typed Application surface handle
//! - `server`: client server model and its per-server operations
//! - `models`: serde data holders for both surfaces

pub mod application;
pub mod models;
pub mod server;
pub mod session;

pub use application::{ApplicationApi, NewUser};
pub use server::ClientServer;
pub use session::{PanelSession, TrackedSocket};
