//! Transport layer
//!
//! Default network implementations of the core transport traits:
//! - HTTP (reqwest, one client per panel surface)
//! - WebSocket (tokio-tungstenite, one socket per console capture)

mod http;
mod ws;

pub use http::ReqwestTransport;
pub use ws::{TungsteniteConnector, TungsteniteSocket};

use std::sync::Arc;

use crate::config::{PanelConfig, TransportSettings};
use crate::core::hooks::{HttpTransport, SocketConnector, Surface, TransportFactory};
use crate::error::Result;

/// Builds reqwest and tungstenite transports
#[derive(Debug, Clone, Default)]
pub struct DefaultTransportFactory {
    settings: TransportSettings,
}

impl DefaultTransportFactory {
    pub fn new(settings: TransportSettings) -> Self {
        Self { settings }
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn http(
        &self,
        panel: &PanelConfig,
        _surface: Surface,
        api_key: &str,
    ) -> Result<Arc<dyn HttpTransport>> {
        let transport =
            ReqwestTransport::new(&panel.base_url, api_key, self.settings.request_timeout)?;
        Ok(Arc::new(transport))
    }

    fn sockets(&self, _panel: &PanelConfig) -> Arc<dyn SocketConnector> {
        Arc::new(TungsteniteConnector::new(self.settings.connect_timeout))
    }
}
