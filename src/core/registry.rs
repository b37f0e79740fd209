//! Panel registry
//!
//! Owns one session per configured (panel, surface) and fans client queries
//! out across panels:
//! - results keep panel configuration order
//! - a failing panel is logged and contributes nothing
//! - `close` releases every session exactly once

use futures_util::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::api::server::PanelRoute;
use crate::api::{ApplicationApi, ClientServer, PanelSession};
use crate::config::{HubConfig, PanelConfig, TransportSettings};
use crate::core::directory::ApplicationDirectory;
use crate::core::hooks::{ApiRequest, Surface, TransportFactory};
use crate::error::{HubError, Result};
use crate::logger::log;
use crate::transport::DefaultTransportFactory;

struct PanelEntry {
    config: PanelConfig,
    route: Option<Arc<PanelRoute>>,
    application: Option<ApplicationApi>,
}

pub struct PanelRegistry {
    panels: Vec<PanelEntry>,
    directory: Arc<ApplicationDirectory>,
    closed: AtomicBool,
}

/// Builder for [`PanelRegistry`]
pub struct PanelRegistryBuilder {
    panels: Vec<PanelConfig>,
    factory: Option<Arc<dyn TransportFactory>>,
}

impl PanelRegistryBuilder {
    pub fn panel(mut self, panel: PanelConfig) -> Self {
        self.panels.push(panel);
        self
    }

    pub fn panels(mut self, panels: impl IntoIterator<Item = PanelConfig>) -> Self {
        self.panels.extend(panels);
        self
    }

    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Build the registry. Duplicate or malformed panels are rejected.
    pub fn build(self) -> Result<PanelRegistry> {
        let config = HubConfig::new(self.panels);
        config.validate()?;
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(DefaultTransportFactory::default()));

        let mut applications = Vec::with_capacity(config.panels.len());
        for panel in &config.panels {
            let application = match panel.app_key() {
                Some(key) => {
                    let session = PanelSession::new(
                        panel,
                        Surface::Application,
                        factory.http(panel, Surface::Application, key)?,
                        factory.sockets(panel),
                    )?;
                    Some(ApplicationApi::new(Arc::new(session)))
                }
                None => None,
            };
            applications.push(application);
        }

        let directory = Arc::new(ApplicationDirectory::new(
            applications.iter().flatten().cloned(),
        ));

        let mut panels = Vec::with_capacity(config.panels.len());
        for (panel, application) in config.panels.into_iter().zip(applications) {
            let route = match panel.client_key() {
                Some(key) => {
                    let session = PanelSession::new(
                        &panel,
                        Surface::Client,
                        factory.http(&panel, Surface::Client, key)?,
                        factory.sockets(&panel),
                    )?;
                    Some(Arc::new(PanelRoute {
                        panel_id: panel.id.clone(),
                        client: Arc::new(session),
                        directory: directory.clone(),
                    }))
                }
                None => None,
            };
            log::info!(
                panel = %panel.id,
                client = route.is_some(),
                application = application.is_some(),
                "Panel registered"
            );
            panels.push(PanelEntry {
                config: panel,
                route,
                application,
            });
        }

        Ok(PanelRegistry {
            panels,
            directory,
            closed: AtomicBool::new(false),
        })
    }
}

impl PanelRegistry {
    pub fn builder() -> PanelRegistryBuilder {
        PanelRegistryBuilder {
            panels: Vec::new(),
            factory: None,
        }
    }

    /// Registry over the reqwest and tungstenite transports
    pub fn from_config(config: &HubConfig, settings: TransportSettings) -> Result<Self> {
        Self::builder()
            .panels(config.panels.iter().cloned())
            .transport_factory(Arc::new(DefaultTransportFactory::new(settings)))
            .build()
    }

    pub fn panels(&self) -> impl Iterator<Item = &PanelConfig> {
        self.panels.iter().map(|entry| &entry.config)
    }

    pub fn directory(&self) -> &Arc<ApplicationDirectory> {
        &self.directory
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Console sockets currently open across all panels
    pub fn open_sockets(&self) -> usize {
        self.client_routes()
            .map(|route| route.client.open_sockets())
            .sum()
    }

    fn client_routes(&self) -> impl Iterator<Item = &Arc<PanelRoute>> {
        self.panels.iter().filter_map(|entry| entry.route.as_ref())
    }

    /// Handle for one panel's application surface
    pub fn application_api(&self, panel_id: &str) -> Result<&ApplicationApi> {
        let entry = self
            .panels
            .iter()
            .find(|entry| entry.config.id == panel_id)
            .ok_or_else(|| HubError::UnknownPanel(panel_id.to_string()))?;
        entry
            .application
            .as_ref()
            .ok_or_else(|| HubError::NotConfigured {
                panel: panel_id.to_string(),
                surface: Surface::Application,
            })
    }

    /// Every application handle, in configuration order
    pub fn application_apis(&self) -> impl Iterator<Item = &ApplicationApi> {
        self.panels
            .iter()
            .filter_map(|entry| entry.application.as_ref())
    }

    /// Servers of every panel with a client key.
    ///
    /// With `fast` the models carry no resources, node or owner.
    pub async fn get_servers(&self, fast: bool) -> Vec<ClientServer> {
        let fetches = self
            .client_routes()
            .map(|route| Self::panel_servers(route, fast));
        join_all(fetches).await.into_iter().flatten().collect()
    }

    async fn panel_servers(route: &Arc<PanelRoute>, fast: bool) -> Vec<ClientServer> {
        let values = match route.client.paginate("client", &[]).await {
            Ok(values) => values,
            Err(e) => {
                log::panel_failure(&route.panel_id, "get_servers", &e.to_string());
                return Vec::new();
            }
        };

        let servers: Vec<ClientServer> = values
            .iter()
            .filter_map(|value| match ClientServer::from_value(value, route.clone()) {
                Ok(server) => Some(server),
                Err(e) => {
                    log::warn!(panel = %route.panel_id, error = %e, "Skipping malformed server");
                    None
                }
            })
            .collect();

        if fast {
            return servers;
        }

        join_all(servers.iter().map(|server| server.resolve()))
            .await
            .into_iter()
            .zip(&servers)
            .filter_map(|(result, server)| match result {
                Ok(resolved) => Some(resolved),
                Err(e) => {
                    log::warn!(
                        panel = %route.panel_id,
                        server = %server.identifier(),
                        error = %e,
                        "Dropping server that failed to resolve"
                    );
                    None
                }
            })
            .collect()
    }

    /// First panel, in configuration order, that answers 2xx for `id`
    async fn probe(&self, id: &str) -> Option<(&Arc<PanelRoute>, serde_json::Value)> {
        for route in self.client_routes() {
            let request = ApiRequest::get(format!("client/servers/{}", id));
            match route.client.send(request).await {
                Ok(response) if response.is_success() => match response.value() {
                    Ok(value) => return Some((route, value)),
                    Err(e) => {
                        log::panel_failure(&route.panel_id, "get_server", &e.to_string());
                    }
                },
                Ok(response) => {
                    log::debug!(
                        panel = %route.panel_id,
                        server = %id,
                        status = response.status.as_u16(),
                        "Server not on panel"
                    );
                }
                Err(e) => log::panel_failure(&route.panel_id, "get_server", &e.to_string()),
            }
        }
        None
    }

    /// Fully resolved server from the first panel that knows `id`
    pub async fn get_server(&self, id: &str) -> Result<Option<ClientServer>> {
        let Some((route, value)) = self.probe(id).await else {
            return Ok(None);
        };
        let server = ClientServer::from_value(&value, route.clone())?;
        Ok(Some(server.resolve().await?))
    }

    /// Whether any panel knows `id`, without resolving it
    pub async fn validate_server_id(&self, id: &str) -> bool {
        self.probe(id).await.is_some()
    }

    /// Resolve several ids concurrently; unknown ids are dropped, order is kept
    pub async fn get_servers_from_list<S: AsRef<str>>(&self, ids: &[S]) -> Vec<ClientServer> {
        join_all(ids.iter().map(|id| self.get_server(id.as_ref())))
            .await
            .into_iter()
            .zip(ids)
            .filter_map(|(result, id)| match result {
                Ok(server) => server,
                Err(e) => {
                    let id: &str = id.as_ref();
                    log::warn!(server = %id, error = %e, "Server lookup failed");
                    None
                }
            })
            .collect()
    }

    /// Close every session. Later calls are no-ops.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut closed = 0;
        for entry in &self.panels {
            if let Some(route) = &entry.route {
                if route.client.close().await {
                    closed += 1;
                }
            }
            if let Some(application) = &entry.application {
                if application.session().close().await {
                    closed += 1;
                }
            }
        }
        log::info!(sessions = closed, "Panel registry closed");
    }
}

impl Drop for PanelRegistry {
    fn drop(&mut self) {
        if !self.is_closed() {
            log::warn!("Panel registry dropped without close()");
        }
    }
}
