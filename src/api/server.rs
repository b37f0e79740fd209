//! Client server model
//!
//! A server as seen through one panel's client surface, optionally merged with
//! its live resources and its Application-side node and owner. The model keeps
//! a route back to its panel so follow-up calls always use that panel's
//! credentials.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::core::console::{
    outcome_to_wire, CaptureOutcome, ConsoleCapture, DEFAULT_CAPTURE_TIMEOUT,
};
use crate::core::directory::ApplicationDirectory;
use crate::core::hooks::{ApiRequest, ApiResponse, PanelId};
use crate::error::Result;
use crate::logger::log;

use super::models::{
    attributes, relationship, Allocation, EggVariable, Node, PowerSignal, Resources,
    ServerDetails, User, WebsocketCredentials,
};
use super::session::PanelSession;

/// Everything a server needs to reach its own panel
#[derive(Debug)]
pub(crate) struct PanelRoute {
    pub(crate) panel_id: PanelId,
    pub(crate) client: Arc<PanelSession>,
    pub(crate) directory: Arc<ApplicationDirectory>,
}

#[derive(Debug, Clone)]
pub struct ClientServer {
    details: ServerDetails,
    resources: Option<Resources>,
    allocations: Vec<Allocation>,
    variables: Vec<EggVariable>,
    node: Option<Node>,
    owner: Option<User>,
    route: Arc<PanelRoute>,
}

impl ClientServer {
    /// Build an unresolved model from one client-surface server object
    pub(crate) fn from_value(value: &Value, route: Arc<PanelRoute>) -> Result<Self> {
        let details: ServerDetails = attributes(value)?;
        let allocations = relationship(value, "allocations")
            .into_iter()
            .map(attributes)
            .collect::<Result<Vec<Allocation>>>()?;
        let variables = relationship(value, "variables")
            .into_iter()
            .map(attributes)
            .collect::<Result<Vec<EggVariable>>>()?;

        Ok(Self {
            details,
            resources: None,
            allocations,
            variables,
            node: None,
            owner: None,
            route,
        })
    }

    pub fn panel_id(&self) -> &str {
        &self.route.panel_id
    }

    pub fn identifier(&self) -> &str {
        &self.details.identifier
    }

    pub fn internal_id(&self) -> Option<u64> {
        self.details.internal_id
    }

    pub fn uuid(&self) -> &str {
        &self.details.uuid
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn details(&self) -> &ServerDetails {
        &self.details
    }

    /// `None` until resolved
    pub fn resources(&self) -> Option<&Resources> {
        self.resources.as_ref()
    }

    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    pub fn default_allocation(&self) -> Option<&Allocation> {
        self.allocations.iter().find(|a| a.is_default)
    }

    pub fn variables(&self) -> &[EggVariable] {
        &self.variables
    }

    pub fn node(&self) -> Option<&Node> {
        self.node.as_ref()
    }

    pub fn owner(&self) -> Option<&User> {
        self.owner.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.resources.is_some()
    }

    /// Console captures currently listening on this server
    pub fn open_console_sockets(&self) -> usize {
        self.route.client.open_sockets_for(self.identifier())
    }

    fn endpoint(&self, suffix: &str) -> String {
        format!("client/servers/{}/{}", self.identifier(), suffix)
    }

    /// Fully resolved copy: resources, node and owner.
    ///
    /// Resources are required; node and owner are left empty when the panel
    /// has no application access or the lookup fails.
    pub async fn resolve(&self) -> Result<ClientServer> {
        let (resources, (node, owner)) =
            tokio::join!(self.refresh_resources(), self.fetch_relations());
        let mut resolved = self.clone();
        resolved.resources = Some(resources?);
        resolved.node = node;
        resolved.owner = owner;
        Ok(resolved)
    }

    async fn fetch_relations(&self) -> (Option<Node>, Option<User>) {
        let directory = &self.route.directory;
        let panel = self.panel_id();
        if !directory.has_panel(panel) {
            return (None, None);
        }

        let links = match directory.lookup_server_links(panel, self.uuid()).await {
            Ok(Some(links)) => links,
            Ok(None) => return (None, None),
            Err(e) => {
                log::warn!(panel = %panel, server = %self.identifier(), error = %e, "Server links lookup failed");
                return (None, None);
            }
        };

        let node = async {
            match links.node_id {
                Some(id) => directory.lookup_node(panel, id).await,
                None => Ok(None),
            }
        };
        let owner = async {
            match links.owner_id {
                Some(id) => directory.lookup_user(panel, id).await,
                None => Ok(None),
            }
        };
        let (node, owner) = tokio::join!(node, owner);
        (
            self.relation_or_log("node", node),
            self.relation_or_log("owner", owner),
        )
    }

    fn relation_or_log<T>(&self, relation: &str, result: Result<Option<T>>) -> Option<T> {
        match result {
            Ok(value) => value,
            Err(e) => {
                log::warn!(
                    panel = %self.panel_id(),
                    server = %self.identifier(),
                    relation = relation,
                    error = %e,
                    "Relationship lookup failed"
                );
                None
            }
        }
    }

    /// Resolved node, or a directory lookup that is returned but not stored
    pub async fn load_node(&self) -> Result<Option<Node>> {
        if let Some(node) = &self.node {
            return Ok(Some(node.clone()));
        }
        let directory = &self.route.directory;
        match directory.lookup_server_links(self.panel_id(), self.uuid()).await? {
            Some(links) => match links.node_id {
                Some(id) => directory.lookup_node(self.panel_id(), id).await,
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Resolved owner, or a directory lookup that is returned but not stored
    pub async fn load_owner(&self) -> Result<Option<User>> {
        if let Some(owner) = &self.owner {
            return Ok(Some(owner.clone()));
        }
        let directory = &self.route.directory;
        match directory.lookup_server_links(self.panel_id(), self.uuid()).await? {
            Some(links) => match links.owner_id {
                Some(id) => directory.lookup_user(self.panel_id(), id).await,
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    pub async fn refresh_resources(&self) -> Result<Resources> {
        let value = self.route.client.get_json(&self.endpoint("resources")).await?;
        attributes(&value)
    }

    /// Send a console command without waiting for output
    pub async fn send_command(&self, command: &str) -> Result<ApiResponse> {
        let request =
            ApiRequest::post(self.endpoint("command")).json(json!({ "command": command }));
        self.route.client.send(request).await
    }

    /// Send a command and capture the first console line
    pub async fn capture_command(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<(ApiResponse, CaptureOutcome)> {
        ConsoleCapture::new(&self.route.client, self.identifier())
            .run(command, timeout.unwrap_or(DEFAULT_CAPTURE_TIMEOUT))
            .await
    }

    /// Like [`capture_command`](Self::capture_command), with failures flattened
    /// into their tag strings
    pub async fn send_command_with_output(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<(ApiResponse, String)> {
        let (response, outcome) = self.capture_command(command, timeout).await?;
        Ok((response, outcome_to_wire(&outcome)))
    }

    pub async fn power(&self, signal: PowerSignal) -> Result<ApiResponse> {
        let request =
            ApiRequest::post(self.endpoint("power")).json(json!({ "signal": signal.as_str() }));
        self.route.client.send(request).await
    }

    pub async fn websocket_credentials(&self) -> Result<WebsocketCredentials> {
        ConsoleCapture::new(&self.route.client, self.identifier())
            .credentials()
            .await
    }
}
