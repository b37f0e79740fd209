//! Application API handle
//!
//! Typed access to one panel's Application surface. A handle is bound to exactly
//! one panel; passing it an entity from another panel is a [`HubError::Scope`].
//!
//! By-id getters return `Ok(None)` on 404 and an error for any other
//! non-success status. Mutating calls
//! return `Ok(None)`/`Ok(false)` when the panel does not answer with the
//! documented success status.

use http::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::hooks::{ApiRequest, ApiResponse};
use crate::error::Result;
use crate::logger::log;

use super::models::{
    list_items, relationship, Egg, Location, Nest, Node, NodeAllocation, PanelScoped, User,
};
use super::session::PanelSession;

/// Fields accepted when creating a user
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_admin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Clone)]
pub struct ApplicationApi {
    session: Arc<PanelSession>,
}

impl std::fmt::Debug for ApplicationApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationApi")
            .field("panel_id", &self.panel_id())
            .finish()
    }
}

fn path(endpoint: &str) -> String {
    format!("application/{}", endpoint)
}

impl ApplicationApi {
    pub fn new(session: Arc<PanelSession>) -> Self {
        Self { session }
    }

    pub fn panel_id(&self) -> &str {
        self.session.panel_id()
    }

    pub(crate) fn session(&self) -> &Arc<PanelSession> {
        &self.session
    }

    async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.session.send(request).await
    }

    async fn list(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Vec<Value>> {
        self.session.paginate(&path(endpoint), query).await
    }

    /// GET one resource; `None` on 404, other failures are errors
    async fn fetch_one(&self, endpoint: &str, include: Option<&str>) -> Result<Option<Value>> {
        let mut request = ApiRequest::get(path(endpoint));
        if let Some(include) = include {
            request = request.query("include", include);
        }
        let response = self.request(request).await?;
        if response.status == StatusCode::NOT_FOUND {
            log::debug!(panel = %self.panel_id(), endpoint = endpoint, "Resource not found");
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.value()?))
    }

    /// Send a body and decode the answer when it carries `expected`
    async fn write_one(
        &self,
        request: ApiRequest,
        expected: StatusCode,
    ) -> Result<Option<Value>> {
        let endpoint = request.path.clone();
        let response = self.request(request).await?;
        if response.status != expected {
            log::warn!(
                panel = %self.panel_id(),
                endpoint = %endpoint,
                status = response.status.as_u16(),
                "Application request rejected"
            );
            return Ok(None);
        }
        Ok(Some(response.value()?))
    }

    async fn expect_status(&self, request: ApiRequest, expected: StatusCode) -> Result<bool> {
        Ok(self.request(request).await?.status == expected)
    }

    // ---------------------------------------------------------------------
    // Users
    // ---------------------------------------------------------------------

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.list("users", &[("include", "servers")])
            .await?
            .iter()
            .map(|value| User::from_value(value, self.panel_id()))
            .collect()
    }

    pub async fn get_user(&self, user_id: u64) -> Result<Option<User>> {
        self.fetch_one(&format!("users/{}", user_id), Some("servers"))
            .await?
            .map(|value| User::from_value(&value, self.panel_id()))
            .transpose()
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<Option<User>> {
        let request = ApiRequest::post(path("users")).json(serde_json::to_value(user)?);
        self.write_one(request, StatusCode::CREATED)
            .await?
            .map(|value| User::from_value(&value, self.panel_id()))
            .transpose()
    }

    pub async fn update_user(&self, user: &User, changes: Value) -> Result<Option<User>> {
        self.session.ensure_scope(user.panel_id())?;
        let request = ApiRequest::patch(path(&format!("users/{}", user.id))).json(changes);
        self.write_one(request, StatusCode::OK)
            .await?
            .map(|value| User::from_value(&value, self.panel_id()))
            .transpose()
    }

    pub async fn delete_user(&self, user: &User) -> Result<bool> {
        self.session.ensure_scope(user.panel_id())?;
        let request = ApiRequest::delete(path(&format!("users/{}", user.id)));
        self.expect_status(request, StatusCode::NO_CONTENT).await
    }

    // ---------------------------------------------------------------------
    // Servers (raw JSON)
    // ---------------------------------------------------------------------

    pub async fn list_servers(&self) -> Result<Vec<Value>> {
        self.list("servers", &[("include", "user,node")]).await
    }

    pub async fn get_server_details(&self, server_id: u64) -> Result<Option<Value>> {
        self.fetch_one(&format!("servers/{}", server_id), Some("user,node"))
            .await
    }

    /// Look a server up by its UUID.
    ///
    /// Only a record whose own `uuid` matches is returned; panels that ignore
    /// the filter or match loosely yield `None` rather than another server.
    pub async fn find_server_by_uuid(&self, uuid: &str) -> Result<Option<Value>> {
        let request = ApiRequest::get(path("servers")).query("filter[uuid]", uuid);
        let response = self.request(request).await?;
        if !response.is_success() {
            return Ok(None);
        }
        let value = response.value()?;
        let found = list_items(&value)
            .iter()
            .find(|item| {
                item.get("attributes")
                    .and_then(|a| a.get("uuid"))
                    .and_then(Value::as_str)
                    == Some(uuid)
            })
            .cloned();
        if found.is_none() {
            log::warn!(panel = %self.panel_id(), uuid = %uuid, "No server record matches uuid filter");
        }
        Ok(found)
    }

    pub async fn create_server(&self, body: Value) -> Result<Option<Value>> {
        self.write_one(ApiRequest::post(path("servers")).json(body), StatusCode::CREATED)
            .await
    }

    pub async fn update_server_details(&self, server_id: u64, changes: Value) -> Result<Option<Value>> {
        let request =
            ApiRequest::patch(path(&format!("servers/{}/details", server_id))).json(changes);
        self.write_one(request, StatusCode::OK).await
    }

    pub async fn update_server_build(&self, server_id: u64, changes: Value) -> Result<Option<Value>> {
        let request =
            ApiRequest::patch(path(&format!("servers/{}/build", server_id))).json(changes);
        self.write_one(request, StatusCode::OK).await
    }

    pub async fn update_server_startup(&self, server_id: u64, changes: Value) -> Result<Option<Value>> {
        let request =
            ApiRequest::patch(path(&format!("servers/{}/startup", server_id))).json(changes);
        self.write_one(request, StatusCode::OK).await
    }

    async fn server_action(&self, server_id: u64, action: &str) -> Result<bool> {
        let request = ApiRequest::post(path(&format!("servers/{}/{}", server_id, action)));
        self.expect_status(request, StatusCode::NO_CONTENT).await
    }

    pub async fn suspend_server(&self, server_id: u64) -> Result<bool> {
        self.server_action(server_id, "suspend").await
    }

    pub async fn unsuspend_server(&self, server_id: u64) -> Result<bool> {
        self.server_action(server_id, "unsuspend").await
    }

    pub async fn rebuild_server(&self, server_id: u64) -> Result<bool> {
        self.server_action(server_id, "rebuild").await
    }

    pub async fn reinstall_server(&self, server_id: u64) -> Result<bool> {
        self.server_action(server_id, "reinstall").await
    }

    pub async fn delete_server(&self, server_id: u64, force: bool) -> Result<bool> {
        let endpoint = if force {
            format!("servers/{}/force", server_id)
        } else {
            format!("servers/{}", server_id)
        };
        self.expect_status(ApiRequest::delete(path(&endpoint)), StatusCode::NO_CONTENT)
            .await
    }

    // ---------------------------------------------------------------------
    // Nodes
    // ---------------------------------------------------------------------

    pub async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.list("nodes", &[("include", "location")])
            .await?
            .iter()
            .map(|value| Node::from_value(value, self.panel_id()))
            .collect()
    }

    pub async fn get_node(&self, node_id: u64) -> Result<Option<Node>> {
        self.fetch_one(&format!("nodes/{}", node_id), Some("location"))
            .await?
            .map(|value| Node::from_value(&value, self.panel_id()))
            .transpose()
    }

    /// Wings configuration document for a node
    pub async fn get_node_configuration(&self, node: &Node) -> Result<Option<Value>> {
        self.session.ensure_scope(node.panel_id())?;
        self.fetch_one(&format!("nodes/{}/configuration", node.id), None)
            .await
    }

    pub async fn create_node(&self, body: Value) -> Result<Option<Node>> {
        self.write_one(ApiRequest::post(path("nodes")).json(body), StatusCode::CREATED)
            .await?
            .map(|value| Node::from_value(&value, self.panel_id()))
            .transpose()
    }

    pub async fn update_node(&self, node: &Node, changes: Value) -> Result<Option<Node>> {
        self.session.ensure_scope(node.panel_id())?;
        let request = ApiRequest::patch(path(&format!("nodes/{}", node.id))).json(changes);
        self.write_one(request, StatusCode::OK)
            .await?
            .map(|value| Node::from_value(&value, self.panel_id()))
            .transpose()
    }

    pub async fn delete_node(&self, node: &Node) -> Result<bool> {
        self.session.ensure_scope(node.panel_id())?;
        let request = ApiRequest::delete(path(&format!("nodes/{}", node.id)));
        self.expect_status(request, StatusCode::NO_CONTENT).await
    }

    pub async fn list_node_allocations(&self, node: &Node) -> Result<Vec<NodeAllocation>> {
        self.session.ensure_scope(node.panel_id())?;
        self.list(&format!("nodes/{}/allocations", node.id), &[])
            .await?
            .iter()
            .map(super::models::attributes)
            .collect()
    }

    pub async fn create_allocations(&self, node: &Node, ip: &str, ports: &[String]) -> Result<bool> {
        self.session.ensure_scope(node.panel_id())?;
        let request = ApiRequest::post(path(&format!("nodes/{}/allocations", node.id)))
            .json(json!({ "ip": ip, "ports": ports }));
        self.expect_status(request, StatusCode::NO_CONTENT).await
    }

    pub async fn delete_allocation(&self, node: &Node, allocation_id: u64) -> Result<bool> {
        self.session.ensure_scope(node.panel_id())?;
        let request = ApiRequest::delete(path(&format!(
            "nodes/{}/allocations/{}",
            node.id, allocation_id
        )));
        self.expect_status(request, StatusCode::NO_CONTENT).await
    }

    // ---------------------------------------------------------------------
    // Nests & eggs
    // ---------------------------------------------------------------------

    pub async fn list_nests(&self) -> Result<Vec<Nest>> {
        self.list("nests", &[("include", "eggs")])
            .await?
            .iter()
            .map(|value| Nest::from_value(value, self.panel_id()))
            .collect()
    }

    pub async fn get_nest(&self, nest_id: u64) -> Result<Option<Nest>> {
        Ok(self.get_nest_with_eggs(nest_id).await?.map(|(nest, _)| nest))
    }

    /// Nest plus the eggs embedded in the same response
    pub async fn get_nest_with_eggs(&self, nest_id: u64) -> Result<Option<(Nest, Vec<Egg>)>> {
        let Some(value) = self
            .fetch_one(&format!("nests/{}", nest_id), Some("eggs"))
            .await?
        else {
            return Ok(None);
        };
        let nest = Nest::from_value(&value, self.panel_id())?;
        let eggs = relationship(&value, "eggs")
            .into_iter()
            .map(|egg| Egg::from_value(egg, self.panel_id()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some((nest, eggs)))
    }

    pub async fn list_eggs(&self, nest: &Nest) -> Result<Vec<Egg>> {
        self.session.ensure_scope(nest.panel_id())?;
        self.list(&format!("nests/{}/eggs", nest.id), &[("include", "nest")])
            .await?
            .iter()
            .map(|value| Egg::from_value(value, self.panel_id()))
            .collect()
    }

    pub async fn get_egg(&self, nest_id: u64, egg_id: u64) -> Result<Option<Egg>> {
        Ok(self
            .get_egg_with_nest(nest_id, egg_id)
            .await?
            .map(|(egg, _)| egg))
    }

    /// Egg plus the nest embedded in the same response
    pub async fn get_egg_with_nest(
        &self,
        nest_id: u64,
        egg_id: u64,
    ) -> Result<Option<(Egg, Option<Nest>)>> {
        let Some(value) = self
            .fetch_one(&format!("nests/{}/eggs/{}", nest_id, egg_id), Some("nest"))
            .await?
        else {
            return Ok(None);
        };
        let egg = Egg::from_value(&value, self.panel_id())?;
        let nest = relationship(&value, "nest")
            .into_iter()
            .next()
            .map(|nest| Nest::from_value(nest, self.panel_id()))
            .transpose()?;
        Ok(Some((egg, nest)))
    }

    // ---------------------------------------------------------------------
    // Locations
    // ---------------------------------------------------------------------

    pub async fn list_locations(&self) -> Result<Vec<Location>> {
        self.list("locations", &[("include", "nodes")])
            .await?
            .iter()
            .map(|value| Location::from_value(value, self.panel_id()))
            .collect()
    }

    pub async fn get_location(&self, location_id: u64) -> Result<Option<Location>> {
        self.fetch_one(&format!("locations/{}", location_id), Some("nodes"))
            .await?
            .map(|value| Location::from_value(&value, self.panel_id()))
            .transpose()
    }

    pub async fn create_location(&self, short: &str, long: &str) -> Result<Option<Location>> {
        let request =
            ApiRequest::post(path("locations")).json(json!({ "short": short, "long": long }));
        self.write_one(request, StatusCode::CREATED)
            .await?
            .map(|value| Location::from_value(&value, self.panel_id()))
            .transpose()
    }

    pub async fn update_location(&self, location: &Location, changes: Value) -> Result<Option<Location>> {
        self.session.ensure_scope(location.panel_id())?;
        let request =
            ApiRequest::patch(path(&format!("locations/{}", location.id))).json(changes);
        self.write_one(request, StatusCode::OK)
            .await?
            .map(|value| Location::from_value(&value, self.panel_id()))
            .transpose()
    }

    pub async fn delete_location(&self, location: &Location) -> Result<bool> {
        self.session.ensure_scope(location.panel_id())?;
        let request = ApiRequest::delete(path(&format!("locations/{}", location.id)));
        self.expect_status(request, StatusCode::NO_CONTENT).await
    }
}
