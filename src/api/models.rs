//! Panel resource models
//!
//! Plain serde data holders for the `{"object": .., "attributes": {..}}` envelopes
//! returned by both API surfaces. Application-side entities are tagged with the
//! panel they were fetched from; ids are only meaningful within that panel.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::hooks::PanelId;
use crate::error::{HubError, Result};

/// Entities that belong to exactly one panel
pub trait PanelScoped {
    fn panel_id(&self) -> &str;
}

/// Decode the `attributes` of one envelope
pub fn attributes<T: DeserializeOwned>(value: &Value) -> Result<T> {
    let attributes = value
        .get("attributes")
        .ok_or_else(|| HubError::Decode("missing 'attributes' in resource object".to_string()))?;
    Ok(T::deserialize(attributes)?)
}

/// Items of a `{"object": "list", "data": [..]}` envelope
pub fn list_items(value: &Value) -> &[Value] {
    value
        .get("data")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Embedded relationship objects; lists and single objects are both accepted
pub fn relationship<'a>(value: &'a Value, name: &str) -> Vec<&'a Value> {
    let Some(related) = value
        .get("attributes")
        .and_then(|a| a.get("relationships"))
        .and_then(|r| r.get(name))
    else {
        return Vec::new();
    };
    match related.get("data").and_then(Value::as_array) {
        Some(items) => items.iter().collect(),
        None if related.get("attributes").is_some() => vec![related],
        None => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Client surface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub memory: i64,
    pub swap: i64,
    pub disk: i64,
    pub io: i64,
    pub cpu: i64,
    pub threads: Option<String>,
    pub oom_disabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureLimits {
    pub databases: i64,
    pub allocations: i64,
    pub backups: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SftpDetails {
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: u64,
    pub ip: String,
    #[serde(default)]
    pub ip_alias: Option<String>,
    pub port: u16,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EggVariable {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub env_variable: String,
    #[serde(default)]
    pub default_value: String,
    #[serde(default)]
    pub server_value: Option<String>,
    #[serde(default)]
    pub is_editable: bool,
    #[serde(default)]
    pub rules: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceUsage {
    pub memory_bytes: u64,
    pub cpu_absolute: f64,
    pub disk_bytes: u64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
    pub uptime: u64,
}

/// Live resource snapshot of one server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resources {
    pub current_state: String,
    pub is_suspended: bool,
    pub resources: ResourceUsage,
}

/// Client-surface server attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerDetails {
    pub server_owner: bool,
    pub identifier: String,
    pub internal_id: Option<u64>,
    pub uuid: String,
    pub name: String,
    /// Node *name*; the numeric node id is only exposed by the application surface
    pub node: String,
    pub description: String,
    pub sftp_details: SftpDetails,
    pub limits: Limits,
    pub feature_limits: FeatureLimits,
    pub docker_image: Option<String>,
    pub status: Option<String>,
    pub is_suspended: bool,
    pub is_installing: bool,
    pub is_transferring: bool,
    pub is_node_under_maintenance: bool,
}

/// `{token, socket}` returned by the websocket credential endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WebsocketCredentials {
    pub token: String,
    pub socket: String,
}

/// Power signals accepted by the power endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerSignal {
    Start,
    Stop,
    Restart,
    Kill,
}

impl PowerSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerSignal::Start => "start",
            PowerSignal::Stop => "stop",
            PowerSignal::Restart => "restart",
            PowerSignal::Kill => "kill",
        }
    }
}

// ---------------------------------------------------------------------------
// Application surface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    #[serde(skip)]
    pub panel_id: PanelId,
    pub id: u64,
    pub uuid: String,
    pub public: bool,
    pub name: String,
    pub description: Option<String>,
    pub location_id: u64,
    pub fqdn: String,
    pub scheme: String,
    pub behind_proxy: bool,
    pub maintenance_mode: bool,
    pub memory: i64,
    pub memory_overallocate: i64,
    pub disk: i64,
    pub disk_overallocate: i64,
    pub upload_size: i64,
    pub daemon_listen: u16,
    pub daemon_sftp: u16,
    pub daemon_base: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    #[serde(skip)]
    pub panel_id: PanelId,
    pub id: u64,
    pub external_id: Option<String>,
    pub uuid: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub language: String,
    pub root_admin: bool,
    #[serde(rename = "2fa")]
    pub two_factor: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Nest {
    #[serde(skip)]
    pub panel_id: PanelId,
    pub id: u64,
    pub uuid: String,
    pub author: String,
    pub name: String,
    pub description: Option<String>,
    /// Ids of the eggs embedded in the response, empty when not included
    #[serde(skip)]
    pub egg_ids: Vec<u64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Egg {
    #[serde(skip)]
    pub panel_id: PanelId,
    pub id: u64,
    pub uuid: String,
    pub name: String,
    pub nest: u64,
    pub author: String,
    pub description: Option<String>,
    pub docker_image: String,
    pub startup: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    #[serde(skip)]
    pub panel_id: PanelId,
    pub id: u64,
    pub short: String,
    pub long: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeAllocation {
    pub id: u64,
    pub ip: String,
    pub alias: Option<String>,
    pub port: u16,
    pub notes: Option<String>,
    pub assigned: bool,
}

macro_rules! panel_scoped {
    ($($ty:ty),*) => {
        $(
            impl PanelScoped for $ty {
                fn panel_id(&self) -> &str {
                    &self.panel_id
                }
            }
        )*
    };
}

panel_scoped!(Node, User, Nest, Egg, Location);

impl Node {
    pub fn from_value(value: &Value, panel_id: &str) -> Result<Self> {
        let mut node: Node = attributes(value)?;
        node.panel_id = panel_id.to_string();
        Ok(node)
    }
}

impl User {
    pub fn from_value(value: &Value, panel_id: &str) -> Result<Self> {
        let mut user: User = attributes(value)?;
        user.panel_id = panel_id.to_string();
        Ok(user)
    }
}

impl Nest {
    pub fn from_value(value: &Value, panel_id: &str) -> Result<Self> {
        let mut nest: Nest = attributes(value)?;
        nest.panel_id = panel_id.to_string();
        nest.egg_ids = relationship(value, "eggs")
            .into_iter()
            .filter_map(|egg| egg.get("attributes")?.get("id")?.as_u64())
            .collect();
        Ok(nest)
    }
}

impl Egg {
    pub fn from_value(value: &Value, panel_id: &str) -> Result<Self> {
        let mut egg: Egg = attributes(value)?;
        egg.panel_id = panel_id.to_string();
        Ok(egg)
    }
}

impl Location {
    pub fn from_value(value: &Value, panel_id: &str) -> Result<Self> {
        let mut location: Location = attributes(value)?;
        location.panel_id = panel_id.to_string();
        Ok(location)
    }
}
