//! Application directory
//!
//! Cache of Application-side entities shared by every server of a registry:
//! - keys are `(panel, kind, id)`; ids from different panels never collide
//! - entries are `Partial` (seen embedded in another response) or `Full`
//! - only `Full` entries satisfy a lookup; a `Partial` hit is refetched
//! - a `Full` entry is never replaced by a `Partial` one
//!
//! There is no eviction. The directory lives as long as its registry.

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::api::models::{Egg, Nest, Node, PanelScoped, User};
use crate::api::ApplicationApi;
use crate::core::hooks::{PanelId, Surface};
use crate::error::{HubError, Result};
use crate::logger::log;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Node,
    User,
    Nest,
    Egg,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Node => "node",
            EntityKind::User => "user",
            EntityKind::Nest => "nest",
            EntityKind::Egg => "egg",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    Partial,
    Full,
}

/// Any entity the directory can hold
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Node(Node),
    User(User),
    Nest(Nest),
    Egg(Egg),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Node(_) => EntityKind::Node,
            Entity::User(_) => EntityKind::User,
            Entity::Nest(_) => EntityKind::Nest,
            Entity::Egg(_) => EntityKind::Egg,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Entity::Node(node) => node.id,
            Entity::User(user) => user.id,
            Entity::Nest(nest) => nest.id,
            Entity::Egg(egg) => egg.id,
        }
    }

    pub fn panel_id(&self) -> &str {
        match self {
            Entity::Node(node) => node.panel_id(),
            Entity::User(user) => user.panel_id(),
            Entity::Nest(nest) => nest.panel_id(),
            Entity::Egg(egg) => egg.panel_id(),
        }
    }
}

/// Application-side ids of one server, keyed by its UUID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLinks {
    pub application_id: u64,
    pub node_id: Option<u64>,
    pub owner_id: Option<u64>,
}

impl ServerLinks {
    fn from_value(value: &Value) -> Result<Self> {
        let attributes = value
            .get("attributes")
            .ok_or_else(|| HubError::Decode("missing 'attributes' in server object".to_string()))?;
        let application_id = attributes
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| HubError::Decode("server object without numeric id".to_string()))?;
        Ok(Self {
            application_id,
            node_id: attributes.get("node").and_then(Value::as_u64),
            owner_id: attributes.get("user").and_then(Value::as_u64),
        })
    }
}

type CacheKey = (PanelId, EntityKind, u64);

#[derive(Debug, Clone)]
struct CacheEntry {
    completeness: Completeness,
    entity: Entity,
}

pub struct ApplicationDirectory {
    apis: HashMap<PanelId, ApplicationApi>,
    entries: DashMap<CacheKey, CacheEntry>,
    links: DashMap<(PanelId, String), ServerLinks>,
}

impl fmt::Debug for ApplicationDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationDirectory")
            .field("panels", &self.apis.keys().collect::<Vec<_>>())
            .field("entries", &self.entries.len())
            .field("links", &self.links.len())
            .finish()
    }
}

impl ApplicationDirectory {
    /// Build a directory over the panels that have an application handle
    pub fn new(apis: impl IntoIterator<Item = ApplicationApi>) -> Self {
        Self {
            apis: apis
                .into_iter()
                .map(|api| (api.panel_id().to_string(), api))
                .collect(),
            entries: DashMap::new(),
            links: DashMap::new(),
        }
    }

    /// Whether lookups for this panel can reach the network
    pub fn has_panel(&self, panel_id: &str) -> bool {
        self.apis.contains_key(panel_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_state(&self, panel_id: &str, kind: EntityKind, id: u64) -> Option<Completeness> {
        self.entries
            .get(&(panel_id.to_string(), kind, id))
            .map(|entry| entry.completeness)
    }

    /// Cached entity regardless of completeness
    pub fn cached(&self, panel_id: &str, kind: EntityKind, id: u64) -> Option<Entity> {
        self.entries
            .get(&(panel_id.to_string(), kind, id))
            .map(|entry| entry.entity.clone())
    }

    fn api(&self, panel_id: &str) -> Result<&ApplicationApi> {
        self.apis.get(panel_id).ok_or_else(|| HubError::NotConfigured {
            panel: panel_id.to_string(),
            surface: Surface::Application,
        })
    }

    fn cached_full(&self, panel_id: &str, kind: EntityKind, id: u64) -> Option<Entity> {
        self.entries
            .get(&(panel_id.to_string(), kind, id))
            .filter(|entry| entry.completeness == Completeness::Full)
            .map(|entry| entry.entity.clone())
    }

    fn store_full(&self, entity: Entity) {
        let key = (entity.panel_id().to_string(), entity.kind(), entity.id());
        self.entries.insert(
            key,
            CacheEntry {
                completeness: Completeness::Full,
                entity,
            },
        );
    }

    /// Store an embedded entity unless a full copy is already cached.
    /// Returns whether the entry was written.
    pub fn ingest_partial(&self, panel_id: &str, entity: Entity) -> Result<bool> {
        if entity.panel_id() != panel_id {
            return Err(HubError::Scope {
                expected: panel_id.to_string(),
                actual: entity.panel_id().to_string(),
            });
        }
        let key = (panel_id.to_string(), entity.kind(), entity.id());
        match self.entries.entry(key) {
            MapEntry::Occupied(occupied) if occupied.get().completeness == Completeness::Full => {
                Ok(false)
            }
            MapEntry::Occupied(mut occupied) => {
                occupied.insert(CacheEntry {
                    completeness: Completeness::Partial,
                    entity,
                });
                Ok(true)
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(CacheEntry {
                    completeness: Completeness::Partial,
                    entity,
                });
                Ok(true)
            }
        }
    }

    pub async fn lookup_node(&self, panel_id: &str, node_id: u64) -> Result<Option<Node>> {
        if let Some(Entity::Node(node)) = self.cached_full(panel_id, EntityKind::Node, node_id) {
            return Ok(Some(node));
        }
        let node = self.api(panel_id)?.get_node(node_id).await?;
        if let Some(node) = &node {
            self.store_full(Entity::Node(node.clone()));
        }
        log_fetch(panel_id, EntityKind::Node, node_id, node.is_some());
        Ok(node)
    }

    pub async fn lookup_user(&self, panel_id: &str, user_id: u64) -> Result<Option<User>> {
        if let Some(Entity::User(user)) = self.cached_full(panel_id, EntityKind::User, user_id) {
            return Ok(Some(user));
        }
        let user = self.api(panel_id)?.get_user(user_id).await?;
        if let Some(user) = &user {
            self.store_full(Entity::User(user.clone()));
        }
        log_fetch(panel_id, EntityKind::User, user_id, user.is_some());
        Ok(user)
    }

    /// Full nest; its embedded eggs are ingested as partial entries
    pub async fn lookup_nest(&self, panel_id: &str, nest_id: u64) -> Result<Option<Nest>> {
        if let Some(Entity::Nest(nest)) = self.cached_full(panel_id, EntityKind::Nest, nest_id) {
            return Ok(Some(nest));
        }
        let fetched = self.api(panel_id)?.get_nest_with_eggs(nest_id).await?;
        log_fetch(panel_id, EntityKind::Nest, nest_id, fetched.is_some());
        let Some((nest, eggs)) = fetched else {
            return Ok(None);
        };
        self.store_full(Entity::Nest(nest.clone()));
        for egg in eggs {
            self.ingest_partial(panel_id, Entity::Egg(egg))?;
        }
        Ok(Some(nest))
    }

    /// Full egg; its embedded nest is ingested as a partial entry
    pub async fn lookup_egg(&self, panel_id: &str, nest_id: u64, egg_id: u64) -> Result<Option<Egg>> {
        if let Some(Entity::Egg(egg)) = self.cached_full(panel_id, EntityKind::Egg, egg_id) {
            return Ok(Some(egg));
        }
        let fetched = self.api(panel_id)?.get_egg_with_nest(nest_id, egg_id).await?;
        log_fetch(panel_id, EntityKind::Egg, egg_id, fetched.is_some());
        let Some((egg, nest)) = fetched else {
            return Ok(None);
        };
        self.store_full(Entity::Egg(egg.clone()));
        if let Some(nest) = nest {
            self.ingest_partial(panel_id, Entity::Nest(nest))?;
        }
        Ok(Some(egg))
    }

    /// Application-side node and owner ids for a server UUID
    pub async fn lookup_server_links(&self, panel_id: &str, uuid: &str) -> Result<Option<ServerLinks>> {
        let key = (panel_id.to_string(), uuid.to_string());
        if let Some(links) = self.links.get(&key) {
            return Ok(Some(links.clone()));
        }
        let Some(value) = self.api(panel_id)?.find_server_by_uuid(uuid).await? else {
            log::debug!(panel = %panel_id, uuid = %uuid, "Server not visible to application API");
            return Ok(None);
        };
        let links = ServerLinks::from_value(&value)?;
        self.links.insert(key, links.clone());
        Ok(Some(links))
    }
}

fn log_fetch(panel_id: &str, kind: EntityKind, id: u64, found: bool) {
    log::debug!(panel = %panel_id, kind = %kind, id = id, found = found, "Directory fetch");
}
