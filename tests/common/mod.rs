#![allow(dead_code)]

use async_trait::async_trait;
use http::StatusCode;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ptero_hub::config::PanelConfig;
use ptero_hub::core::hooks::{
    ApiRequest, ApiResponse, ConsoleSocket, HttpTransport, SocketConnector, Surface,
    TransportFactory,
};
use ptero_hub::{HubError, PanelRegistry, Result};

pub type RequestLog = Arc<Mutex<Vec<String>>>;

/// Scripted HTTP transport for one (panel, surface)
pub struct StubHttp {
    label: String,
    routes: Mutex<HashMap<String, (u16, String)>>,
    requests: Mutex<Vec<String>>,
    log: RequestLog,
    failing: AtomicBool,
    closed: AtomicBool,
}

fn request_key(request: &ApiRequest) -> (String, String) {
    let path = format!("{} {}", request.method, request.path);
    if request.query.is_empty() {
        return (path.clone(), path);
    }
    let query = request
        .query
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    (format!("{}?{}", path, query), path)
}

impl StubHttp {
    fn new(label: String, log: RequestLog) -> Self {
        Self {
            label,
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            log,
            failing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Answer `key` (`"GET path"` or `"GET path?k=v"`) with a JSON body
    pub fn route(&self, key: &str, status: u16, body: Value) {
        self.route_raw(key, status, &body.to_string());
    }

    pub fn route_raw(&self, key: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(key.to_string(), (status, body.to_string()));
    }

    /// Fail every request with a transport error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Requests seen, as `"METHOD path"` or `"METHOD path?query"`
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.contains(needle))
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for StubHttp {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let (full, path) = request_key(&request);
        self.requests.lock().unwrap().push(full.clone());
        self.log
            .lock()
            .unwrap()
            .push(format!("{} {}", self.label, full));

        if self.failing.load(Ordering::SeqCst) {
            return Err(HubError::Transport("connection refused".to_string()));
        }

        let routes = self.routes.lock().unwrap();
        let (status, body) = routes
            .get(&full)
            .or_else(|| routes.get(&path))
            .cloned()
            .unwrap_or((404, r#"{"errors":[{"code":"NotFoundHttpException"}]}"#.to_string()));
        Ok(ApiResponse::new(
            StatusCode::from_u16(status).unwrap(),
            body,
        ))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Frames a stub socket plays back
#[derive(Debug, Clone, Default)]
pub struct SocketScript {
    pub frames: Vec<String>,
    /// Report a remote close after the frames instead of going silent
    pub close_after: bool,
}

impl SocketScript {
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn frames(frames: Vec<Value>) -> Self {
        Self {
            frames: frames.into_iter().map(|f| f.to_string()).collect(),
            close_after: false,
        }
    }

    pub fn closing(frames: Vec<Value>) -> Self {
        Self {
            close_after: true,
            ..Self::frames(frames)
        }
    }
}

/// What a test can observe about one opened socket
#[derive(Debug, Default)]
pub struct SocketRecord {
    pub url: String,
    pub origin: String,
    pub sent: Mutex<Vec<String>>,
    pub closed: AtomicBool,
}

impl SocketRecord {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

struct StubSocket {
    frames: VecDeque<String>,
    close_after: bool,
    record: Arc<SocketRecord>,
}

#[async_trait]
impl ConsoleSocket for StubSocket {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.record.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn next_text(&mut self) -> Result<Option<String>> {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(Some(frame));
        }
        if self.close_after {
            return Ok(None);
        }
        std::future::pending::<()>().await;
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        self.record.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct StubConnector {
    scripts: Mutex<HashMap<String, SocketScript>>,
    opened: Mutex<Vec<Arc<SocketRecord>>>,
    open_error: Mutex<Option<String>>,
}

impl StubConnector {
    pub fn script(&self, url: &str, script: SocketScript) {
        self.scripts.lock().unwrap().insert(url.to_string(), script);
    }

    pub fn fail_open(&self, cause: &str) {
        *self.open_error.lock().unwrap() = Some(cause.to_string());
    }

    pub fn opened(&self) -> Vec<Arc<SocketRecord>> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl SocketConnector for StubConnector {
    async fn open(&self, url: &str, origin: &str) -> Result<Box<dyn ConsoleSocket>> {
        if let Some(cause) = self.open_error.lock().unwrap().clone() {
            return Err(HubError::WebSocket(cause));
        }
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_default();
        let record = Arc::new(SocketRecord {
            url: url.to_string(),
            origin: origin.to_string(),
            ..Default::default()
        });
        self.opened.lock().unwrap().push(record.clone());
        Ok(Box::new(StubSocket {
            frames: script.frames.into(),
            close_after: script.close_after,
            record,
        }))
    }
}

/// Hands out one stub per (panel, surface) and a shared socket connector
#[derive(Default)]
pub struct StubFactory {
    stubs: Mutex<HashMap<(String, Surface), Arc<StubHttp>>>,
    pub connector: Arc<StubConnector>,
    pub log: RequestLog,
}

impl StubFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn http_for(&self, panel: &str, surface: Surface) -> Arc<StubHttp> {
        self.stubs
            .lock()
            .unwrap()
            .entry((panel.to_string(), surface))
            .or_insert_with(|| {
                Arc::new(StubHttp::new(
                    format!("{}:{}", panel, surface),
                    self.log.clone(),
                ))
            })
            .clone()
    }

    pub fn client(&self, panel: &str) -> Arc<StubHttp> {
        self.http_for(panel, Surface::Client)
    }

    pub fn application(&self, panel: &str) -> Arc<StubHttp> {
        self.http_for(panel, Surface::Application)
    }

    /// Every request across panels, in the order they were sent
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn built(&self) -> Vec<(String, Surface)> {
        self.stubs.lock().unwrap().keys().cloned().collect()
    }
}

impl TransportFactory for StubFactory {
    fn http(
        &self,
        panel: &PanelConfig,
        surface: Surface,
        _api_key: &str,
    ) -> Result<Arc<dyn HttpTransport>> {
        Ok(self.http_for(&panel.id, surface))
    }

    fn sockets(&self, _panel: &PanelConfig) -> Arc<dyn SocketConnector> {
        self.connector.clone()
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn panel(id: &str) -> PanelConfig {
    PanelConfig::new(id, format!("https://{}.example.com/api", id))
        .with_client_key(format!("ptlc_{}", id))
        .with_app_key(format!("ptla_{}", id))
}

pub fn client_only(id: &str) -> PanelConfig {
    PanelConfig::new(id, format!("https://{}.example.com/api", id))
        .with_client_key(format!("ptlc_{}", id))
}

pub fn registry(factory: &Arc<StubFactory>, panels: Vec<PanelConfig>) -> PanelRegistry {
    PanelRegistry::builder()
        .panels(panels)
        .transport_factory(factory.clone())
        .build()
        .unwrap()
}

pub fn server_json(identifier: &str, name: &str) -> Value {
    json!({
        "object": "server",
        "attributes": {
            "server_owner": true,
            "identifier": identifier,
            "internal_id": 1,
            "uuid": format!("{}-uuid", identifier),
            "name": name,
            "node": "Node 1",
            "description": "",
            "sftp_details": {"ip": "sftp.example.com", "port": 2022},
            "limits": {"memory": 2048, "swap": 0, "disk": 10240, "io": 500, "cpu": 100, "threads": null, "oom_disabled": true},
            "feature_limits": {"databases": 0, "allocations": 1, "backups": 1},
            "is_suspended": false,
            "is_installing": false,
            "is_transferring": false,
            "relationships": {
                "allocations": {"object": "list", "data": [
                    {"object": "allocation", "attributes": {
                        "id": 1, "ip": "10.0.0.1", "ip_alias": null, "port": 25565,
                        "notes": null, "is_default": true
                    }}
                ]},
                "variables": {"object": "list", "data": []}
            }
        }
    })
}

pub fn list_json(items: Vec<Value>, current_page: u64, total_pages: u64) -> Value {
    json!({
        "object": "list",
        "data": items,
        "meta": {"pagination": {
            "total": 0,
            "count": 0,
            "per_page": 50,
            "current_page": current_page,
            "total_pages": total_pages
        }}
    })
}

pub fn resources_json(state: &str) -> Value {
    json!({
        "object": "stats",
        "attributes": {
            "current_state": state,
            "is_suspended": false,
            "resources": {
                "memory_bytes": 1048576, "cpu_absolute": 3.5, "disk_bytes": 2097152,
                "network_rx_bytes": 10, "network_tx_bytes": 20, "uptime": 3600
            }
        }
    })
}

pub fn node_json(id: u64, name: &str) -> Value {
    json!({
        "object": "node",
        "attributes": {
            "id": id,
            "uuid": format!("node-{}", id),
            "public": true,
            "name": name,
            "location_id": 1,
            "fqdn": format!("{}.nodes.example.com", name.to_lowercase().replace(' ', "-")),
            "scheme": "https",
            "daemon_listen": 8080,
            "daemon_sftp": 2022
        }
    })
}

pub fn user_json(id: u64, username: &str) -> Value {
    json!({
        "object": "user",
        "attributes": {
            "id": id,
            "uuid": format!("user-{}", id),
            "username": username,
            "email": format!("{}@example.com", username),
            "first_name": username,
            "last_name": "Tester",
            "language": "en",
            "root_admin": false,
            "2fa": false
        }
    })
}

pub fn app_server_json(id: u64, uuid: &str, node: u64, user: u64) -> Value {
    json!({
        "object": "server",
        "attributes": {"id": id, "uuid": uuid, "identifier": &uuid[..3], "node": node, "user": user}
    })
}

pub fn nest_json(id: u64, name: &str, egg_ids: &[u64]) -> Value {
    let eggs: Vec<Value> = egg_ids
        .iter()
        .map(|egg| json!({"object": "egg", "attributes": {"id": egg, "nest": id, "name": format!("egg {}", egg)}}))
        .collect();
    json!({
        "object": "nest",
        "attributes": {
            "id": id,
            "uuid": format!("nest-{}", id),
            "author": "support@pterodactyl.io",
            "name": name,
            "relationships": {"eggs": {"object": "list", "data": eggs}}
        }
    })
}

pub fn egg_json(nest_id: u64, egg_id: u64, name: &str) -> Value {
    json!({
        "object": "egg",
        "attributes": {
            "id": egg_id,
            "uuid": format!("egg-{}", egg_id),
            "name": name,
            "nest": nest_id,
            "docker_image": "ghcr.io/pterodactyl/yolks:java_17",
            "startup": "java -jar server.jar",
            "relationships": {
                "nest": {"object": "nest", "attributes": {"id": nest_id, "name": "Minecraft"}}
            }
        }
    })
}

pub fn websocket_json(token: &str, socket: &str) -> Value {
    json!({"data": {"token": token, "socket": socket}})
}

pub fn console_frame(event: &str, args: &[&str]) -> Value {
    json!({"event": event, "args": args})
}

/// Register the client-side server list and per-server resource routes
pub fn serve_servers(stub: &StubHttp, servers: &[(&str, &str)]) {
    let items = servers
        .iter()
        .map(|(identifier, name)| server_json(identifier, name))
        .collect();
    stub.route("GET client", 200, list_json(items, 1, 1));
    for (identifier, name) in servers {
        stub.route(
            &format!("GET client/servers/{}", identifier),
            200,
            server_json(identifier, name),
        );
        stub.route(
            &format!("GET client/servers/{}/resources", identifier),
            200,
            resources_json("running"),
        );
    }
}

/// Register application-side links, node and owner for one server
pub fn serve_links(stub: &StubHttp, identifier: &str, app_id: u64, node: (u64, &str), owner: (u64, &str)) {
    let uuid = format!("{}-uuid", identifier);
    stub.route(
        &format!("GET application/servers?filter[uuid]={}", uuid),
        200,
        list_json(vec![app_server_json(app_id, &uuid, node.0, owner.0)], 1, 1),
    );
    stub.route(
        &format!("GET application/nodes/{}", node.0),
        200,
        node_json(node.0, node.1),
    );
    stub.route(
        &format!("GET application/users/{}", owner.0),
        200,
        user_json(owner.0, owner.1),
    );
}

/// Two panels: main serves "abc" (Survival), oci serves "xyz" (Creative)
pub fn scenario() -> (Arc<StubFactory>, PanelRegistry) {
    let factory = StubFactory::new();
    serve_servers(&factory.client("main"), &[("abc", "Survival")]);
    serve_servers(&factory.client("oci"), &[("xyz", "Creative")]);
    serve_links(&factory.application("main"), "abc", 10, (1, "Node A"), (5, "alice"));
    serve_links(&factory.application("oci"), "xyz", 10, (1, "Node B"), (7, "bob"));
    let registry = registry(&factory, vec![panel("main"), panel("oci")]);
    (factory, registry)
}
