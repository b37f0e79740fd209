//! Panel session
//!
//! One authenticated transport pair for a single (panel, surface):
//! - every HTTP request of that surface goes through `send`
//! - console sockets opened here are tracked until they close
//! - `close` tears both down exactly once

use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::PanelConfig;
use crate::core::hooks::{
    ApiRequest, ApiResponse, ConsoleSocket, HttpTransport, PanelId, SocketConnector, Surface,
};
use crate::core::{SocketId, SocketTracker};
use crate::error::{HubError, Result};
use crate::logger::log;

use super::models::list_items;

pub struct PanelSession {
    panel_id: PanelId,
    surface: Surface,
    origin: String,
    http: Arc<dyn HttpTransport>,
    sockets: Arc<dyn SocketConnector>,
    tracker: SocketTracker,
    closed: AtomicBool,
}

impl fmt::Debug for PanelSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanelSession")
            .field("panel_id", &self.panel_id)
            .field("surface", &self.surface)
            .field("open_sockets", &self.tracker.open_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PanelSession {
    pub fn new(
        panel: &PanelConfig,
        surface: Surface,
        http: Arc<dyn HttpTransport>,
        sockets: Arc<dyn SocketConnector>,
    ) -> Result<Self> {
        Ok(Self {
            panel_id: panel.id.clone(),
            surface,
            origin: panel.origin()?,
            http,
            sockets,
            tracker: SocketTracker::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn panel_id(&self) -> &str {
        &self.panel_id
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn open_sockets(&self) -> usize {
        self.tracker.open_count()
    }

    /// Console sockets currently open for one server
    pub fn open_sockets_for(&self, server_id: &str) -> usize {
        self.tracker.open_for_server(server_id)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(HubError::SessionClosed(self.panel_id.clone()));
        }
        Ok(())
    }

    /// Reject entities that belong to another panel
    pub fn ensure_scope(&self, panel_id: &str) -> Result<()> {
        if panel_id != self.panel_id {
            return Err(HubError::Scope {
                expected: self.panel_id.clone(),
                actual: panel_id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.ensure_open()?;
        log::panel_request(
            &self.panel_id,
            &self.surface.to_string(),
            request.method.as_str(),
            &request.path,
        );
        self.http.send(request).await
    }

    /// GET a path and decode the body, failing on non-2xx
    pub async fn get_json(&self, path: &str) -> Result<Value> {
        self.send(ApiRequest::get(path)).await?.error_for_status()?.value()
    }

    /// Collect every `data` item of a paginated list endpoint.
    ///
    /// Pages are counted locally and the walk stops at `total_pages`, on an
    /// empty page, or when the panel answers with an earlier page than asked.
    /// A non-2xx page ends the walk with whatever was collected. A transport
    /// error on the first page is returned; on later pages it ends the walk.
    pub async fn paginate(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut page: u64 = 1;

        loop {
            let mut request = ApiRequest::get(endpoint);
            for (key, value) in query {
                request = request.query(key, *value);
            }
            request = request.query("page", page.to_string());

            let response = match self.send(request).await {
                Ok(response) => response,
                Err(e) if items.is_empty() => return Err(e),
                Err(e) => {
                    log::warn!(panel = %self.panel_id, endpoint = endpoint, page = page, error = %e, "Pagination aborted");
                    break;
                }
            };
            if !response.is_success() {
                log::warn!(
                    panel = %self.panel_id,
                    endpoint = endpoint,
                    page = page,
                    status = response.status.as_u16(),
                    "Pagination stopped on non-success page"
                );
                break;
            }

            let value = response.value()?;
            let pagination = value.get("meta").and_then(|m| m.get("pagination"));
            let current = pagination
                .and_then(|p| p.get("current_page"))
                .and_then(Value::as_u64)
                .unwrap_or(page);
            let total = pagination
                .and_then(|p| p.get("total_pages"))
                .and_then(Value::as_u64)
                .unwrap_or(1);
            // A panel that ignores `?page` keeps answering the same page
            if current < page {
                log::warn!(
                    panel = %self.panel_id,
                    endpoint = endpoint,
                    page = page,
                    current_page = current,
                    "Pagination stopped, panel did not advance"
                );
                break;
            }

            let page_items = list_items(&value);
            if page_items.is_empty() {
                break;
            }
            items.extend(page_items.iter().cloned());

            page += 1;
            if page > total {
                break;
            }
        }

        Ok(items)
    }

    /// Open a console socket for one server and track it until it closes
    pub async fn open_socket(&self, url: &str, server_id: &str) -> Result<TrackedSocket> {
        self.ensure_open()?;
        let socket = self.sockets.open(url, &self.origin).await?;
        let (id, cancel_token) = self.tracker.register(server_id);
        // close() may have run while the socket was connecting
        if self.is_closed() {
            cancel_token.cancel();
        }
        log::debug!(
            panel = %self.panel_id,
            server = %server_id,
            open_for_server = self.tracker.open_for_server(server_id),
            "Console socket opened"
        );
        Ok(TrackedSocket {
            socket,
            id,
            cancel_token,
            tracker: self.tracker.clone(),
            closed: false,
        })
    }

    /// Close the session. Returns false if it was already closed.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let cancelled = self.tracker.cancel_all();
        self.http.close().await;
        log::debug!(
            panel = %self.panel_id,
            surface = %self.surface,
            cancelled_sockets = cancelled,
            "Session closed"
        );
        true
    }
}

/// A console socket registered with its session's tracker
pub struct TrackedSocket {
    socket: Box<dyn ConsoleSocket>,
    id: SocketId,
    cancel_token: CancellationToken,
    tracker: SocketTracker,
    closed: bool,
}

impl TrackedSocket {
    /// Cancelled when the owning session closes
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub async fn send_text(&mut self, text: String) -> Result<()> {
        self.socket.send_text(text).await
    }

    pub async fn next_text(&mut self) -> Result<Option<String>> {
        self.socket.next_text().await
    }

    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.tracker.unregister(self.id);
        self.socket.close().await
    }
}

impl Drop for TrackedSocket {
    fn drop(&mut self) {
        if !self.closed {
            self.tracker.unregister(self.id);
        }
    }
}
