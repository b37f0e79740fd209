//! Transport traits
//!
//! Defines the seams between the aggregation core and the network. The core only
//! talks to panels through these traits, so tests can swap in scripted transports.

use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::config::PanelConfig;
use crate::error::{HubError, Result};

/// Panel identifier, assigned by the caller in configuration.
pub type PanelId = String;

/// The two REST surfaces a panel exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    Client,
    Application,
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Surface::Client => write!(f, "client"),
            Surface::Application => write!(f, "application"),
        }
    }
}

/// A request relative to the panel API root (e.g. `client/servers/abc`)
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter, replacing an earlier one with the same key
    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.retain(|(k, _)| k != key);
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Raw response as returned by the panel
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
    pub headers: HeaderMap,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: HeaderMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Turn a non-2xx response into [`HubError::Status`]
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(HubError::Status {
                status: self.status.as_u16(),
                body: self.body,
            })
        }
    }

    pub fn value(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.body)?)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// HTTP transport bound to one panel and one credential
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request; `Err` only when no response was received
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;

    /// Release pooled connections. Later sends fail.
    async fn close(&self) {}
}

/// One open console websocket
#[async_trait]
pub trait ConsoleSocket: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next text frame, or `None` once the remote side closed the socket
    async fn next_text(&mut self) -> Result<Option<String>>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens console websockets for one panel
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn open(&self, url: &str, origin: &str) -> Result<Box<dyn ConsoleSocket>>;
}

/// Builds the transports for each configured panel
pub trait TransportFactory: Send + Sync {
    fn http(
        &self,
        panel: &PanelConfig,
        surface: Surface,
        api_key: &str,
    ) -> Result<Arc<dyn HttpTransport>>;

    fn sockets(&self, panel: &PanelConfig) -> Arc<dyn SocketConnector>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_surface_display() {
        assert_eq!(format!("{}", Surface::Client), "client");
        assert_eq!(format!("{}", Surface::Application), "application");
    }

    #[test]
    fn test_request_query_replaces_key() {
        let request = ApiRequest::get("application/nodes")
            .query("page", "1")
            .query("include", "location")
            .query("page", "2");
        assert_eq!(
            request.query,
            vec![
                ("include".to_string(), "location".to_string()),
                ("page".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_request_json_body() {
        let request = ApiRequest::post("client/servers/abc/command").json(json!({"command": "list"}));
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.body, Some(json!({"command": "list"})));
    }

    #[test]
    fn test_response_error_for_status() {
        let ok = ApiResponse::new(StatusCode::NO_CONTENT, "");
        assert!(ok.error_for_status().is_ok());

        let err = ApiResponse::new(StatusCode::FORBIDDEN, "denied")
            .error_for_status()
            .unwrap_err();
        match err {
            HubError::Status { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "denied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_response_value_decode_error() {
        let response = ApiResponse::new(StatusCode::OK, "<html>");
        assert!(matches!(response.value(), Err(HubError::Decode(_))));
    }
}
