//! HTTP transport
//!
//! `reqwest` client carrying one panel credential as default headers.

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::core::hooks::{ApiRequest, ApiResponse, HttpTransport};
use crate::error::{HubError, Result};
use crate::logger::log;

pub struct ReqwestTransport {
    base_url: String,
    client: RwLock<Option<Client>>,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl ReqwestTransport {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| HubError::Config(format!("API key is not a valid header value: {}", e)))?;
        headers.insert(header::AUTHORIZATION, bearer);
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| HubError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: RwLock::new(Some(client)),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let client = self
            .client
            .read()
            .await
            .clone()
            .ok_or_else(|| HubError::SessionClosed(self.base_url.clone()))?;

        let mut builder = client.request(request.method.clone(), self.endpoint(&request.path));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            HubError::Transport(format!("{} {} failed: {}", request.method, request.path, e))
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(ApiResponse {
            status,
            body,
            headers,
        })
    }

    async fn close(&self) {
        if self.client.write().await.take().is_some() {
            log::debug!(base_url = %self.base_url, "HTTP client released");
        }
    }
}
