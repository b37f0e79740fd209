//! WebSocket transport
//!
//! Console websocket client on top of `tokio-tungstenite`. Only text frames carry
//! console events; pings and pongs are answered by tungstenite and skipped here.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::core::hooks::{ConsoleSocket, SocketConnector};
use crate::error::{HubError, Result};
use crate::logger::log;

/// Opens console sockets with a bounded connect time
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn open(&self, url: &str, origin: &str) -> Result<Box<dyn ConsoleSocket>> {
        let mut request = url
            .into_client_request()
            .map_err(|e| HubError::WebSocket(format!("invalid socket url: {}", e)))?;
        let origin = HeaderValue::from_str(origin)
            .map_err(|e| HubError::WebSocket(format!("invalid origin: {}", e)))?;
        request.headers_mut().insert(ORIGIN, origin);

        let (ws_stream, _response) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| HubError::WebSocket("connect timed out".to_string()))?
            .map_err(|e| HubError::WebSocket(e.to_string()))?;

        log::debug!(url = %url, "Console socket opened");
        Ok(Box::new(TungsteniteSocket::new(ws_stream)))
    }
}

/// One console websocket
pub struct TungsteniteSocket {
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

impl TungsteniteSocket {
    pub fn new(ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self {
            ws_stream,
            closed: false,
        }
    }
}

#[async_trait]
impl ConsoleSocket for TungsteniteSocket {
    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.closed {
            return Err(HubError::WebSocket("socket is closed".to_string()));
        }
        self.ws_stream
            .send(Message::text(text))
            .await
            .map_err(|e| HubError::WebSocket(e.to_string()))
    }

    async fn next_text(&mut self) -> Result<Option<String>> {
        if self.closed {
            return Ok(None);
        }
        loop {
            match self.ws_stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
                Some(Ok(Message::Binary(data))) => {
                    // Wings only sends text, but tolerate UTF-8 binary frames
                    if let Ok(text) = String::from_utf8(data.to_vec()) {
                        return Ok(Some(text));
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.closed = true;
                    return Ok(None);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.closed = true;
                    return Err(HubError::WebSocket(e.to_string()));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.ws_stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(HubError::WebSocket(e.to_string())),
        }
    }
}
