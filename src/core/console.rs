//! Console capture
//!
//! Sends one console command and waits for the first line of output:
//! 1. `POST client/servers/{id}/command`, a non-2xx answer ends the capture
//! 2. fetch websocket credentials, open the socket, send the auth frame
//! 3. wait for the first `console output` frame, bounded by a timeout
//! 4. close the socket, whatever happened
//!
//! Failures are values of [`CaptureFailure`]. They become the tag strings
//! (`command_rejected`, `ws_fail:<cause>`, `ws_timeout`) only through
//! [`outcome_to_wire`].

use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

use crate::api::models::WebsocketCredentials;
use crate::api::session::{PanelSession, TrackedSocket};
use crate::core::hooks::{ApiRequest, ApiResponse};
use crate::error::{HubError, Result};
use crate::logger::log;

pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

const TAG_COMMAND_REJECTED: &str = "command_rejected";
const TAG_WS_TIMEOUT: &str = "ws_timeout";
const TAG_WS_FAIL_PREFIX: &str = "ws_fail:";

/// Why a capture produced no output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureFailure {
    /// The panel refused the command; the socket was never opened
    CommandRejected,
    /// Credentials, connect, auth or the socket itself failed
    WsFail(String),
    /// No console output arrived in time
    WsTimeout,
}

impl CaptureFailure {
    pub fn tag(&self) -> String {
        match self {
            CaptureFailure::CommandRejected => TAG_COMMAND_REJECTED.to_string(),
            CaptureFailure::WsFail(cause) => format!("{}{}", TAG_WS_FAIL_PREFIX, cause),
            CaptureFailure::WsTimeout => TAG_WS_TIMEOUT.to_string(),
        }
    }

    /// Recognise a tag string. Anything else is console output.
    pub fn from_wire(text: &str) -> Option<Self> {
        match text {
            TAG_COMMAND_REJECTED => Some(CaptureFailure::CommandRejected),
            TAG_WS_TIMEOUT => Some(CaptureFailure::WsTimeout),
            _ => text
                .strip_prefix(TAG_WS_FAIL_PREFIX)
                .map(|cause| CaptureFailure::WsFail(cause.to_string())),
        }
    }
}

impl fmt::Display for CaptureFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

impl std::error::Error for CaptureFailure {}

/// First console line, or why there is none
pub type CaptureOutcome = std::result::Result<String, CaptureFailure>;

/// Flatten an outcome into the single-string form
pub fn outcome_to_wire(outcome: &CaptureOutcome) -> String {
    match outcome {
        Ok(output) => output.clone(),
        Err(failure) => failure.tag(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Init,
    Authenticating,
    Listening,
    Done,
    Failed,
}

impl CaptureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureState::Init => "init",
            CaptureState::Authenticating => "authenticating",
            CaptureState::Listening => "listening",
            CaptureState::Done => "done",
            CaptureState::Failed => "failed",
        }
    }
}

/// One `{"event": .., "args": [..]}` frame from the console socket
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConsoleFrame {
    pub event: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl ConsoleFrame {
    pub const AUTH_SUCCESS: &'static str = "auth success";
    pub const CONSOLE_OUTPUT: &'static str = "console output";
    pub const JWT_ERROR: &'static str = "jwt error";
    pub const DAEMON_ERROR: &'static str = "daemon error";
    pub const TOKEN_EXPIRED: &'static str = "token expired";

    /// `None` for frames that are not JSON events
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn first_arg(&self) -> Option<String> {
        self.args.first().map(|arg| match arg {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn auth(token: &str) -> String {
        json!({ "event": "auth", "args": [token] }).to_string()
    }
}

/// Capture protocol for one server of one panel
pub struct ConsoleCapture<'a> {
    session: &'a PanelSession,
    server_id: &'a str,
}

impl<'a> ConsoleCapture<'a> {
    pub fn new(session: &'a PanelSession, server_id: &'a str) -> Self {
        Self { session, server_id }
    }

    fn enter(&self, state: CaptureState, detail: Option<&str>) {
        log::capture(self.server_id, state.as_str(), detail);
    }

    /// Run the capture. `Err` only when the command request got no response.
    pub async fn run(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<(ApiResponse, CaptureOutcome)> {
        self.enter(CaptureState::Init, Some(command));
        let request = ApiRequest::post(format!("client/servers/{}/command", self.server_id))
            .json(json!({ "command": command }));
        let response = self.session.send(request).await?;
        if !response.is_success() {
            let failure = CaptureFailure::CommandRejected;
            self.enter(CaptureState::Failed, Some(&failure.tag()));
            return Ok((response, Err(failure)));
        }

        let outcome = self.listen(timeout).await;
        match &outcome {
            Ok(_) => self.enter(CaptureState::Done, None),
            Err(failure) => self.enter(CaptureState::Failed, Some(&failure.tag())),
        }
        Ok((response, outcome))
    }

    pub(crate) async fn credentials(&self) -> Result<WebsocketCredentials> {
        let value = self
            .session
            .get_json(&format!("client/servers/{}/websocket", self.server_id))
            .await?;
        let data = value
            .get("data")
            .ok_or_else(|| HubError::Decode("websocket response without 'data'".to_string()))?;
        Ok(WebsocketCredentials::deserialize(data)?)
    }

    async fn listen(&self, timeout: Duration) -> CaptureOutcome {
        self.enter(CaptureState::Authenticating, None);
        let credentials = self.credentials().await.map_err(ws_fail)?;
        let mut socket = self
            .session
            .open_socket(&credentials.socket, self.server_id)
            .await
            .map_err(ws_fail)?;

        let outcome = self
            .authenticate_and_wait(&mut socket, &credentials.token, timeout)
            .await;

        if let Err(e) = socket.close().await {
            log::debug!(server = %self.server_id, error = %e, "Console socket close failed");
        }
        outcome
    }

    async fn authenticate_and_wait(
        &self,
        socket: &mut TrackedSocket,
        token: &str,
        timeout: Duration,
    ) -> CaptureOutcome {
        socket
            .send_text(ConsoleFrame::auth(token))
            .await
            .map_err(ws_fail)?;
        self.enter(CaptureState::Listening, None);

        let cancel_token = socket.cancel_token();
        tokio::select! {
            _ = cancel_token.cancelled() => {
                Err(CaptureFailure::WsFail("session closed".to_string()))
            }
            result = tokio::time::timeout(timeout, first_output(socket)) => {
                result.unwrap_or(Err(CaptureFailure::WsTimeout))
            }
        }
    }
}

fn ws_fail(error: HubError) -> CaptureFailure {
    let cause = match error {
        HubError::WebSocket(cause) | HubError::Transport(cause) | HubError::Decode(cause) => cause,
        HubError::Status { status, .. } => format!("status {}", status),
        HubError::SessionClosed(_) => "session closed".to_string(),
        other => other.to_string(),
    };
    CaptureFailure::WsFail(cause)
}

async fn first_output(socket: &mut TrackedSocket) -> CaptureOutcome {
    loop {
        let text = match socket.next_text().await {
            Ok(Some(text)) => text,
            Ok(None) => return Err(CaptureFailure::WsFail("closed".to_string())),
            Err(e) => return Err(ws_fail(e)),
        };
        let Some(frame) = ConsoleFrame::parse(&text) else {
            continue;
        };
        match frame.event.as_str() {
            ConsoleFrame::CONSOLE_OUTPUT => {
                if let Some(line) = frame.first_arg() {
                    return Ok(line);
                }
            }
            ConsoleFrame::JWT_ERROR | ConsoleFrame::DAEMON_ERROR | ConsoleFrame::TOKEN_EXPIRED => {
                let cause = frame.first_arg().unwrap_or_else(|| frame.event.clone());
                return Err(CaptureFailure::WsFail(cause));
            }
            _ => continue,
        }
    }
}
