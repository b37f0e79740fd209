mod common;

use common::*;
use ptero_hub::{outcome_to_wire, CaptureFailure, ClientServer, HubError, PanelRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const SOCKET_ABC: &str = "wss://node-a.example.com:8080/api/servers/abc-uuid/ws";
const SOCKET_DEF: &str = "wss://node-a.example.com:8080/api/servers/def-uuid/ws";

/// Client-only panel "main" whose servers accept commands and hand out sockets
fn console_panel(servers: &[(&str, &str)]) -> (Arc<StubFactory>, PanelRegistry) {
    let factory = StubFactory::new();
    let stub = factory.client("main");
    serve_servers(&stub, servers);
    for (identifier, _) in servers {
        stub.route_raw(&format!("POST client/servers/{}/command", identifier), 204, "");
        stub.route(
            &format!("GET client/servers/{}/websocket", identifier),
            200,
            websocket_json(
                &format!("jwt-{}", identifier),
                &format!("wss://node-a.example.com:8080/api/servers/{}-uuid/ws", identifier),
            ),
        );
    }
    let registry = registry(&factory, vec![client_only("main")]);
    (factory, registry)
}

async fn first_server(registry: &PanelRegistry) -> ClientServer {
    registry.get_servers(true).await.remove(0)
}

#[tokio::test]
async fn test_capture_returns_first_console_line() {
    let (factory, registry) = console_panel(&[("abc", "Survival")]);
    factory.connector.script(
        SOCKET_ABC,
        SocketScript::frames(vec![
            console_frame("auth success", &[]),
            console_frame("status", &["running"]),
            console_frame("stats", &["{}"]),
            console_frame("console output", &["There are 0 of a max of 20 players online"]),
            console_frame("console output", &["second line"]),
        ]),
    );
    let server = first_server(&registry).await;

    let (response, output) = server
        .send_command_with_output("list", None)
        .await
        .unwrap();
    assert_eq!(response.status.as_u16(), 204);
    assert_eq!(output, "There are 0 of a max of 20 players online");

    let sockets = factory.connector.opened();
    assert_eq!(sockets.len(), 1);
    assert!(sockets[0].is_closed());
    assert_eq!(sockets[0].origin, "https://main.example.com");
    let auth: Value = serde_json::from_str(&sockets[0].sent()[0]).unwrap();
    assert_eq!(auth, json!({"event": "auth", "args": ["jwt-abc"]}));

    let command = factory
        .client("main")
        .requests()
        .into_iter()
        .filter(|r| r.starts_with("POST"))
        .collect::<Vec<_>>();
    assert_eq!(command, vec!["POST client/servers/abc/command".to_string()]);
    assert_eq!(registry.open_sockets(), 0);
    registry.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_silent_console_times_out_and_closes_socket() {
    let (factory, registry) = console_panel(&[("abc", "Survival")]);
    factory.connector.script(
        SOCKET_ABC,
        SocketScript::frames(vec![console_frame("auth success", &[])]),
    );
    let server = first_server(&registry).await;

    let started = tokio::time::Instant::now();
    let (_, outcome) = server.capture_command("list", None).await.unwrap();
    assert_eq!(outcome, Err(CaptureFailure::WsTimeout));
    assert_eq!(outcome_to_wire(&outcome), "ws_timeout");
    assert!(started.elapsed() >= Duration::from_secs(5));

    let sockets = factory.connector.opened();
    assert_eq!(sockets.len(), 1);
    assert!(sockets[0].is_closed());
    assert_eq!(registry.open_sockets(), 0);
    registry.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_custom_timeout_is_honoured() {
    let (_factory, registry) = console_panel(&[("abc", "Survival")]);
    let server = first_server(&registry).await;

    let started = tokio::time::Instant::now();
    let (_, output) = server
        .send_command_with_output("list", Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(output, "ws_timeout");
    assert!(started.elapsed() < Duration::from_secs(5));
    registry.close().await;
}

#[tokio::test]
async fn test_rejected_command_never_opens_socket() {
    let (factory, registry) = console_panel(&[("abc", "Survival")]);
    factory.client("main").route(
        "POST client/servers/abc/command",
        502,
        json!({"errors": [{"code": "HttpException", "detail": "server offline"}]}),
    );
    let server = first_server(&registry).await;

    let (response, outcome) = server.capture_command("list", None).await.unwrap();
    assert_eq!(response.status.as_u16(), 502);
    assert_eq!(outcome, Err(CaptureFailure::CommandRejected));
    assert_eq!(outcome_to_wire(&outcome), "command_rejected");
    assert!(factory.connector.opened().is_empty());
    assert_eq!(factory.client("main").count("/websocket"), 0);
    registry.close().await;
}

#[tokio::test]
async fn test_websocket_credentials_failure() {
    let (factory, registry) = console_panel(&[("abc", "Survival")]);
    factory
        .client("main")
        .route("GET client/servers/abc/websocket", 403, json!({"errors": []}));
    let server = first_server(&registry).await;

    let (_, output) = server.send_command_with_output("list", None).await.unwrap();
    assert_eq!(output, "ws_fail:status 403");
    assert!(factory.connector.opened().is_empty());
    registry.close().await;
}

#[tokio::test]
async fn test_connect_failure_is_reported() {
    let (factory, registry) = console_panel(&[("abc", "Survival")]);
    factory.connector.fail_open("connect timed out");
    let server = first_server(&registry).await;

    let (_, outcome) = server.capture_command("list", None).await.unwrap();
    assert_eq!(
        outcome,
        Err(CaptureFailure::WsFail("connect timed out".to_string()))
    );
    registry.close().await;
}

#[tokio::test]
async fn test_jwt_error_frame_fails_capture() {
    let (factory, registry) = console_panel(&[("abc", "Survival")]);
    factory.connector.script(
        SOCKET_ABC,
        SocketScript::frames(vec![console_frame("jwt error", &["token is not valid"])]),
    );
    let server = first_server(&registry).await;

    let (_, output) = server.send_command_with_output("list", None).await.unwrap();
    assert_eq!(output, "ws_fail:token is not valid");
    assert!(factory.connector.opened()[0].is_closed());
    registry.close().await;
}

#[tokio::test]
async fn test_remote_close_fails_capture() {
    let (factory, registry) = console_panel(&[("abc", "Survival")]);
    factory.connector.script(
        SOCKET_ABC,
        SocketScript::closing(vec![console_frame("auth success", &[])]),
    );
    let server = first_server(&registry).await;

    let (_, outcome) = server.capture_command("list", None).await.unwrap();
    assert_eq!(outcome, Err(CaptureFailure::WsFail("closed".to_string())));
    assert!(factory.connector.opened()[0].is_closed());
    registry.close().await;
}

#[tokio::test]
async fn test_command_transport_error_is_err() {
    let (factory, registry) = console_panel(&[("abc", "Survival")]);
    let server = first_server(&registry).await;
    factory.client("main").set_failing(true);

    let err = server.capture_command("list", None).await.unwrap_err();
    assert!(matches!(err, HubError::Transport(_)));
    assert!(factory.connector.opened().is_empty());
    registry.close().await;
}

#[tokio::test]
async fn test_concurrent_captures_use_independent_sockets() {
    let (factory, registry) = console_panel(&[("abc", "Survival"), ("def", "Skyblock")]);
    factory.connector.script(
        SOCKET_ABC,
        SocketScript::frames(vec![console_frame("console output", &["from abc"])]),
    );
    factory.connector.script(
        SOCKET_DEF,
        SocketScript::frames(vec![console_frame("console output", &["from def"])]),
    );
    let servers = registry.get_servers(true).await;

    let (abc, def) = tokio::join!(
        servers[0].send_command_with_output("list", None),
        servers[1].send_command_with_output("list", None)
    );
    assert_eq!(abc.unwrap().1, "from abc");
    assert_eq!(def.unwrap().1, "from def");

    let sockets = factory.connector.opened();
    assert_eq!(sockets.len(), 2);
    assert!(sockets.iter().all(|s| s.is_closed()));
    registry.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_registry_close_cancels_listening_capture() {
    let (factory, registry) = console_panel(&[("abc", "Survival")]);
    let server = first_server(&registry).await;

    let (capture, _) = tokio::join!(server.capture_command("list", None), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(server.open_console_sockets(), 1);
        registry.close().await;
    });
    let (_, outcome) = capture.unwrap();
    assert_eq!(
        outcome,
        Err(CaptureFailure::WsFail("session closed".to_string()))
    );
    assert!(factory.connector.opened()[0].is_closed());
    assert_eq!(registry.open_sockets(), 0);
    assert_eq!(server.open_console_sockets(), 0);
}

#[tokio::test]
async fn test_websocket_credentials() {
    let (_factory, registry) = console_panel(&[("abc", "Survival")]);
    let server = first_server(&registry).await;

    let credentials = server.websocket_credentials().await.unwrap();
    assert_eq!(credentials.token, "jwt-abc");
    assert_eq!(credentials.socket, SOCKET_ABC);
    registry.close().await;
}
