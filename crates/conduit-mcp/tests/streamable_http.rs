//! Streamable HTTP end-to-end: a real axum server on a loopback port,
//! the streamable client transport, session binding, the origin guard,
//! and SSE resumability through `Last-Event-ID`.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};
use tokio::time::timeout;

use conduit_mcp::client::McpClient;
use conduit_mcp::protocol::{JsonRpcMessage, Uri};
use conduit_mcp::registry::{RegisteredTool, ToolOutput};
use conduit_mcp::server::McpServer;
use conduit_mcp::transport::http::{
    AllowedOrigins, ReconnectPolicy, StreamableClientTransport, StreamableServerConfig,
};
use conduit_mcp::transport::SseParser;

fn test_server() -> Arc<McpServer> {
    McpServer::builder()
        .server_info("http-server", "1.0.0")
        .tool(
            RegisteredTool::builder("echo")
                .input_schema(json!({
                    "type": "object",
                    "properties": {"message": {"type": "string"}},
                    "required": ["message"]
                }))
                .handler_fn(|args, _ctx| async move {
                    Ok(ToolOutput::Text(
                        args.get("message")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    ))
                })
                .build()
                .unwrap(),
        )
        .resource(conduit_mcp::registry::RegisteredResource::concrete_fn(
            conduit_mcp::protocol::Resource::new(Uri::new_unchecked("mem://watched"), "watched"),
            |uri, _vars, _ctx| async move {
                Ok(conduit_mcp::protocol::ReadResourceResult {
                    contents: vec![conduit_mcp::protocol::ResourceContents::text(uri, "data")],
                })
            },
        ))
        .build()
        .unwrap()
}

/// Bind the streamable router on an ephemeral loopback port
async fn spawn_http(
    server: &Arc<McpServer>,
    config: StreamableServerConfig,
) -> (String, Arc<conduit_mcp::transport::http::StreamableHttpServer>) {
    let (http, router) = server.streamable_http(config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    (format!("http://{addr}/mcp"), http)
}

async fn connect_client(url: &str) -> (McpClient, tokio::sync::mpsc::UnboundedReceiver<Uri>) {
    let (updates_tx, updates_rx) = tokio::sync::mpsc::unbounded_channel();
    let transport = StreamableClientTransport::new(url, ReconnectPolicy::default()).unwrap();
    let client = McpClient::builder()
        .client_info("http-client", "0.1.0")
        .on_resource_updated(move |uri| {
            let _ = updates_tx.send(uri);
        })
        .connect(Arc::new(transport))
        .await
        .unwrap();
    (client, updates_rx)
}

#[tokio::test]
async fn initialize_and_call_over_streamable_http() {
    let server = test_server();
    let (url, http) = spawn_http(&server, StreamableServerConfig::default()).await;

    let (client, _updates) = connect_client(&url).await;
    assert_eq!(client.initialize_result().server_info.name, "http-server");
    assert_eq!(http.session_ids().len(), 1);

    let result = client
        .call_tool("echo", json!({"message": "over http"}))
        .await
        .unwrap();
    assert_eq!(result.first_text(), Some("over http"));

    client.ping().await.unwrap();
    client.close().await;
}

#[tokio::test]
async fn unsolicited_messages_flow_on_the_get_stream() {
    let server = test_server();
    let (url, _http) = spawn_http(&server, StreamableServerConfig::default()).await;
    let (client, mut updates) = connect_client(&url).await;

    let uri = Uri::new_unchecked("mem://watched");
    client.subscribe_resource(&uri).await.unwrap();
    // The GET stream may still be attaching; retry the signal briefly.
    let mut received = None;
    for _ in 0..20 {
        server.notify_resource_updated(&uri).await;
        if let Ok(Some(seen)) = timeout(Duration::from_millis(250), updates.recv()).await {
            received = Some(seen);
            break;
        }
    }
    assert_eq!(received, Some(uri));
}

#[tokio::test]
async fn sse_replay_after_last_event_id() {
    let server = test_server();
    let (url, http) = spawn_http(&server, StreamableServerConfig::default()).await;
    let (client, mut updates) = connect_client(&url).await;

    let uri = Uri::new_unchecked("mem://watched");
    client.subscribe_resource(&uri).await.unwrap();
    let session_id = http.session_ids().pop().unwrap();

    // Three updates land in the event store with ids 1..=3.
    for _ in 0..3 {
        server.notify_resource_updated(&uri).await;
    }
    // Drain whatever the live stream delivered.
    while timeout(Duration::from_millis(300), updates.recv()).await.is_ok() {}
    assert_eq!(http.event_store().last_event_id(&session_id), 3);

    // Reconnect with Last-Event-ID: 1 and expect exactly events 2 and 3,
    // in order, still within retention.
    let response = reqwest::Client::new()
        .get(&url)
        .header("Accept", "text/event-stream")
        .header("Mcp-Session-Id", &session_id)
        .header("Last-Event-ID", "1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let mut parser = SseParser::new();
    let mut body = response.bytes_stream();
    let mut replayed = Vec::new();
    while replayed.len() < 2 {
        let chunk = timeout(Duration::from_secs(5), body.next())
            .await
            .expect("replay timed out")
            .expect("stream ended early")
            .unwrap();
        for event in parser.feed(&chunk) {
            let message: JsonRpcMessage = serde_json::from_str(&event.data).unwrap();
            assert_eq!(message.method(), Some("notifications/resources/updated"));
            replayed.push(event.id.unwrap().parse::<u64>().unwrap());
        }
    }
    assert_eq!(replayed, vec![2, 3]);
}

#[tokio::test]
async fn origin_mismatch_is_forbidden() {
    let server = test_server();
    let config = StreamableServerConfig {
        allowed_origins: AllowedOrigins::from_origins(["http://localhost:3000"]),
        ..Default::default()
    };
    let (url, _http) = spawn_http(&server, config).await;

    let response = reqwest::Client::new()
        .post(&url)
        .header("Content-Type", "application/json")
        .header("Origin", "http://rebinder.example")
        .body(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18","clientInfo":{"name":"c","version":"0"},"capabilities":{}}}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);

    // The allowed origin passes.
    let response = reqwest::Client::new()
        .post(&url)
        .header("Content-Type", "application/json")
        .header("Origin", "http://localhost:3000")
        .body(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18","clientInfo":{"name":"c","version":"0"},"capabilities":{}}}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(response.headers().get("Mcp-Session-Id").is_some());
}

#[tokio::test]
async fn session_id_binding_and_termination() {
    let server = test_server();
    let (url, http) = spawn_http(&server, StreamableServerConfig::default()).await;
    let client = reqwest::Client::new();

    // Initialize without a session header creates the session.
    let response = client
        .post(&url)
        .header("Content-Type", "application/json")
        .body(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18","clientInfo":{"name":"raw","version":"0"},"capabilities":{}}}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let session_id = response
        .headers()
        .get("Mcp-Session-Id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["serverInfo"]["name"], "http-server");

    // A non-initialize POST without the header is rejected.
    let response = client
        .post(&url)
        .header("Content-Type", "application/json")
        .body(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    // Notifications with the header are accepted with 202.
    let response = client
        .post(&url)
        .header("Content-Type", "application/json")
        .header("Mcp-Session-Id", &session_id)
        .body(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

    // The bound session serves requests.
    let response = client
        .post(&url)
        .header("Content-Type", "application/json")
        .header("Mcp-Session-Id", &session_id)
        .body(r#"{"jsonrpc":"2.0","id":3,"method":"tools/list"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["tools"][0]["name"], "echo");

    // DELETE terminates; the id stops resolving.
    let response = client
        .delete(&url)
        .header("Mcp-Session-Id", &session_id)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(http.session_ids().is_empty());

    let response = client
        .post(&url)
        .header("Content-Type", "application/json")
        .header("Mcp-Session-Id", &session_id)
        .body(r#"{"jsonrpc":"2.0","id":4,"method":"ping"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}
