//! Tool-level timeout behavior: work finishing inside the budget
//! succeeds normally; work exceeding it is cancelled and reported as an
//! `isError` result carrying the timeout marker, not a JSON-RPC error.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use conduit_mcp::client::McpClient;
use conduit_mcp::registry::{RegisteredTool, ToolOutput};
use conduit_mcp::server::McpServer;
use conduit_mcp::transport::StdioTransport;

fn sleepy_tool(name: &str, work: Duration, timeout: Duration) -> RegisteredTool {
    RegisteredTool::builder(name)
        .timeout(timeout)
        .handler_fn(move |_args, _ctx| async move {
            tokio::time::sleep(work).await;
            Ok(ToolOutput::Text(format!(
                "Done after {}ms",
                work.as_millis()
            )))
        })
        .build()
        .unwrap()
}

async fn connected_client(server: &McpServer) -> McpClient {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_io);
    let _session = server.serve(Arc::new(StdioTransport::from_parts(
        Box::new(server_read),
        Box::new(server_write),
    )));
    let (client_read, client_write) = tokio::io::split(client_io);
    McpClient::builder()
        .connect(Arc::new(StdioTransport::from_parts(
            Box::new(client_read),
            Box::new(client_write),
        )))
        .await
        .unwrap()
}

#[tokio::test]
async fn slow_tool_within_budget_succeeds() {
    let server = McpServer::builder()
        .tool(sleepy_tool(
            "steady",
            Duration::from_millis(50),
            Duration::from_millis(200),
        ))
        .build()
        .unwrap();
    let client = connected_client(&server).await;

    let result = client.call_tool("steady", Value::Null).await.unwrap();
    assert!(!result.is_error);
    assert!(result.first_text().unwrap().contains("Done after 50ms"));
    assert!(!result.is_timeout());
}

#[tokio::test]
async fn slow_tool_exceeding_budget_times_out() {
    let server = McpServer::builder()
        .tool(sleepy_tool(
            "laggard",
            Duration::from_millis(300),
            Duration::from_millis(200),
        ))
        .build()
        .unwrap();
    let client = connected_client(&server).await;

    let result = client.call_tool("laggard", Value::Null).await.unwrap();
    assert!(result.is_error);
    assert!(result.is_timeout());
    assert_eq!(result.meta.as_ref().unwrap()["isTimeout"], true);
}

#[tokio::test]
async fn default_tool_timeout_applies_without_a_per_tool_one() {
    let server = McpServer::builder()
        .default_tool_timeout(Duration::from_millis(100))
        .tool(
            RegisteredTool::builder("unbudgeted")
                .handler_fn(|_args, _ctx| async move {
                    tokio::time::sleep(Duration::from_millis(400)).await;
                    Ok(ToolOutput::Text("too late".to_string()))
                })
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    let client = connected_client(&server).await;

    let result = client.call_tool("unbudgeted", Value::Null).await.unwrap();
    assert!(result.is_error);
    assert!(result.is_timeout());
}

#[tokio::test]
async fn per_tool_timeout_overrides_the_default() {
    let server = McpServer::builder()
        // Tight default, generous per-tool budget: the tool wins.
        .default_tool_timeout(Duration::from_millis(50))
        .tool(sleepy_tool(
            "patient",
            Duration::from_millis(150),
            Duration::from_millis(500),
        ))
        .build()
        .unwrap();
    let client = connected_client(&server).await;

    let result = client.call_tool("patient", Value::Null).await.unwrap();
    assert!(!result.is_error, "per-tool budget should override default");
}

#[tokio::test]
async fn timed_out_tool_scope_is_cancelled() {
    let (observed_tx, mut observed_rx) = tokio::sync::mpsc::unbounded_channel();
    let server = McpServer::builder()
        .tool(
            RegisteredTool::builder("observant")
                .timeout(Duration::from_millis(80))
                .handler_fn(move |_args, ctx| {
                    let observed = observed_tx.clone();
                    async move {
                        // Background work watching the invocation scope:
                        // the timeout must cancel it even though the
                        // handler future itself is simply dropped.
                        let scope = ctx.cancellation_token().clone();
                        tokio::spawn(async move {
                            scope.cancelled().await;
                            let _ = observed.send(());
                        });
                        tokio::time::sleep(Duration::from_secs(10)).await;
                        Ok(ToolOutput::Text("never delivered".to_string()))
                    }
                })
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    let client = connected_client(&server).await;

    let result = client.call_tool("observant", Value::Null).await.unwrap();
    assert!(result.is_timeout());

    // The handler observed its cancellation.
    let seen = tokio::time::timeout(Duration::from_secs(2), observed_rx.recv()).await;
    assert!(seen.is_ok(), "tool scope must be cancelled on timeout");
}
