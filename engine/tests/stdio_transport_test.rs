//! Integration tests for the stdio tool-process transport
//!
//! Most tests drive the transport over in-memory pipes against a scripted
//! tool server. The unix-only tests spawn a real `sh` child.

use boardsync_engine::config::{Config, Credentials, RunConfig, RunMode, TransportKind};
use boardsync_engine::secrets::SecretString;
use boardsync_engine::transport::stdio::capabilities::ToolDescriptor;
use boardsync_engine::transport::StdioTransport;
use sdk::errors::BoardError;
use sdk::transport::{BoardTransport, ContainerSpec};
use sdk::types::PlacedItem;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

type Handler = Arc<dyn Fn(&str, &Value) -> Option<Value> + Send + Sync>;

fn settings() -> Config {
    let mut settings = Config::default();
    settings.stdio.call_delay_ms = 0;
    settings.stdio.connect_timeout_secs = 2;
    settings.stdio.call_timeout_secs = 1;
    settings
}

fn run_config(settings: Config) -> Arc<RunConfig> {
    Arc::new(
        RunConfig::new(
            "board-1",
            "notes.md",
            TransportKind::Stdio,
            RunMode::Execute,
            Credentials {
                board_token: SecretString::new("test-token"),
                extraction_key: None,
            },
            settings,
        )
        .unwrap(),
    )
}

fn text(text: &str) -> Value {
    json!({ "content": [{ "type": "text", "text": text }] })
}

/// Scripted tool server on in-memory pipes. Returns the transport's ends.
fn fake_server(handler: Handler) -> (DuplexStream, DuplexStream) {
    let (transport_out, server_in) = duplex(64 * 1024);
    let (mut server_out, transport_in) = duplex(64 * 1024);

    tokio::spawn(async move {
        let mut lines = BufReader::new(server_in).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let request: Value = serde_json::from_str(&line).unwrap();
            let Some(id) = request.get("id").cloned() else {
                continue;
            };
            let result = match request["method"].as_str() {
                Some("initialize") => Some(json!({ "serverInfo": { "name": "fake" } })),
                Some("tools/call") => handler(
                    request["params"]["name"].as_str().unwrap_or_default(),
                    &request["params"]["arguments"],
                ),
                _ => None,
            };
            if let Some(result) = result {
                let response = json!({ "jsonrpc": "2.0", "id": id, "result": result });
                let mut bytes = response.to_string().into_bytes();
                bytes.push(b'\n');
                if server_out.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        }
    });

    (transport_in, transport_out)
}

async fn connect(settings: Config, handler: Handler) -> StdioTransport {
    let (reader, writer) = fake_server(handler);
    StdioTransport::connect_with_io(run_config(settings), reader, writer)
        .await
        .unwrap()
}

fn spec(title: &str) -> ContainerSpec<'_> {
    ContainerSpec {
        title,
        x: 2400.0,
        y: 0.0,
        width: 2000.0,
        height: 1600.0,
    }
}

fn item(content: &str) -> PlacedItem {
    PlacedItem {
        content: content.to_string(),
        x: 1.0,
        y: 2.0,
        width: 200.0,
        remote_id: None,
        container_id: Some("f1".to_string()),
    }
}

#[tokio::test]
async fn test_ensure_container_reuses_listed_frame() {
    let transport = connect(
        settings(),
        Arc::new(|tool, _| match tool {
            "get_frames" => Some(text("Frames:\nFrame \"Risks\" (ID: 3074457)")),
            _ => panic!("unexpected tool {}", tool),
        }),
    )
    .await;

    let container = transport
        .ensure_container("board-1", spec("Risks"))
        .await
        .unwrap();
    assert_eq!(container.id, "3074457");
    // Text listings carry no geometry; the requested geometry fills in.
    assert_eq!(container.width, 2000.0);
    assert_eq!(container.x, 2400.0);
}

#[tokio::test]
async fn test_ensure_container_creates_shape_when_missing() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let seen = calls.clone();
    let transport = connect(
        settings(),
        Arc::new(move |tool, args| {
            seen.lock().unwrap().push((tool.to_string(), args.clone()));
            match tool {
                "get_frames" => Some(text("[]")),
                "create_shape" => Some(text("Shape created with ID: 3458764")),
                _ => None,
            }
        }),
    )
    .await;

    let container = transport
        .ensure_container("board-1", spec("Risks"))
        .await
        .unwrap();
    assert_eq!(container.id, "3458764");
    assert_eq!(container.title, "Risks");

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].0, "create_shape");
    assert_eq!(calls[1].1["boardId"], "board-1");
    assert_eq!(calls[1].1["width"], 2000.0);
}

#[tokio::test]
async fn test_created_frame_without_id_gets_local_id() {
    let transport = connect(
        settings(),
        Arc::new(|tool, _| match tool {
            "get_frames" => Some(text("No frames found")),
            "create_shape" => Some(text("Done!")),
            _ => None,
        }),
    )
    .await;

    let container = transport
        .ensure_container("board-1", spec("Insights"))
        .await
        .unwrap();
    assert!(container.id.starts_with("local-"));
}

#[tokio::test]
async fn test_list_items_decodes_json_text() {
    let transport = connect(
        settings(),
        Arc::new(|tool, args| match tool {
            "get_items_in_frame" => {
                assert_eq!(args["frameId"], "f1");
                Some(text(
                    &json!({ "data": [
                        { "id": "1", "data": { "content": "a\n\n[runId:0123456789]" } },
                        { "id": "2", "data": { "content": "b" } }
                    ]})
                    .to_string(),
                ))
            }
            _ => None,
        }),
    )
    .await;

    let items = transport
        .list_items_in_container("board-1", "f1")
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.parent_id.as_deref() == Some("f1")));
}

#[tokio::test]
async fn test_missing_item_listing_tool_returns_empty() {
    let mut settings = settings();
    settings.stdio.catalog = Some(vec![
        ToolDescriptor::new("create_shape", ""),
        ToolDescriptor::new("create_sticky_note", ""),
    ]);
    let transport = connect(
        settings,
        Arc::new(|tool, _| panic!("unexpected tool {}", tool)),
    )
    .await;

    let items = transport
        .list_items_in_container("board-1", "f1")
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_missing_required_capability_fails_connect() {
    let mut settings = settings();
    settings.stdio.catalog = Some(vec![ToolDescriptor::new("create_sticky_note", "")]);
    let (reader, writer) = fake_server(Arc::new(|_, _| None));

    let result = StdioTransport::connect_with_io(run_config(settings), reader, writer).await;
    match result {
        Err(BoardError::MissingCapability(name)) => assert_eq!(name, "create_shape"),
        Err(other) => panic!("Expected MissingCapability, got {:?}", other),
        Ok(_) => panic!("Expected MissingCapability, got a transport"),
    }
}

#[tokio::test]
async fn test_batch_isolates_tool_error() {
    let transport = connect(
        settings(),
        Arc::new(|tool, args| match (tool, args["content"].as_str()) {
            ("create_sticky_note", Some("second")) => Some(json!({
                "isError": true,
                "content": [{ "type": "text", "text": "content too long" }]
            })),
            ("create_sticky_note", Some("first")) => Some(json!({ "id": "111" })),
            ("create_sticky_note", _) => Some(text("Sticky note created")),
            _ => None,
        }),
    )
    .await;

    let items = vec![item("first"), item("second"), item("third")];
    let result = transport.batch_create("board-1", &items, 10).await;

    assert_eq!(result.ok, 2);
    assert_eq!(result.created.len(), 2);
    assert_eq!(result.created[0], "111");
    assert!(result.created[1].starts_with("local-"));
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].index, 1);
    assert!(result.failed[0].error.contains("content too long"));
}

#[tokio::test]
async fn test_unanswered_call_times_out() {
    let transport = connect(settings(), Arc::new(|_, _| None)).await;

    let result = transport.call_tool("get_frames", json!({})).await;
    assert!(matches!(
        result,
        Err(BoardError::ProtocolTimeout { timeout_secs: 1, .. })
    ));
    assert!(transport.is_connected());
}

#[tokio::test]
async fn test_calls_after_disconnect_fail_fast() {
    let transport = connect(settings(), Arc::new(|_, _| Some(text("[]")))).await;

    transport.disconnect().await.unwrap();
    assert!(!transport.is_connected());

    let result = transport.list_items_in_container("board-1", "f1").await;
    assert!(matches!(result, Err(BoardError::NotConnected)));

    let batch = transport.batch_create("board-1", &[item("x")], 10).await;
    assert_eq!(batch.ok, 0);
    assert_eq!(batch.failed.len(), 1);
}

#[tokio::test]
async fn test_silent_server_fails_handshake() {
    let (transport_out, _server_in) = duplex(1024);
    let (_server_out, transport_in) = duplex(1024);

    let result =
        StdioTransport::connect_with_io(run_config(settings()), transport_in, transport_out).await;
    assert!(matches!(
        result,
        Err(BoardError::ProtocolTimeout { method, .. }) if method == "initialize"
    ));
}

#[cfg(unix)]
mod process {
    use super::*;

    /// Shell tool server that splits its initialize response across two
    /// writes, then answers one tool call.
    const FRAGMENTED_SERVER: &str = r#"
read -r line
printf '{"jsonrpc":"2.0","id":'
sleep 0.2
printf '1,"result":{"serverInfo":{"name":"sh"}}}\n'
read -r line
read -r line
echo "handling tool call" >&2
printf '{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"Created sticky note with ID: 777"}]}}\n'
cat > /dev/null
"#;

    fn shell_settings(script: &str) -> Config {
        let mut settings = settings();
        settings.stdio.command = "sh".to_string();
        settings.stdio.args = vec!["-c".to_string(), script.to_string()];
        settings
    }

    #[tokio::test]
    async fn test_fragmented_response_is_reassembled() {
        let transport = StdioTransport::connect(run_config(shell_settings(FRAGMENTED_SERVER)))
            .await
            .unwrap();

        let result = transport
            .batch_create("board-1", &[item("hello")], 10)
            .await;
        assert_eq!(result.created, vec!["777"]);

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_token_reaches_child_environment() {
        let script = r#"
read -r line
printf '{"jsonrpc":"2.0","id":1,"result":{}}\n'
read -r line
read -r line
printf '{"jsonrpc":"2.0","id":2,"result":{"id":"%s"}}\n' "$MIRO_ACCESS_TOKEN"
cat > /dev/null
"#;
        let transport = StdioTransport::connect(run_config(shell_settings(script)))
            .await
            .unwrap();

        let result = transport.batch_create("board-1", &[item("x")], 10).await;
        assert_eq!(result.created, vec!["test-token"]);
        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_exiting_child_fails_handshake() {
        let result =
            StdioTransport::connect(run_config(shell_settings("read -r line; exit 0"))).await;
        assert!(matches!(result, Err(BoardError::NotConnected)));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let mut settings = settings();
        settings.stdio.command = "/nonexistent/tool-server".to_string();
        settings.stdio.args = Vec::new();
        let result = StdioTransport::connect(run_config(settings)).await;
        assert!(matches!(result, Err(BoardError::Spawn(_))));
    }
}
