//! JSON-RPC 2.0 client over a child process's stdio
//!
//! Requests go out as one JSON document per line. A background task reads the
//! child's stdout, frames it with [`LineBuffer`] and completes the matching
//! pending request. Each pending entry is removed exactly once: either by its
//! response or by its caller's timeout.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::framing::LineBuffer;
use sdk::errors::BoardError;

/// Protocol revision announced in `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Serialize)]
struct RpcNotification<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

/// Error member of a response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// A response read from the child
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    /// Parse one stdout line.
    ///
    /// Notifications and requests from the child (anything carrying
    /// `method`), non-JSON chatter and responses without a numeric id all
    /// yield `None`.
    pub fn from_line(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line).ok()?;
        if value.get("method").is_some() {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    pub fn into_result(self) -> Result<Value, BoardError> {
        if let Some(error) = self.error {
            return Err(BoardError::Protocol(format!(
                "{} (code {})",
                error.message, error.code
            )));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// Request/response multiplexer for one child process
pub struct RpcClient {
    writer: Mutex<Writer>,
    pending: Pending,
    next_id: AtomicU64,
    connected: Arc<AtomicBool>,
    ready: AtomicBool,
    reader: JoinHandle<()>,
}

impl RpcClient {
    /// Start reading `reader` in the background and write requests to `writer`.
    pub fn start<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(read_loop(
            reader,
            Arc::clone(&pending),
            Arc::clone(&connected),
        ));

        Self {
            writer: Mutex::new(Box::new(writer)),
            pending,
            next_id: AtomicU64::new(1),
            connected,
            ready: AtomicBool::new(false),
            reader,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && self.is_connected()
    }

    /// Requests still waiting for a response
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Run the `initialize` handshake and confirm it with
    /// `notifications/initialized`.
    pub async fn initialize(&self, timeout: Duration) -> Result<Value, BoardError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "boardsync",
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let result = self.send_request("initialize", params, timeout).await?;
        self.notify("notifications/initialized", None).await?;
        self.ready.store(true, Ordering::SeqCst);

        let server = result
            .pointer("/serverInfo/name")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown");
        debug!(server, "Tool process initialized");
        Ok(result)
    }

    /// Send a request once the handshake has completed.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, BoardError> {
        if !self.is_connected() {
            return Err(BoardError::NotConnected);
        }
        if !self.ready.load(Ordering::SeqCst) {
            return Err(BoardError::NotReady);
        }
        self.send_request(method, params, timeout).await
    }

    /// Send a notification. No response is expected.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), BoardError> {
        let notification = RpcNotification {
            jsonrpc: "2.0",
            method,
            params,
        };
        let line = serde_json::to_string(&notification)
            .map_err(|e| BoardError::Protocol(format!("Failed to encode notification: {}", e)))?;
        self.write_line(&line).await
    }

    /// Stop reading and fail every outstanding request.
    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.ready.store(false, Ordering::SeqCst);
        self.reader.abort();
        // Dropping the senders wakes the waiters with NotConnected.
        self.pending.lock().await.clear();
        let _ = self.writer.lock().await.shutdown().await;
    }

    async fn send_request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, BoardError> {
        if !self.is_connected() {
            return Err(BoardError::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        let line = serde_json::to_string(&request)
            .map_err(|e| BoardError::Protocol(format!("Failed to encode request: {}", e)))?;

        // Register before writing so a fast response cannot be missed.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        if !self.is_connected() {
            self.pending.lock().await.remove(&id);
            return Err(BoardError::NotConnected);
        }

        if let Err(e) = self.write_line(&line).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }
        trace!(id, method, "Request sent");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response.into_result(),
            Ok(Err(_)) => Err(BoardError::NotConnected),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(BoardError::ProtocolTimeout {
                    method: method.to_string(),
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    async fn write_line(&self, line: &str) -> Result<(), BoardError> {
        let mut writer = self.writer.lock().await;
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;

        result.map_err(|e| {
            self.connected.store(false, Ordering::SeqCst);
            BoardError::Protocol(format!("Failed to write to tool process: {}", e))
        })
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop<R>(mut reader: R, pending: Pending, connected: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = LineBuffer::new();
    let mut chunk = vec![0u8; 8192];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => {
                debug!("Tool process closed stdout");
                break;
            }
            Ok(n) => {
                lines.push(&chunk[..n]);
                while let Some(line) = lines.next_line() {
                    dispatch(&line, &pending).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to read from tool process");
                break;
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    pending.lock().await.clear();
}

async fn dispatch(line: &str, pending: &Pending) {
    let Some(response) = RpcResponse::from_line(line) else {
        trace!(line, "Ignoring non-response line");
        return;
    };

    let waiter = pending.lock().await.remove(&response.id);
    match waiter {
        Some(tx) => {
            // The waiter may have timed out in the meantime.
            let _ = tx.send(response);
        }
        None => debug!(id = response.id, "Response for unknown request id"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader, DuplexStream};

    /// A client wired to in-memory pipes, plus the "child" ends.
    fn pair() -> (RpcClient, BufReader<DuplexStream>, DuplexStream) {
        let (client_out, child_in) = duplex(64 * 1024);
        let (child_out, client_in) = duplex(64 * 1024);
        let client = RpcClient::start(client_in, client_out);
        (client, BufReader::new(child_in), child_out)
    }

    async fn read_request(requests: &mut BufReader<DuplexStream>) -> Value {
        let mut line = String::new();
        requests.read_line(&mut line).await.unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[test]
    fn test_response_parsing() {
        let ok = RpcResponse::from_line(r#"{"jsonrpc":"2.0","id":3,"result":{"a":1}}"#).unwrap();
        assert_eq!(ok.id, 3);
        assert_eq!(ok.into_result().unwrap(), json!({"a": 1}));

        let err = RpcResponse::from_line(
            r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        assert!(matches!(err.into_result(), Err(BoardError::Protocol(m)) if m.contains("-32601")));
    }

    #[test]
    fn test_non_responses_ignored() {
        assert!(RpcResponse::from_line("starting server...").is_none());
        assert!(RpcResponse::from_line(
            r#"{"jsonrpc":"2.0","method":"notifications/message","params":{}}"#
        )
        .is_none());
        assert!(RpcResponse::from_line(r#"{"jsonrpc":"2.0","id":"abc","result":{}}"#).is_none());
    }

    #[tokio::test]
    async fn test_request_before_initialize_is_not_ready() {
        let (client, _requests, _responses) = pair();
        let result = client
            .request("tools/call", json!({}), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(BoardError::NotReady)));
    }

    #[tokio::test]
    async fn test_initialize_then_request() {
        let (client, mut requests, mut responses) = pair();

        let child = tokio::spawn(async move {
            let init = read_request(&mut requests).await;
            assert_eq!(init["method"], "initialize");
            assert_eq!(init["id"], 1);
            assert_eq!(init["params"]["protocolVersion"], PROTOCOL_VERSION);
            // Split the response across two writes.
            responses
                .write_all(br#"{"jsonrpc":"2.0","id":1,"res"#)
                .await
                .unwrap();
            responses
                .write_all(b"ult\":{\"serverInfo\":{\"name\":\"fake\"}}}\n")
                .await
                .unwrap();

            let initialized = read_request(&mut requests).await;
            assert_eq!(initialized["method"], "notifications/initialized");
            assert!(initialized.get("id").is_none());

            let call = read_request(&mut requests).await;
            assert_eq!(call["id"], 2);
            responses
                .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n")
                .await
                .unwrap();
            responses
                .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"ok\":true}}\n")
                .await
                .unwrap();
            (requests, responses)
        });

        client.initialize(Duration::from_secs(5)).await.unwrap();
        assert!(client.is_ready());
        let value = client
            .request("tools/call", json!({"name": "x"}), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(value, json!({"ok": true}));
        assert_eq!(client.pending_count().await, 0);
        let _ = child.await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_removes_pending_entry() {
        let (client, _requests, _responses) = pair();
        let result = client
            .send_request("initialize", json!({}), Duration::from_millis(50))
            .await;
        match result {
            Err(BoardError::ProtocolTimeout { method, .. }) => assert_eq!(method, "initialize"),
            other => panic!("Expected ProtocolTimeout, got {:?}", other),
        }
        assert_eq!(client.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_eof_fails_waiters() {
        let (client, mut requests, responses) = pair();

        let child = tokio::spawn(async move {
            let _ = read_request(&mut requests).await;
            drop(responses);
            requests
        });

        let result = client
            .send_request("initialize", json!({}), Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(BoardError::NotConnected)));
        assert!(!client.is_connected());
        let _ = child.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_rejects_further_requests() {
        let (client, _requests, _responses) = pair();
        client.close().await;
        assert!(!client.is_connected());
        let result = client
            .send_request("initialize", json!({}), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(BoardError::NotConnected)));
    }
}
