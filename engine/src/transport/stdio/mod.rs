//! Stdio tool-process transport
//!
//! Spawns a board tool server as a child process and drives it with
//! line-delimited JSON-RPC over its stdin/stdout. Board operations are mapped
//! onto tools through a [`CapabilityTable`] resolved at connect time; tool
//! results are decoded by one [`ResultDecoder`](decode::ResultDecoder) per
//! result shape.
//!
//! The child's stderr is forwarded to the log at debug level and never parsed.

pub mod capabilities;
pub mod decode;
pub mod framing;
pub mod rpc;

use async_trait::async_trait;
use sdk::errors::BoardError;
use sdk::transport::{BoardTransport, ContainerSpec};
use sdk::types::{BatchResult, Container, ExistingItem, PlacedItem};
use serde_json::{json, Value};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RunConfig;
use capabilities::{default_catalog, Capability, CapabilityTable};
use decode::{decode_tool_result, tool_error, ContainerListDecoder, CreatedIdDecoder, ItemListDecoder};
use rpc::RpcClient;

pub struct StdioTransport {
    table: CapabilityTable,
    rpc: RpcClient,
    child: Mutex<Option<Child>>,
    call_timeout: Duration,
    call_delay: Duration,
}

impl StdioTransport {
    /// Spawn the configured tool process and complete the handshake.
    ///
    /// The capability table is resolved before anything is spawned, so a
    /// catalog lacking a required tool fails without starting a process.
    pub async fn connect(config: Arc<RunConfig>) -> Result<Self, BoardError> {
        let table = Self::resolve_capabilities(&config)?;
        let stdio = &config.settings.stdio;

        let mut cmd = Command::new(&stdio.command);
        cmd.args(&stdio.args)
            .envs(&stdio.env)
            .env(&stdio.token_env, config.credentials.board_token.unsecure())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| BoardError::Spawn(format!("{}: {}", stdio.command, e)))?;
        info!(
            command = %stdio.command,
            pid = child.id().unwrap_or(0),
            "Spawned tool process"
        );

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BoardError::Spawn("child stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BoardError::Spawn("child stdout was not captured".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        Self::handshake(&config, table, stdout, stdin, Some(child)).await
    }

    /// Connect over already-open streams instead of a spawned process.
    pub async fn connect_with_io<R, W>(
        config: Arc<RunConfig>,
        reader: R,
        writer: W,
    ) -> Result<Self, BoardError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let table = Self::resolve_capabilities(&config)?;
        Self::handshake(&config, table, reader, writer, None).await
    }

    fn resolve_capabilities(config: &RunConfig) -> Result<CapabilityTable, BoardError> {
        let catalog = config
            .settings
            .stdio
            .catalog
            .clone()
            .unwrap_or_else(default_catalog);
        CapabilityTable::resolve(&catalog)
    }

    async fn handshake<R, W>(
        config: &RunConfig,
        table: CapabilityTable,
        reader: R,
        writer: W,
        child: Option<Child>,
    ) -> Result<Self, BoardError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let stdio = &config.settings.stdio;
        let rpc = RpcClient::start(reader, writer);

        let transport = Self {
            table,
            rpc,
            child: Mutex::new(child),
            call_timeout: Duration::from_secs(stdio.call_timeout_secs),
            call_delay: Duration::from_millis(stdio.call_delay_ms),
        };

        let connect_timeout = Duration::from_secs(stdio.connect_timeout_secs);
        if let Err(e) = transport.rpc.initialize(connect_timeout).await {
            warn!(error = %e, "Tool process handshake failed");
            transport.shutdown().await;
            return Err(e);
        }

        Ok(transport)
    }

    pub fn capabilities(&self) -> &CapabilityTable {
        &self.table
    }

    pub fn is_connected(&self) -> bool {
        self.rpc.is_connected()
    }

    /// Invoke one tool and return its raw result.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, BoardError> {
        debug!(tool, "Calling tool");
        let result = self
            .rpc
            .request(
                "tools/call",
                json!({ "name": tool, "arguments": arguments }),
                self.call_timeout,
            )
            .await?;

        match tool_error(&result) {
            Some(message) => Err(BoardError::Tool(format!("{}: {}", tool, message))),
            None => Ok(result),
        }
    }

    async fn create_item(
        &self,
        tool: &str,
        board_id: &str,
        item: &PlacedItem,
    ) -> Result<String, BoardError> {
        let mut arguments = json!({
            "boardId": board_id,
            "content": item.content,
            "x": item.x,
            "y": item.y,
            "width": item.width,
        });
        if let Some(parent) = &item.container_id {
            arguments["parentId"] = json!(parent);
        }

        let result = self.call_tool(tool, arguments).await?;
        Ok(decode_tool_result(&CreatedIdDecoder, &result).unwrap_or_else(|| {
            let id = local_id();
            debug!(id = %id, "Created item id not recoverable, using local id");
            id
        }))
    }

    async fn shutdown(&self) {
        self.rpc.close().await;
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                debug!(error = %e, "Tool process already exited");
            }
        }
    }
}

#[async_trait]
impl BoardTransport for StdioTransport {
    fn name(&self) -> &str {
        "stdio"
    }

    /// Without a listing tool every lookup misses.
    async fn find_container(
        &self,
        board_id: &str,
        title: &str,
    ) -> Result<Option<Container>, BoardError> {
        let Some(tool) = self.table.tool_for(Capability::ListContainers) else {
            return Ok(None);
        };
        let result = self.call_tool(tool, json!({ "boardId": board_id })).await?;
        Ok(decode_tool_result(&ContainerListDecoder, &result)
            .into_iter()
            .find(|c| c.has_title(title)))
    }

    async fn ensure_container(
        &self,
        board_id: &str,
        spec: ContainerSpec<'_>,
    ) -> Result<Container, BoardError> {
        if let Some(mut existing) = self.find_container(board_id, spec.title).await? {
            debug!(id = %existing.id, title = %existing.title, "Reusing existing frame");
            if existing.width == 0.0 || existing.height == 0.0 {
                existing.x = spec.x;
                existing.y = spec.y;
                existing.width = spec.width;
                existing.height = spec.height;
            }
            return Ok(existing);
        }

        let tool = self.table.require(Capability::CreateShape)?;
        info!(title = spec.title, tool, "Creating frame");
        let result = self
            .call_tool(
                tool,
                json!({
                    "boardId": board_id,
                    "shape": "rectangle",
                    "content": spec.title.trim(),
                    "x": spec.x,
                    "y": spec.y,
                    "width": spec.width,
                    "height": spec.height,
                    "style": {
                        "fillColor": "#ffffff",
                        "borderColor": "#1a1a1a",
                        "borderWidth": "2",
                    },
                }),
            )
            .await?;

        let id = decode_tool_result(&CreatedIdDecoder, &result).unwrap_or_else(|| {
            let id = local_id();
            warn!(id = %id, title = spec.title, "Frame id not recoverable, using local id");
            id
        });

        Ok(Container {
            id,
            title: spec.title.trim().to_string(),
            x: spec.x,
            y: spec.y,
            width: spec.width,
            height: spec.height,
        })
    }

    async fn list_items_in_container(
        &self,
        board_id: &str,
        container_id: &str,
    ) -> Result<Vec<ExistingItem>, BoardError> {
        let Some(tool) = self.table.tool_for(Capability::ItemsInContainer) else {
            debug!(container_id, "No item listing tool, treating container as empty");
            return Ok(Vec::new());
        };

        let result = self
            .call_tool(tool, json!({ "boardId": board_id, "frameId": container_id }))
            .await?;

        Ok(decode_tool_result(&ItemListDecoder, &result)
            .into_iter()
            .map(|item| match item.parent_id {
                Some(_) => item,
                None => item.with_parent(container_id),
            })
            .collect())
    }

    async fn batch_create(
        &self,
        board_id: &str,
        items: &[PlacedItem],
        chunk_size: usize,
    ) -> BatchResult {
        let mut result = BatchResult::default();
        let chunk_size = chunk_size.max(1);
        let total = items.len();
        let tool = self.table.require(Capability::CreateItem);

        for (index, item) in items.iter().enumerate() {
            if index > 0 && !self.call_delay.is_zero() {
                tokio::time::sleep(self.call_delay).await;
            }

            let outcome = match &tool {
                Ok(tool) => self.create_item(tool, board_id, item).await,
                Err(_) => Err(BoardError::MissingCapability(
                    Capability::CreateItem.label().to_string(),
                )),
            };
            match outcome {
                Ok(id) => result.record_created(id),
                Err(e) => {
                    warn!(index, error = %e, "Item creation failed");
                    result.record_failed(index, item.clone(), e);
                }
            }

            let done = index + 1;
            if done % chunk_size == 0 || done == total {
                info!(
                    done,
                    total,
                    ok = result.ok,
                    failed = result.failed.len(),
                    "Batch progress"
                );
            }
        }

        result
    }

    async fn disconnect(&self) -> Result<(), BoardError> {
        self.shutdown().await;
        info!("Tool process disconnected");
        Ok(())
    }
}

fn local_id() -> String {
    format!("local-{}", Uuid::new_v4())
}

async fn forward_stderr<R: AsyncRead + Unpin>(stderr: R) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(target: "boardsync::child", "{}", line),
            Ok(None) => break,
            Err(e) => {
                debug!(target: "boardsync::child", error = %e, "Stopped reading child stderr");
                break;
            }
        }
    }
}
