//! REST board transport
//!
//! Talks to the board service's v2 HTTP API with a bearer token. Every call is
//! wrapped by the retry policy. The service has no server-side parent filter
//! and no bulk write endpoint, so item listing filters by parent on this side
//! and batch writes are one request per item.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use sdk::errors::BoardError;
use sdk::transport::{BoardTransport, ContainerSpec};
use sdk::types::{BatchResult, Container, ExistingItem, PlacedItem};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::retry::{with_retry, RetryPolicy};
use crate::secrets::scrub;

/// Longest error body kept in an error message
const MAX_ERROR_BODY: usize = 300;

pub struct RestTransport {
    config: Arc<RunConfig>,
    base_url: Url,
    policy: RetryPolicy,
    client: Client,
}

impl RestTransport {
    pub fn new(config: Arc<RunConfig>) -> Result<Self, BoardError> {
        let base_url = Url::parse(&config.settings.board.rest_base_url).map_err(|e| {
            BoardError::Config(format!(
                "Invalid board.rest_base_url '{}': {}",
                config.settings.board.rest_base_url, e
            ))
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BoardError::Network(format!("Failed to create HTTP client: {}", e)))?;
        let policy = config.settings.retry.policy();

        Ok(Self {
            config,
            base_url,
            policy,
            client,
        })
    }

    /// `{base}/boards/{board_id}/{segments..}` with every segment percent-encoded.
    fn endpoint(&self, board_id: &str, segments: &[&str]) -> Result<Url, BoardError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BoardError::Config("board.rest_base_url cannot be a base".to_string()))?
            .pop_if_empty()
            .push("boards")
            .push(board_id)
            .extend(segments);
        Ok(url)
    }

    fn page_limit(&self) -> String {
        self.config.settings.board.page_limit.to_string()
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BoardError> {
        let response = request
            .bearer_auth(self.config.credentials.board_token.unsecure())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BoardError::Network("request timed out".to_string())
                } else {
                    BoardError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = scrub(&body).chars().take(MAX_ERROR_BODY).collect();
            return Err(BoardError::from_status(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| BoardError::Decode(format!("Unexpected response body: {}", e)))
    }

    async fn list_frames(&self, board_id: &str) -> Result<Vec<Container>, BoardError> {
        let url = self.endpoint(board_id, &["items"])?;
        let limit = self.page_limit();
        let page: Page<WireFrame> = self
            .send(
                self.client
                    .get(url)
                    .query(&[("type", "frame"), ("limit", limit.as_str())]),
            )
            .await?;
        Ok(page.data.into_iter().map(WireFrame::into_container).collect())
    }

    async fn create_frame(
        &self,
        board_id: &str,
        spec: &ContainerSpec<'_>,
    ) -> Result<Container, BoardError> {
        let url = self.endpoint(board_id, &["frames"])?;
        let body = json!({
            "data": { "title": spec.title.trim(), "format": "custom", "type": "freeform" },
            "position": { "x": spec.x, "y": spec.y, "origin": "center" },
            "geometry": { "width": spec.width, "height": spec.height },
        });
        let frame: WireFrame = self.send(self.client.post(url).json(&body)).await?;
        let mut container = frame.into_container();
        // The create response may omit fields that we just sent.
        if container.title.is_empty() {
            container.title = spec.title.trim().to_string();
        }
        if container.width == 0.0 || container.height == 0.0 {
            container.x = spec.x;
            container.y = spec.y;
            container.width = spec.width;
            container.height = spec.height;
        }
        Ok(container)
    }

    async fn list_sticky_notes(&self, board_id: &str) -> Result<Vec<WireItem>, BoardError> {
        let url = self.endpoint(board_id, &["items"])?;
        let limit = self.page_limit();
        let page: Page<WireItem> = self
            .send(
                self.client
                    .get(url)
                    .query(&[("type", "sticky_note"), ("limit", limit.as_str())]),
            )
            .await?;
        Ok(page.data)
    }

    async fn create_sticky_note(
        &self,
        board_id: &str,
        item: &PlacedItem,
    ) -> Result<String, BoardError> {
        let url = self.endpoint(board_id, &["sticky_notes"])?;
        let mut body = json!({
            "data": { "content": item.content, "shape": "square" },
            "position": { "x": item.x, "y": item.y, "origin": "center" },
            "geometry": { "width": item.width },
        });
        if let Some(parent) = &item.container_id {
            body["parent"] = json!({ "id": parent });
        }
        let created: WireCreated = self.send(self.client.post(url).json(&body)).await?;
        Ok(created.id)
    }
}

#[async_trait]
impl BoardTransport for RestTransport {
    fn name(&self) -> &str {
        "rest"
    }

    async fn find_container(
        &self,
        board_id: &str,
        title: &str,
    ) -> Result<Option<Container>, BoardError> {
        let frames = with_retry(&self.policy, "list frames", || self.list_frames(board_id)).await?;
        Ok(frames.into_iter().find(|f| f.has_title(title)))
    }

    async fn ensure_container(
        &self,
        board_id: &str,
        spec: ContainerSpec<'_>,
    ) -> Result<Container, BoardError> {
        if let Some(existing) = self.find_container(board_id, spec.title).await? {
            debug!(id = %existing.id, title = %existing.title, "Reusing existing frame");
            return Ok(existing);
        }

        info!(title = spec.title, "Creating frame");
        with_retry(&self.policy, "create frame", || {
            self.create_frame(board_id, &spec)
        })
        .await
    }

    async fn list_items_in_container(
        &self,
        board_id: &str,
        container_id: &str,
    ) -> Result<Vec<ExistingItem>, BoardError> {
        let notes = with_retry(&self.policy, "list sticky notes", || {
            self.list_sticky_notes(board_id)
        })
        .await?;

        Ok(notes
            .into_iter()
            .filter(|n| n.parent.as_ref().map(|p| p.id.as_str()) == Some(container_id))
            .map(WireItem::into_existing)
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

        for (index, item) in items.iter().enumerate() {
            match with_retry(&self.policy, "create sticky note", || {
                self.create_sticky_note(board_id, item)
            })
            .await
            {
                Ok(id) => result.record_created(id),
                Err(e) => {
                    warn!(index, error = %e, "Sticky note creation failed");
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
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct WirePosition {
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
}

#[derive(Debug, Default, Deserialize)]
struct WireGeometry {
    #[serde(default)]
    width: f64,
    #[serde(default)]
    height: f64,
}

#[derive(Debug, Default, Deserialize)]
struct WireFrameData {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireFrame {
    id: String,
    #[serde(default)]
    data: WireFrameData,
    #[serde(default)]
    position: WirePosition,
    #[serde(default)]
    geometry: WireGeometry,
}

impl WireFrame {
    fn into_container(self) -> Container {
        Container {
            id: self.id,
            title: self.data.title.unwrap_or_default(),
            x: self.position.x,
            y: self.position.y,
            width: self.geometry.width,
            height: self.geometry.height,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WireItemData {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireParent {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WireItem {
    id: String,
    #[serde(default)]
    data: WireItemData,
    #[serde(default)]
    parent: Option<WireParent>,
}

impl WireItem {
    fn into_existing(self) -> ExistingItem {
        ExistingItem {
            id: self.id,
            content: self.data.content.unwrap_or_default(),
            parent_id: self.parent.map(|p| p.id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireCreated {
    id: String,
}
