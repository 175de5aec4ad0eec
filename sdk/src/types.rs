//! Board domain types shared by the engine and its transports

use serde::{Deserialize, Serialize};

/// A named rectangular region on the board (a frame).
///
/// Coordinates are the container's center, matching the board service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub title: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Container {
    /// Top-left corner of the container.
    pub fn top_left(&self) -> (f64, f64) {
        (self.x - self.width / 2.0, self.y - self.height / 2.0)
    }

    /// Exact title match after trimming both sides.
    pub fn has_title(&self, title: &str) -> bool {
        self.title.trim() == title.trim()
    }
}

/// An item already present on the board.
///
/// Only the content is consulted when deciding what to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingItem {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl ExistingItem {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            parent_id: None,
        }
    }

    /// Attach the parent container id
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// A decorated item with its computed board position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedItem {
    pub content: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
}

/// One item a batch write could not create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedItem {
    /// Position of the item in the batch input
    pub index: usize,
    pub item: PlacedItem,
    pub error: String,
}

/// Outcome of a batch write.
///
/// Invariant: `ok == created.len()` and `ok + failed.len()` equals the input length.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub ok: usize,
    pub created: Vec<String>,
    pub failed: Vec<FailedItem>,
}

impl BatchResult {
    /// Record a successful write
    pub fn record_created(&mut self, id: impl Into<String>) {
        self.ok += 1;
        self.created.push(id.into());
    }

    /// Record a failed write without aborting the batch
    pub fn record_failed(&mut self, index: usize, item: PlacedItem, error: impl ToString) {
        self.failed.push(FailedItem {
            index,
            item,
            error: error.to_string(),
        });
    }

    /// Number of items attempted
    pub fn attempted(&self) -> usize {
        self.ok + self.failed.len()
    }
}
