//! Board transport contract
//!
//! The reconciliation engine drives a board exclusively through this trait,
//! so the REST client and the stdio tool-process client are interchangeable.

use async_trait::async_trait;

use crate::errors::BoardError;
use crate::types::{BatchResult, Container, ExistingItem, PlacedItem};

/// Geometry requested for a container that may need creating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerSpec<'a> {
    pub title: &'a str,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Capability contract every board transport implements.
///
/// # Error propagation
///
/// `find_container`, `ensure_container` and `list_items_in_container` return
/// their failures and the caller treats them as fatal. `batch_create` never
/// fails as a whole: every per-item failure is captured in the returned
/// [`BatchResult`].
#[async_trait]
pub trait BoardTransport: Send + Sync {
    /// Short transport name for logs and reports ("rest", "stdio")
    fn name(&self) -> &str;

    /// The container whose trimmed title equals `title`, if one exists.
    ///
    /// Never writes to the board.
    async fn find_container(
        &self,
        board_id: &str,
        title: &str,
    ) -> Result<Option<Container>, BoardError>;

    /// Return the container whose trimmed title equals `spec.title`,
    /// creating it with the given geometry when none exists.
    ///
    /// Safe to call on every run.
    async fn ensure_container(
        &self,
        board_id: &str,
        spec: ContainerSpec<'_>,
    ) -> Result<Container, BoardError>;

    /// Items inside a container. Order is irrelevant.
    async fn list_items_in_container(
        &self,
        board_id: &str,
        container_id: &str,
    ) -> Result<Vec<ExistingItem>, BoardError>;

    /// Create every item independently. One failure never aborts siblings.
    ///
    /// `chunk_size` only sets how often progress is reported.
    async fn batch_create(
        &self,
        board_id: &str,
        items: &[PlacedItem],
        chunk_size: usize,
    ) -> BatchResult;

    /// Release any connection held by the transport.
    async fn disconnect(&self) -> Result<(), BoardError> {
        Ok(())
    }
}
