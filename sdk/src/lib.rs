//! Boardsync SDK
//!
//! Shared library providing the board transport contract, domain types and
//! errors. Used by the engine and by every transport implementation.

/// Error types and handling
pub mod errors;

/// Board domain types
pub mod types;

/// Board transport trait
pub mod transport;

// Re-export commonly used types
pub use errors::{BoardError, BoardErrorExt};
pub use transport::{BoardTransport, ContainerSpec};
pub use types::{BatchResult, Container, ExistingItem, FailedItem, PlacedItem};
