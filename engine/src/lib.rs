//! Boardsync Engine Library
//!
//! This library provides the core functionality of boardsync: run
//! fingerprinting, layout, retry, the board transports and the reconciliation
//! pipeline. It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Credential lookup module
pub mod secrets;

/// Telemetry and Observability
pub mod telemetry;

/// Run identifier and item decoration
pub mod fingerprint;

/// Retry with exponential backoff
pub mod retry;

/// Grid placement of new items
pub mod layout;

/// Extraction collaborator
pub mod extract;

/// REST and stdio board transports
pub mod transport;

/// Reconciliation pipeline
pub mod reconcile;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
