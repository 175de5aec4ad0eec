//! Board transports
//!
//! Both implementations satisfy [`sdk::transport::BoardTransport`]; the run
//! configuration picks one.

pub mod rest;
pub mod stdio;

use sdk::errors::BoardError;
use sdk::transport::BoardTransport;
use std::sync::Arc;

use crate::config::{RunConfig, TransportKind};

pub use rest::RestTransport;
pub use stdio::StdioTransport;

/// Open the transport selected by `config`.
///
/// The stdio transport spawns its tool process here; call
/// [`BoardTransport::disconnect`] when the run is over.
pub async fn connect(config: Arc<RunConfig>) -> Result<Arc<dyn BoardTransport>, BoardError> {
    match config.transport {
        TransportKind::Rest => Ok(Arc::new(RestTransport::new(config)?)),
        TransportKind::Stdio => Ok(Arc::new(StdioTransport::connect(config).await?)),
    }
}
