//! Error types and handling
//!
//! This module provides the error type shared by the boardsync engine and
//! every board transport. All errors implement the `BoardErrorExt` trait which
//! provides user-friendly hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Error messages never carry credentials. Transports only put response
//! bodies and protocol text into variants, never request headers.

use thiserror::Error;

/// Trait for boardsync error extensions
///
/// Provides additional context for errors: a user-friendly hint and whether
/// the failure can be retried or worked around.
pub trait BoardErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is a static string, safe to print next to the error itself.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors may succeed when attempted again. Non-recoverable
    /// errors need a configuration or credential change first.
    fn is_recoverable(&self) -> bool;
}

/// Main boardsync error type
///
/// # Error Categories
///
/// - **Configuration**: invalid config file, missing run arguments or credentials
/// - **HTTP**: board service answered with an error status
/// - **Validation**: the extraction collaborator produced malformed output
/// - **Protocol**: the stdio tool process misbehaved, timed out or went away
///
/// # Examples
///
/// ```
/// use sdk::errors::{BoardError, BoardErrorExt};
///
/// let error = BoardError::RateLimited("slow down".to_string());
/// assert_eq!(error.http_status(), Some(429));
/// assert!(error.is_recoverable());
///
/// let fatal = BoardError::Auth { status: 401, message: "bad token".to_string() };
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum BoardError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    // HTTP errors
    #[error("Authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    // Extraction errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    // Tool protocol errors
    #[error("No response to '{method}' within {timeout_secs}s")]
    ProtocolTimeout { method: String, timeout_secs: u64 },

    #[error("Not connected")]
    NotConnected,

    #[error("Tool process not initialized")]
    NotReady,

    #[error("Missing capability: {0}")]
    MissingCapability(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Failed to spawn tool process: {0}")]
    Spawn(String),

    #[error("Decode error: {0}")]
    Decode(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BoardError {
    /// Build the error for a non-success HTTP status.
    ///
    /// 401/403 become `Auth`, 429 becomes `RateLimited`, everything else `Http`.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Auth { status, message },
            429 => Self::RateLimited(message),
            _ => Self::Http { status, message },
        }
    }

    /// HTTP-style status carried by this error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } | Self::Http { status, .. } => Some(*status),
            Self::RateLimited(_) => Some(429),
            _ => None,
        }
    }

    /// True for 401/403, which the retry policy never retries.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.http_status(), Some(401) | Some(403))
    }
}

impl BoardErrorExt for BoardError {
    fn user_hint(&self) -> &str {
        match self {
            // Configuration errors
            Self::Config(_) => "Check your config.toml file for errors",
            Self::MissingCredential(_) => {
                "Export the credential as an environment variable or store it in the keychain"
            }

            // HTTP errors
            Self::Auth { .. } => "The board service rejected the credential. Check its scopes",
            Self::RateLimited(_) => "The board service is throttling requests. Try again later",
            Self::Http { .. } => "The board service returned an error",
            Self::Network(_) => "Network operation failed. Check your connection",

            // Extraction errors
            Self::Validation(_) => "Extraction output was malformed. Nothing was written",
            Self::Extraction(_) => "The extraction provider failed. Check the model and API key",

            // Tool protocol errors
            Self::ProtocolTimeout { .. } => "The tool process did not answer in time",
            Self::NotConnected => "The tool process is not running",
            Self::NotReady => "The tool process has not finished initializing",
            Self::MissingCapability(_) => "The tool process does not offer a required tool",
            Self::Protocol(_) => "The tool process sent an unexpected response",
            Self::Tool(_) => "The tool reported a failure",
            Self::Spawn(_) => "Check the stdio command and arguments in config.toml",
            Self::Decode(_) => "A response could not be decoded",

            // Generic IO error
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_)
            | Self::MissingCredential(_)
            | Self::Auth { .. }
            | Self::Validation(_)
            | Self::MissingCapability(_)
            | Self::Spawn(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        assert!(matches!(
            BoardError::from_status(401, "x"),
            BoardError::Auth { status: 401, .. }
        ));
        assert!(matches!(
            BoardError::from_status(403, "x"),
            BoardError::Auth { status: 403, .. }
        ));
        assert!(matches!(
            BoardError::from_status(429, "x"),
            BoardError::RateLimited(_)
        ));
        assert!(matches!(
            BoardError::from_status(502, "x"),
            BoardError::Http { status: 502, .. }
        ));
    }

    #[test]
    fn test_http_status() {
        assert_eq!(BoardError::from_status(403, "no").http_status(), Some(403));
        assert_eq!(BoardError::RateLimited("x".into()).http_status(), Some(429));
        assert_eq!(BoardError::NotConnected.http_status(), None);
    }

    #[test]
    fn test_auth_failure_detection() {
        assert!(BoardError::from_status(401, "").is_auth_failure());
        assert!(BoardError::from_status(403, "").is_auth_failure());
        assert!(!BoardError::from_status(429, "").is_auth_failure());
        assert!(!BoardError::Network("reset".into()).is_auth_failure());
    }

    #[test]
    fn test_recoverability() {
        assert!(!BoardError::Validation("bad".into()).is_recoverable());
        assert!(!BoardError::MissingCapability("create_item".into()).is_recoverable());
        assert!(BoardError::ProtocolTimeout {
            method: "tools/call".into(),
            timeout_secs: 10
        }
        .is_recoverable());
    }
}
