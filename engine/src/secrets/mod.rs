//! Credential resolution
//!
//! Credentials are looked up once at startup: an environment variable wins,
//! otherwise the OS keychain entry under the `boardsync` service is used.
//! Nothing here prompts; acquiring a token interactively is outside the tool.

use keyring::Entry;
use regex::Regex;
use sdk::errors::BoardError;
use std::fmt;
use std::sync::OnceLock;

/// Keychain service name
pub const SERVICE_NAME: &str = "boardsync";

/// Environment variable holding the board access token
pub const BOARD_TOKEN_ENV: &str = "BOARD_ACCESS_TOKEN";

/// Keychain key for the board access token
pub const BOARD_TOKEN_KEY: &str = "board_access_token";

/// Environment variable holding the extraction provider key
pub const EXTRACTION_KEY_ENV: &str = "OPENAI_API_KEY";

/// Keychain key for the extraction provider key
pub const EXTRACTION_KEY_KEY: &str = "openai_api_key";

/// A wrapper for sensitive string data that prevents accidental logging.
///
/// `Debug` and `Display` always print `[REDACTED]`. Use `unsecure()` to read
/// the value when building a request.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Access the raw underlying string
    pub fn unsecure(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Resolves credentials from the environment, then the OS keychain.
pub struct CredentialStore {
    service_name: String,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl CredentialStore {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Look up a credential, returning `None` when neither source has it.
    ///
    /// Empty values count as absent. Keychain failures other than a missing
    /// entry are logged and treated as absent.
    pub fn lookup(&self, env_var: &str, keychain_key: &str) -> Option<SecretString> {
        if let Ok(value) = std::env::var(env_var) {
            if !value.trim().is_empty() {
                tracing::debug!("Using credential from ${}", env_var);
                return Some(SecretString::new(value.trim()));
            }
        }

        let entry = match Entry::new(&self.service_name, keychain_key) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Keychain unavailable for '{}': {}", keychain_key, e);
                return None;
            }
        };

        match entry.get_password() {
            Ok(secret) if !secret.trim().is_empty() => {
                tracing::debug!("Using credential '{}' from keychain", keychain_key);
                Some(SecretString::new(secret.trim()))
            }
            Ok(_) | Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                tracing::warn!("Failed to read '{}' from keychain: {}", keychain_key, e);
                None
            }
        }
    }

    /// Like [`lookup`](Self::lookup) but a miss is a `MissingCredential` error.
    pub fn require(&self, env_var: &str, keychain_key: &str) -> Result<SecretString, BoardError> {
        self.lookup(env_var, keychain_key).ok_or_else(|| {
            BoardError::MissingCredential(format!(
                "set ${} or store '{}' in the '{}' keychain service",
                env_var, keychain_key, self.service_name
            ))
        })
    }
}

/// Patterns for token formats that may show up in echoed error bodies.
static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"sk-[a-zA-Z0-9\-_]{20,}").expect("Invalid OpenAI pattern"),
            Regex::new(r"Bearer\s+[^\s]{20,}").expect("Invalid Bearer pattern"),
            Regex::new(r"eyJ[a-zA-Z0-9\-_]{10,}\.[a-zA-Z0-9\-_]{10,}\.[a-zA-Z0-9\-_]*")
                .expect("Invalid JWT pattern"),
        ]
    })
}

/// Replace anything that looks like a credential with `[REDACTED]`.
pub fn scrub(text: &str) -> String {
    let mut result = text.to_string();
    for pattern in secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }
    result
}
