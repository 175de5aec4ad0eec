//! Run fingerprinting
//!
//! A run identifier is the first ten hex characters of the SHA-256 digest of
//! the source bytes. Every item written by a run carries the identifier in a
//! trailing marker, and that marker is the only thing re-runs look for.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex characters kept from the digest
pub const RUN_ID_LEN: usize = 10;

/// Deterministic identity of a source document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Fingerprint raw source content. No salt, no clock.
    pub fn compute(content: &[u8]) -> Self {
        let digest = hex::encode(Sha256::digest(content));
        Self(digest[..RUN_ID_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The exact, case-sensitive marker embedded in decorated content.
    pub fn marker(&self) -> String {
        format!("[runId:{}]", self.0)
    }

    /// Append the marker to item text.
    pub fn decorate(&self, text: &str) -> String {
        decorate(text, self)
    }

    /// True when `content` carries this run's marker.
    pub fn is_marked(&self, content: &str) -> bool {
        content.contains(&self.marker())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint raw source content.
pub fn compute_id(content: &[u8]) -> RunId {
    RunId::compute(content)
}

/// `text` followed by a blank line and the run marker.
pub fn decorate(text: &str, id: &RunId) -> String {
    format!("{}\n\n{}", text, id.marker())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_id_is_deterministic() {
        let a = compute_id(b"Quarterly review notes");
        let b = compute_id(b"Quarterly review notes");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), RUN_ID_LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_compute_id_known_value() {
        // sha256("abc") = ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad
        assert_eq!(compute_id(b"abc").as_str(), "ba7816bf8f");
    }

    #[test]
    fn test_distinct_inputs_differ() {
        assert_ne!(compute_id(b"notes v1"), compute_id(b"notes v2"));
        assert_ne!(compute_id(b"abc"), compute_id(b"abc\n"));
    }

    #[test]
    fn test_decorate_format() {
        let id = compute_id(b"abc");
        assert_eq!(
            decorate("Churn is rising", &id),
            "Churn is rising\n\n[runId:ba7816bf8f]"
        );
        assert_eq!(id.decorate("x"), decorate("x", &id));
    }

    #[test]
    fn test_marker_is_case_sensitive() {
        let id = compute_id(b"abc");
        assert!(id.is_marked("text\n\n[runId:ba7816bf8f]"));
        assert!(!id.is_marked("text\n\n[runid:ba7816bf8f]"));
        assert!(!id.is_marked("text\n\n[runId:BA7816BF8F]"));
    }

    #[test]
    fn test_other_run_marker_not_recognized() {
        let current = compute_id(b"source one");
        let previous = compute_id(b"source two");
        let old_item = previous.decorate("Same text");
        assert!(!current.is_marked(&old_item));
    }
}
