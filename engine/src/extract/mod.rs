//! Extraction collaborator
//!
//! Turns raw source text into two ordered lists of short items: insights and
//! risks. Providers implement [`Extractor`]; every provider output passes
//! through [`validate_extraction`] before the board is touched.

use async_trait::async_trait;
use sdk::errors::BoardError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod openai;

pub use openai::OpenAIExtractor;

/// Items extracted from one source document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub insights: Vec<String>,
    pub risks: Vec<String>,
}

impl Extraction {
    pub fn total(&self) -> usize {
        self.insights.len() + self.risks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Source text → insights and risks
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Extract items from `source`.
    ///
    /// Malformed provider output is a [`BoardError::Validation`].
    async fn extract(&self, source: &str) -> Result<Extraction, BoardError>;
}

/// Check a provider document against the extraction schema.
///
/// Both `insights` and `risks` must be arrays of strings, each non-empty after
/// trimming and at most `cap` long. Items are returned trimmed. Any violation
/// rejects the whole document.
pub fn validate_extraction(value: &Value, cap: usize) -> Result<Extraction, BoardError> {
    if !value.is_object() {
        return Err(BoardError::Validation(
            "extraction output must be a JSON object".to_string(),
        ));
    }

    Ok(Extraction {
        insights: string_list(value, "insights", cap)?,
        risks: string_list(value, "risks", cap)?,
    })
}

fn string_list(value: &Value, key: &str, cap: usize) -> Result<Vec<String>, BoardError> {
    let list = value
        .get(key)
        .ok_or_else(|| BoardError::Validation(format!("missing '{}'", key)))?
        .as_array()
        .ok_or_else(|| BoardError::Validation(format!("'{}' must be an array", key)))?;

    if list.len() > cap {
        return Err(BoardError::Validation(format!(
            "'{}' has {} items, at most {} allowed",
            key,
            list.len(),
            cap
        )));
    }

    list.iter()
        .enumerate()
        .map(|(i, item)| {
            let text = item.as_str().ok_or_else(|| {
                BoardError::Validation(format!("'{}[{}]' must be a string", key, i))
            })?;
            let text = text.trim();
            if text.is_empty() {
                return Err(BoardError::Validation(format!(
                    "'{}[{}]' is empty",
                    key, i
                )));
            }
            Ok(text.to_string())
        })
        .collect()
}
