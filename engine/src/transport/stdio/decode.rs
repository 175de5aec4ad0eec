//! Tool result decoding
//!
//! A `tools/call` result is either structured JSON or a list of content
//! blocks. Text blocks are joined and parsed as JSON when possible; otherwise
//! the text goes through a per-shape heuristic. Heuristics never fail: text
//! they do not recognize decodes to the shape's empty value.

use regex::Regex;
use sdk::types::{Container, ExistingItem};
use serde_json::Value;
use std::sync::OnceLock;

/// Decoder for one expected result shape.
pub trait ResultDecoder {
    type Output;

    /// Decode a structured JSON document.
    fn from_json(&self, value: &Value) -> Self::Output;

    /// Decode human-readable confirmation text.
    fn from_text(&self, text: &str) -> Self::Output;
}

/// Concatenated text of the result's content blocks, if it has any.
pub fn content_text(result: &Value) -> Option<String> {
    let blocks = result.get("content")?.as_array()?;
    Some(
        blocks
            .iter()
            .filter(|block| {
                block
                    .get("type")
                    .and_then(Value::as_str)
                    .map_or(true, |kind| kind == "text")
            })
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<String>(),
    )
}

/// Error text of a result flagged with `isError`.
pub fn tool_error(result: &Value) -> Option<String> {
    if result.get("isError").and_then(Value::as_bool) != Some(true) {
        return None;
    }
    let text = content_text(result).unwrap_or_default();
    if text.trim().is_empty() {
        Some("tool reported an error".to_string())
    } else {
        Some(text.trim().to_string())
    }
}

/// Run `decoder` over a `tools/call` result.
pub fn decode_tool_result<D: ResultDecoder>(decoder: &D, result: &Value) -> D::Output {
    if let Some(structured) = result.get("structuredContent") {
        return decoder.from_json(structured);
    }

    match content_text(result) {
        Some(text) => match serde_json::from_str::<Value>(text.trim()) {
            Ok(value) if value.is_object() || value.is_array() => decoder.from_json(&value),
            _ => decoder.from_text(&text),
        },
        None => decoder.from_json(result),
    }
}

/// Text patterns used by the decoders
struct TextPatterns {
    id: Regex,
    title: Regex,
    marked_block: Regex,
}

static TEXT_PATTERNS: OnceLock<TextPatterns> = OnceLock::new();

fn text_patterns() -> &'static TextPatterns {
    TEXT_PATTERNS.get_or_init(|| TextPatterns {
        id: Regex::new(r#"(?i)\bid\b\s*(?:[:=]|is)?\s*["'`]?([A-Za-z0-9][A-Za-z0-9_=\-]*)"#)
            .expect("Invalid id pattern"),
        title: Regex::new(r#"(?i)(?:"([^"]+)"|\btitle\s*[:=]\s*([^,()\n]+))"#)
            .expect("Invalid title pattern"),
        marked_block: Regex::new(r"(?s)(.*?\[runId:[0-9a-f]+\])")
            .expect("Invalid marked block pattern"),
    })
}

/// First identifier-looking token that follows an "id" label.
///
/// Tokens without a digit are ignored ("id is missing").
fn id_from_text(text: &str) -> Option<String> {
    text_patterns()
        .id
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .find(|token| token.chars().any(|c| c.is_ascii_digit()))
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `id` at the top level or under a common wrapper key.
fn json_id(value: &Value) -> Option<String> {
    if let Some(id) = value.get("id").and_then(scalar_string) {
        return Some(id);
    }
    ["data", "item", "result"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.get("id")).and_then(scalar_string))
}

/// First string found at any of the given paths.
fn string_at(value: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        path.iter()
            .try_fold(value, |v, key| v.get(*key))
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}

fn number_at(value: &Value, paths: &[&[&str]]) -> f64 {
    paths
        .iter()
        .find_map(|path| {
            path.iter()
                .try_fold(value, |v, key| v.get(*key))
                .and_then(Value::as_f64)
        })
        .unwrap_or(0.0)
}

/// The list inside a listing document.
fn list_entries(value: &Value) -> &[Value] {
    if let Some(list) = value.as_array() {
        return list;
    }
    ["data", "frames", "items", "results"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Identifier of a newly created object.
#[derive(Debug, Default, Clone, Copy)]
pub struct CreatedIdDecoder;

impl ResultDecoder for CreatedIdDecoder {
    type Output = Option<String>;

    fn from_json(&self, value: &Value) -> Option<String> {
        json_id(value)
    }

    fn from_text(&self, text: &str) -> Option<String> {
        id_from_text(text)
    }
}

/// Frames listed on a board.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContainerListDecoder;

impl ResultDecoder for ContainerListDecoder {
    type Output = Vec<Container>;

    fn from_json(&self, value: &Value) -> Vec<Container> {
        list_entries(value)
            .iter()
            .filter_map(|entry| {
                Some(Container {
                    id: json_id(entry)?,
                    title: string_at(
                        entry,
                        &[&["title"], &["data", "title"], &["content"], &["data", "content"]],
                    )
                    .unwrap_or_default(),
                    x: number_at(entry, &[&["position", "x"], &["x"]]),
                    y: number_at(entry, &[&["position", "y"], &["y"]]),
                    width: number_at(entry, &[&["geometry", "width"], &["width"]]),
                    height: number_at(entry, &[&["geometry", "height"], &["height"]]),
                })
            })
            .collect()
    }

    /// One frame per line that names both a title and an id.
    fn from_text(&self, text: &str) -> Vec<Container> {
        text.lines()
            .filter_map(|line| {
                let id = id_from_text(line)?;
                let caps = text_patterns().title.captures(line)?;
                let title = caps.get(1).or_else(|| caps.get(2))?.as_str().trim();
                Some(Container {
                    id,
                    title: title.to_string(),
                    x: 0.0,
                    y: 0.0,
                    width: 0.0,
                    height: 0.0,
                })
            })
            .collect()
    }
}

/// Items inside a frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct ItemListDecoder;

impl ResultDecoder for ItemListDecoder {
    type Output = Vec<ExistingItem>;

    fn from_json(&self, value: &Value) -> Vec<ExistingItem> {
        list_entries(value)
            .iter()
            .filter_map(|entry| {
                Some(ExistingItem {
                    id: json_id(entry)?,
                    content: string_at(
                        entry,
                        &[&["content"], &["data", "content"], &["text"], &["data", "text"]],
                    )
                    .unwrap_or_default(),
                    parent_id: string_at(entry, &[&["parent", "id"], &["parentId"]]),
                })
            })
            .collect()
    }

    /// Recovers marked items from a plain-text listing by splitting after each
    /// run marker. Unmarked text yields nothing.
    fn from_text(&self, text: &str) -> Vec<ExistingItem> {
        text_patterns()
            .marked_block
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .enumerate()
            .map(|(i, m)| {
                let content = m
                    .as_str()
                    .trim_start_matches(|c: char| c.is_whitespace() || c == '-' || c == '*' || c == ',');
                ExistingItem::new(format!("text-{}", i), content.trim_end())
            })
            .collect()
    }
}
