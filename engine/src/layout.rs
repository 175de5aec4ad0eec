//! Grid layout for new items
//!
//! Pure placement: items fill a container row by row starting at its top-left
//! corner plus padding. Identical inputs always produce identical positions.

use sdk::errors::BoardError;
use sdk::types::{Container, PlacedItem};
use serde::{Deserialize, Serialize};

/// Grid settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_columns")]
    pub columns: usize,

    #[serde(default = "default_gap")]
    pub gap: f64,

    #[serde(default = "default_padding")]
    pub padding: f64,

    #[serde(default = "default_item_size")]
    pub item_width: f64,

    #[serde(default = "default_item_size")]
    pub item_height: f64,
}

fn default_columns() -> usize {
    4
}

fn default_gap() -> f64 {
    40.0
}

fn default_padding() -> f64 {
    80.0
}

fn default_item_size() -> f64 {
    200.0
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            columns: default_columns(),
            gap: default_gap(),
            padding: default_padding(),
            item_width: default_item_size(),
            item_height: default_item_size(),
        }
    }
}

impl LayoutConfig {
    pub fn validate(&self) -> Result<(), BoardError> {
        if self.columns == 0 {
            return Err(BoardError::Config(
                "layout.columns must be at least 1".to_string(),
            ));
        }
        if self.item_width <= 0.0 || self.item_height <= 0.0 {
            return Err(BoardError::Config(
                "layout item sizes must be positive".to_string(),
            ));
        }
        if self.gap < 0.0 || self.padding < 0.0 {
            return Err(BoardError::Config(
                "layout gap and padding must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Offset of grid cell `index` from the anchor.
    pub fn cell_offset(&self, index: usize) -> (f64, f64) {
        let columns = self.columns.max(1);
        let column = index % columns;
        let row = index / columns;
        (
            column as f64 * (self.item_width + self.gap),
            row as f64 * (self.item_height + self.gap),
        )
    }
}

/// Place `texts` inside `container`, in order.
pub fn layout(container: &Container, texts: &[String], config: &LayoutConfig) -> Vec<PlacedItem> {
    let (left, top) = container.top_left();
    let anchor_x = left + config.padding;
    let anchor_y = top + config.padding;

    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let (dx, dy) = config.cell_offset(i);
            PlacedItem {
                content: text.clone(),
                x: anchor_x + dx,
                y: anchor_y + dy,
                width: config.item_width,
                remote_id: None,
                container_id: Some(container.id.clone()),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Container {
        Container {
            id: "frame-1".to_string(),
            title: "Insights".to_string(),
            x: 1000.0,
            y: 500.0,
            width: 2000.0,
            height: 1000.0,
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("item {}", i)).collect()
    }

    #[test]
    fn test_first_item_at_anchor() {
        let placed = layout(&frame(), &texts(1), &LayoutConfig::default());
        // top-left is (0, 0), padding 80
        assert_eq!(placed[0].x, 80.0);
        assert_eq!(placed[0].y, 80.0);
        assert_eq!(placed[0].width, 200.0);
        assert_eq!(placed[0].container_id.as_deref(), Some("frame-1"));
        assert!(placed[0].remote_id.is_none());
    }

    #[test]
    fn test_seven_items_three_columns() {
        let config = LayoutConfig {
            columns: 3,
            ..LayoutConfig::default()
        };
        let placed = layout(&frame(), &texts(7), &config);
        assert_eq!(placed.len(), 7);

        // index 6 -> column 0, row 2
        assert_eq!(placed[6].x, placed[0].x);
        assert_eq!(placed[6].y, placed[0].y + 2.0 * (200.0 + 40.0));

        // index 4 -> column 1, row 1
        assert_eq!(placed[4].x, placed[0].x + 240.0);
        assert_eq!(placed[4].y, placed[0].y + 240.0);
    }

    #[test]
    fn test_layout_is_repeatable() {
        let config = LayoutConfig::default();
        let first = layout(&frame(), &texts(9), &config);
        let second = layout(&frame(), &texts(9), &config);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_input() {
        assert!(layout(&frame(), &[], &LayoutConfig::default()).is_empty());
    }

    #[test]
    fn test_zero_columns_rejected() {
        let config = LayoutConfig {
            columns: 0,
            ..LayoutConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
