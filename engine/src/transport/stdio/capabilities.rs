//! Tool capability table
//!
//! The tool process is not asked for its catalog. The transport carries a
//! static list of the tools it expects and maps each board operation onto one
//! of them by trying ordered, case-insensitive name patterns. The table is
//! resolved once at connect time; a missing required capability stops the
//! connection with a named error.

use regex::RegexBuilder;
use sdk::errors::BoardError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A tool the child process is expected to expose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Built-in catalog of the board tool server.
pub fn default_catalog() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new("list_boards", "List all available boards"),
        ToolDescriptor::new("get_frames", "Get all frames on a board"),
        ToolDescriptor::new(
            "get_items_in_frame",
            "Get all items contained within a frame",
        ),
        ToolDescriptor::new("create_shape", "Create a shape on a board"),
        ToolDescriptor::new("create_sticky_note", "Create a sticky note on a board"),
        ToolDescriptor::new("bulk_create_items", "Create several items in one call"),
    ]
}

/// Board operations the stdio transport maps onto tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ListContainers,
    CreateShape,
    ItemsInContainer,
    CreateItem,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::ListContainers,
        Capability::CreateShape,
        Capability::ItemsInContainer,
        Capability::CreateItem,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Capability::ListContainers => "list_containers",
            Capability::CreateShape => "create_shape",
            Capability::ItemsInContainer => "items_in_container",
            Capability::CreateItem => "create_item",
        }
    }

    /// Required capabilities fail the connection when unresolved.
    pub fn is_required(&self) -> bool {
        matches!(self, Capability::CreateShape | Capability::CreateItem)
    }

    /// Name patterns, most specific first.
    fn patterns(&self) -> &'static [&'static str] {
        match self {
            Capability::ListContainers => &[r"^(list|get)_frames$", r"^(list|get)_(all_)?frames?$"],
            Capability::CreateShape => &[r"^create_shape$", r"^create_.*shape$"],
            Capability::ItemsInContainer => &[
                r"^get_items_in_frame$",
                r"items_(in|of)_frame",
                r"^(list|get)_frame_(items|children)$",
            ],
            Capability::CreateItem => &[
                r"^create_sticky_note$",
                r"^create_sticky",
                r"^create_(note|item)$",
            ],
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// First tool whose name matches the earliest matching pattern.
pub fn find_tool<'a>(catalog: &'a [ToolDescriptor], patterns: &[&str]) -> Option<&'a ToolDescriptor> {
    patterns.iter().find_map(|pattern| {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .ok()?;
        catalog.iter().find(|tool| regex.is_match(&tool.name))
    })
}

/// Capability → tool name, resolved once.
#[derive(Debug, Clone, Default)]
pub struct CapabilityTable {
    resolved: HashMap<Capability, String>,
}

impl CapabilityTable {
    /// Resolve every capability, leaving misses unresolved.
    pub fn resolve_all(catalog: &[ToolDescriptor]) -> Self {
        let resolved = Capability::ALL
            .iter()
            .filter_map(|cap| {
                find_tool(catalog, cap.patterns()).map(|tool| (*cap, tool.name.clone()))
            })
            .collect();
        Self { resolved }
    }

    /// Resolve every capability and fail on the first missing required one.
    pub fn resolve(catalog: &[ToolDescriptor]) -> Result<Self, BoardError> {
        let table = Self::resolve_all(catalog);
        for cap in Capability::ALL {
            if cap.is_required() && table.tool_for(cap).is_none() {
                return Err(BoardError::MissingCapability(cap.label().to_string()));
            }
            if table.tool_for(cap).is_none() {
                tracing::warn!(capability = %cap, "Optional capability not offered by tool catalog");
            }
        }
        Ok(table)
    }

    pub fn tool_for(&self, capability: Capability) -> Option<&str> {
        self.resolved.get(&capability).map(String::as_str)
    }

    pub fn require(&self, capability: Capability) -> Result<&str, BoardError> {
        self.tool_for(capability)
            .ok_or_else(|| BoardError::MissingCapability(capability.label().to_string()))
    }

    /// Every capability with its resolved tool, in a stable order.
    pub fn entries(&self) -> Vec<(Capability, Option<&str>)> {
        Capability::ALL
            .iter()
            .map(|cap| (*cap, self.tool_for(*cap)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(names: &[&str]) -> Vec<ToolDescriptor> {
        names.iter().map(|n| ToolDescriptor::new(*n, "")).collect()
    }

    #[test]
    fn test_default_catalog_resolves_everything() {
        let table = CapabilityTable::resolve(&default_catalog()).unwrap();
        assert_eq!(table.tool_for(Capability::ListContainers), Some("get_frames"));
        assert_eq!(table.tool_for(Capability::CreateShape), Some("create_shape"));
        assert_eq!(
            table.tool_for(Capability::ItemsInContainer),
            Some("get_items_in_frame")
        );
        assert_eq!(
            table.tool_for(Capability::CreateItem),
            Some("create_sticky_note")
        );
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let table = CapabilityTable::resolve(&catalog(&["Create_Shape", "CREATE_STICKY_NOTE"])).unwrap();
        assert_eq!(table.tool_for(Capability::CreateShape), Some("Create_Shape"));
        assert_eq!(
            table.tool_for(Capability::CreateItem),
            Some("CREATE_STICKY_NOTE")
        );
    }

    #[test]
    fn test_earlier_pattern_wins_over_catalog_order() {
        let tools = catalog(&["create_sticky_widget", "create_sticky_note"]);
        let found = find_tool(&tools, Capability::CreateItem.patterns()).unwrap();
        assert_eq!(found.name, "create_sticky_note");
    }

    #[test]
    fn test_items_tool_not_mistaken_for_frame_listing() {
        let table = CapabilityTable::resolve_all(&catalog(&["get_items_in_frame"]));
        assert_eq!(table.tool_for(Capability::ListContainers), None);
        assert_eq!(
            table.tool_for(Capability::ItemsInContainer),
            Some("get_items_in_frame")
        );
    }

    #[test]
    fn test_missing_required_capability_is_named() {
        let err = CapabilityTable::resolve(&catalog(&["create_shape", "get_frames"])).unwrap_err();
        match err {
            BoardError::MissingCapability(name) => assert_eq!(name, "create_item"),
            other => panic!("Expected MissingCapability, got {:?}", other),
        }
    }

    #[test]
    fn test_optional_capabilities_may_be_missing() {
        let table =
            CapabilityTable::resolve(&catalog(&["create_shape", "create_sticky_note"])).unwrap();
        assert!(table.tool_for(Capability::ListContainers).is_none());
        assert!(table.tool_for(Capability::ItemsInContainer).is_none());
        assert!(table.require(Capability::ItemsInContainer).is_err());
    }
}
