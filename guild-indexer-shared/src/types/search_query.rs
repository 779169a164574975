//! Search query types for the guild index.

use serde::{Deserialize, Serialize};

/// The single field a guild search matches against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SearchField {
    /// Free text description of the guild.
    Description,
    /// Resolved member display names.
    Members,
}

impl SearchField {
    /// Name of the field in the indexed document.
    pub fn field_name(&self) -> &'static str {
        match self {
            SearchField::Description => "description",
            SearchField::Members => "members",
        }
    }

    /// Map a route segment (`description` or `player`) to a search field.
    pub fn from_route_segment(segment: &str) -> Option<Self> {
        match segment {
            "description" => Some(SearchField::Description),
            "player" | "members" => Some(SearchField::Members),
            _ => None,
        }
    }
}
