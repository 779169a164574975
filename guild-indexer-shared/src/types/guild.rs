//! Record shapes stored in the record store.
//!
//! Field names are serialized in camelCase so that records written by other producers of the
//! store (and the change images derived from them) decode without translation.

use serde::{Deserialize, Serialize};

/// A group of players.
///
/// `members` holds player ids. The ids are plain references: nothing guarantees that a
/// matching [`Player`] exists, and the indexer resolves dangling ids to an unknown name rather
/// than rejecting the guild.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Guild {
    pub guild_id: String,
    #[serde(default)]
    pub guild_name: String,
    #[serde(default)]
    pub guild_style: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub members: Vec<String>,
}

impl Guild {
    /// Create a guild with the given id and members and empty text fields.
    pub fn new(guild_id: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            guild_name: String::new(),
            guild_style: String::new(),
            description: String::new(),
            members,
        }
    }

    /// Set the description, returning the updated guild.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the display name and style, returning the updated guild.
    pub fn with_name_and_style(
        mut self,
        guild_name: impl Into<String>,
        guild_style: impl Into<String>,
    ) -> Self {
        self.guild_name = guild_name.into();
        self.guild_style = guild_style.into();
        self
    }
}

/// A guild member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub player_id: String,
    pub player_name: String,
}

impl Player {
    pub fn new(player_id: impl Into<String>, player_name: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            player_name: player_name.into(),
        }
    }
}
