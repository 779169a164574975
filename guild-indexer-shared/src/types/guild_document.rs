//! Guild document types for the search index.
//!
//! This module defines the document structure that is indexed in the search engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::guild::Guild;

/// Document representation of a guild in the search index.
///
/// Same shape as [`Guild`], except that `members` carries display names instead of player ids.
/// The names keep the positional order of the source ids and there is always exactly one entry
/// per source id. A member whose player record does not exist is `None` (serialized as `null`).
///
/// # Fields
///
/// - `guild_id`: Unique identifier, also used as the document id (upsert key)
/// - `guild_name`: Display name of the guild
/// - `guild_style`: Play style label
/// - `description`: Free text description (searchable)
/// - `members`: Resolved member display names (searchable)
/// - `indexed_at`: Timestamp when the document was built
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GuildDocument {
    pub guild_id: String,
    #[serde(default)]
    pub guild_name: String,
    #[serde(default)]
    pub guild_style: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub members: Vec<Option<String>>,
    pub indexed_at: DateTime<Utc>,
}

impl GuildDocument {
    /// Build a document from a guild and its already resolved member names.
    ///
    /// `members` must line up positionally with `guild.members`; the enrichment stage is the
    /// only producer and guarantees it.
    pub fn from_guild(guild: &Guild, members: Vec<Option<String>>) -> Self {
        Self {
            guild_id: guild.guild_id.clone(),
            guild_name: guild.guild_name.clone(),
            guild_style: guild.guild_style.clone(),
            description: guild.description.clone(),
            members,
            indexed_at: Utc::now(),
        }
    }

    /// The document ID used in the search index.
    pub fn document_id(&self) -> &str {
        &self.guild_id
    }

    /// Number of members whose player could not be found.
    pub fn unresolved_member_count(&self) -> usize {
        self.members.iter().filter(|m| m.is_none()).count()
    }
}
