//! Dead-letter records for guilds that could not be delivered to the search index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::change_event::SequencePosition;
use crate::types::guild::Guild;

/// Category of the last error seen before a record was dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// The bulk player lookup kept failing during enrichment.
    EnrichmentLookup,
    /// The search index kept failing with errors classified as retryable.
    SinkTransient,
    /// The search index rejected the document with a non-retryable error.
    SinkRejected,
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureClass::EnrichmentLookup => "enrichment_lookup",
            FailureClass::SinkTransient => "sink_transient",
            FailureClass::SinkRejected => "sink_rejected",
        };
        f.write_str(name)
    }
}

/// A permanently failed guild, kept for inspection and replay.
///
/// `guild` is always the original record as captured from the change feed, never the enriched
/// document, so a replay goes through enrichment again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    pub guild: Guild,
    pub attempts: u32,
    pub error_class: FailureClass,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<SequencePosition>,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn new(
        guild: Guild,
        attempts: u32,
        error_class: FailureClass,
        error_message: impl Into<String>,
        position: Option<SequencePosition>,
    ) -> Self {
        Self {
            guild,
            attempts,
            error_class,
            error_message: error_message.into(),
            position,
            failed_at: Utc::now(),
        }
    }

    /// Key of the record in the dead-letter store: `{guild_id}#{failed_at}`.
    pub fn dead_letter_key(&self) -> String {
        format!("{}#{}", self.guild.guild_id, self.failed_at.to_rfc3339())
    }
}
