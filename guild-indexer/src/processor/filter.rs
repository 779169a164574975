//! Event filter.

use guild_indexer_shared::{ChangeEvent, EventKind, Guild, SequencePosition};
use tracing::{debug, instrument, warn};

/// A created guild that made it through the filter, with the position it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedGuild {
    pub guild: Guild,
    pub position: SequencePosition,
}

/// Stateless predicate over change events.
///
/// The kinds to keep are declared up front; the pipeline uses the default, which keeps
/// `created` only.
#[derive(Debug, Clone)]
pub struct EventFilter {
    kinds: Vec<EventKind>,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::new(vec![EventKind::Created])
    }
}

impl EventFilter {
    pub fn new(kinds: Vec<EventKind>) -> Self {
        Self { kinds }
    }

    /// Whether the event is of a kept kind.
    pub fn keep(&self, event: &ChangeEvent) -> bool {
        self.kinds.contains(&event.kind)
    }

    /// Keep the matching events and decode their guild image.
    ///
    /// Events whose image is missing or does not decode as a guild are dropped with a warning.
    #[instrument(skip(self, events), fields(event_count = events.len()))]
    pub fn apply(&self, events: Vec<ChangeEvent>) -> Vec<CreatedGuild> {
        let mut kept = Vec::with_capacity(events.len());

        for event in events {
            if !self.keep(&event) {
                debug!(
                    kind = ?event.kind,
                    key = %event.key,
                    "Skipping change event"
                );
                continue;
            }

            let Some(image) = event.new_image else {
                warn!(
                    key = %event.key,
                    partition = event.position.partition,
                    offset = event.position.offset,
                    "Dropping created event without an image"
                );
                continue;
            };

            match serde_json::from_value::<Guild>(image) {
                Ok(guild) if !guild.guild_id.is_empty() => kept.push(CreatedGuild {
                    guild,
                    position: event.position,
                }),
                Ok(_) => warn!(
                    key = %event.key,
                    offset = event.position.offset,
                    "Dropping created event with an empty guildId"
                ),
                Err(e) => warn!(
                    key = %event.key,
                    partition = event.position.partition,
                    offset = event.position.offset,
                    error = %e,
                    "Dropping created event with a malformed guild image"
                ),
            }
        }

        kept
    }
}
