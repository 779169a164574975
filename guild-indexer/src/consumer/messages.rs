//! Message types for the consumer.
//!
//! Defines the wire envelope read from the change topic and the messages that flow from the
//! source task to the orchestrator.

use guild_indexer_repository::Cursor;
use guild_indexer_shared::{ChangeEvent, EventKind, SequencePosition};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::errors::IngestError;

/// One record of the guild change topic, as JSON.
///
/// ```json
/// { "eventName": "INSERT", "key": "guild1", "newImage": { "guildId": "guild1", "members": ["p1"] } }
/// ```
///
/// `key` is optional: the Kafka message key is used instead, then the `guildId` of the image.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEnvelope {
    pub event_name: EventKind,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default, alias = "NewImage")]
    pub new_image: Option<Value>,
}

impl ChangeEnvelope {
    /// Decode an envelope from a message payload.
    pub fn decode(payload: &[u8]) -> Result<Self, IngestError> {
        serde_json::from_slice(payload)
            .map_err(|e| IngestError::parse(format!("Failed to decode change envelope: {}", e)))
    }

    /// Turn the envelope into a change event at `position`.
    pub fn into_event(self, position: SequencePosition, message_key: Option<&str>) -> ChangeEvent {
        let key = self
            .key
            .or_else(|| message_key.map(str::to_string))
            .or_else(|| {
                self.new_image
                    .as_ref()
                    .and_then(|image| image.get("guildId"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_default();

        ChangeEvent::new(self.event_name, position, key, self.new_image)
    }

    /// Decode a raw record into a change event.
    ///
    /// Returns `None` (after logging a warning) for an empty or undecodable payload. The caller
    /// still moves its cursor past `position` so the record is not read again.
    pub fn decode_record(
        payload: Option<&[u8]>,
        message_key: Option<&[u8]>,
        position: SequencePosition,
    ) -> Option<ChangeEvent> {
        let Some(payload) = payload else {
            warn!(
                partition = position.partition,
                offset = position.offset,
                "Dropping change record with empty payload"
            );
            return None;
        };

        match Self::decode(payload) {
            Ok(envelope) => {
                let key = message_key.and_then(|k| std::str::from_utf8(k).ok());
                Some(envelope.into_event(position, key))
            }
            Err(e) => {
                warn!(
                    partition = position.partition,
                    offset = position.offset,
                    error = %e,
                    "Dropping malformed change record"
                );
                None
            }
        }
    }
}

/// Messages that flow from the source task to the orchestrator.
#[derive(Debug)]
pub enum StreamMessage {
    /// A polled batch and the cursor positioned after it.
    Events {
        events: Vec<ChangeEvent>,
        cursor: Cursor,
    },
    /// The source task stopped after a shutdown signal.
    End,
    /// The source failed permanently or ran out of retries.
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_insert_record() {
        let payload = json!({
            "eventName": "INSERT",
            "newImage": { "guildId": "guild1", "members": ["p1", "p2"] }
        })
        .to_string();

        let event = ChangeEnvelope::decode_record(
            Some(payload.as_bytes()),
            None,
            SequencePosition::new(2, 41),
        )
        .unwrap();

        assert_eq!(event.kind, EventKind::Created);
        assert_eq!(event.key, "guild1");
        assert_eq!(event.position, SequencePosition::new(2, 41));
        assert_eq!(event.new_image.unwrap()["members"], json!(["p1", "p2"]));
    }

    #[test]
    fn test_message_key_is_preferred_over_image() {
        let payload = json!({ "eventName": "REMOVE" }).to_string();

        let event = ChangeEnvelope::decode_record(
            Some(payload.as_bytes()),
            Some(b"guild7"),
            SequencePosition::new(0, 0),
        )
        .unwrap();

        assert_eq!(event.kind, EventKind::Removed);
        assert_eq!(event.key, "guild7");
        assert!(event.new_image.is_none());
    }

    #[test]
    fn test_malformed_records_are_dropped() {
        let position = SequencePosition::new(0, 3);

        assert!(ChangeEnvelope::decode_record(None, None, position).is_none());
        assert!(ChangeEnvelope::decode_record(Some(b"not json"), None, position).is_none());

        let unknown_kind = json!({ "eventName": "TRUNCATE" }).to_string();
        assert!(
            ChangeEnvelope::decode_record(Some(unknown_kind.as_bytes()), None, position).is_none()
        );
    }
}
