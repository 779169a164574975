//! Change events produced by the change capture source.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of write that produced a change event.
///
/// Deserialization also accepts the `INSERT` / `MODIFY` / `REMOVE` names used by common
/// change-data-capture feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    #[serde(alias = "INSERT", alias = "insert", alias = "CREATED")]
    Created,
    #[serde(alias = "MODIFY", alias = "modify", alias = "UPDATED")]
    Updated,
    #[serde(alias = "REMOVE", alias = "remove", alias = "REMOVED")]
    Removed,
}

/// Position of an event inside its source partition.
///
/// Offsets increase monotonically within a partition. Positions from different partitions are
/// not comparable in any meaningful way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequencePosition {
    pub partition: i32,
    pub offset: i64,
}

impl SequencePosition {
    pub fn new(partition: i32, offset: i64) -> Self {
        Self { partition, offset }
    }
}

/// A single create/update/remove on the guild entity.
///
/// `new_image` is the raw snapshot of the record after the write. It is kept undecoded here so
/// that a malformed image can be detected and dropped by the event filter instead of failing the
/// whole poll.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: EventKind,
    pub position: SequencePosition,
    /// Partition key of the written record (the guild id).
    pub key: String,
    pub new_image: Option<Value>,
}

impl ChangeEvent {
    /// Create a new change event.
    pub fn new(
        kind: EventKind,
        position: SequencePosition,
        key: impl Into<String>,
        new_image: Option<Value>,
    ) -> Self {
        Self {
            kind,
            position,
            key: key.into(),
            new_image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_accepts_stream_names() {
        let kinds: Vec<EventKind> =
            serde_json::from_str(r#"["INSERT", "MODIFY", "REMOVE", "created"]"#).unwrap();

        assert_eq!(
            kinds,
            vec![
                EventKind::Created,
                EventKind::Updated,
                EventKind::Removed,
                EventKind::Created
            ]
        );
    }

    #[test]
    fn test_positions_order_within_partition() {
        assert!(SequencePosition::new(0, 4) < SequencePosition::new(0, 5));
    }
}
