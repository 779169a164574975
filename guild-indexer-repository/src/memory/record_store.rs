//! In-memory record store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use guild_indexer_shared::EventKind;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::errors::RecordStoreError;
use crate::interfaces::RecordStore;
use crate::memory::MemoryChangeLog;
use crate::schema::{EntityKind, SchemaRegistry};
use crate::utils;

/// Record store holding one map per entity kind.
///
/// When built with a [`MemoryChangeLog`], every guild write also appends a change event to the
/// log: `Created` for a key that did not exist yet, `Updated` otherwise. This stands in for the
/// change capture a hosted store would provide.
#[derive(Default)]
pub struct MemoryRecordStore {
    schema: SchemaRegistry,
    tables: RwLock<HashMap<EntityKind, HashMap<String, Value>>>,
    change_log: Option<Arc<MemoryChangeLog>>,
    failing_lookups: RwLock<u32>,
    lookup_calls: AtomicUsize,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store that captures guild writes into `change_log`.
    pub fn with_change_log(change_log: Arc<MemoryChangeLog>) -> Self {
        Self {
            change_log: Some(change_log),
            ..Self::default()
        }
    }

    /// Make the next `count` batch reads fail with a connection error.
    pub async fn fail_next_lookups(&self, count: u32) {
        *self.failing_lookups.write().await = count;
    }

    /// Number of `batch_get` calls received, failed ones included.
    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::Relaxed)
    }

    async fn write(&self, entity: EntityKind, record: Value) -> Result<(), RecordStoreError> {
        let schema = self.schema.get(entity).ok_or_else(|| {
            RecordStoreError::invalid_record(format!("no schema registered for {:?}", entity))
        })?;
        let key = utils::record_key(&record, &schema.key_field)?;

        // The guard is held across the append so capture order matches write order.
        let mut tables = self.tables.write().await;
        let existed = tables
            .entry(entity)
            .or_default()
            .insert(key.clone(), record.clone())
            .is_some();

        if let (EntityKind::Guild, Some(log)) = (entity, &self.change_log) {
            let kind = if existed {
                EventKind::Updated
            } else {
                EventKind::Created
            };
            log.append(kind, key, Some(record)).await;
        }
        drop(tables);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn batch_get(
        &self,
        entity: EntityKind,
        ids: &[String],
    ) -> Result<HashMap<String, Value>, RecordStoreError> {
        self.lookup_calls.fetch_add(1, Ordering::Relaxed);
        {
            let mut failing = self.failing_lookups.write().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(RecordStoreError::connection("injected lookup failure"));
            }
        }

        let tables = self.tables.read().await;
        let Some(table) = tables.get(&entity) else {
            return Ok(HashMap::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| table.get(id).map(|record| (id.clone(), record.clone())))
            .collect())
    }

    async fn put(&self, entity: EntityKind, record: Value) -> Result<(), RecordStoreError> {
        self.write(entity, record).await
    }

    async fn batch_put(
        &self,
        entity: EntityKind,
        records: Vec<Value>,
    ) -> Result<(), RecordStoreError> {
        for record in records {
            self.write(entity, record).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::ChangeSource;
    use crate::types::Cursor;
    use serde_json::json;

    #[tokio::test]
    async fn test_batch_get_returns_partial_map() {
        let store = MemoryRecordStore::new();
        store
            .batch_put(
                EntityKind::Player,
                vec![
                    json!({ "playerId": "p1", "playerName": "Black Mage" }),
                    json!({ "playerId": "p2", "playerName": "White Mage" }),
                ],
            )
            .await
            .unwrap();

        let found = store
            .batch_get(EntityKind::Player, &["p1".to_string(), "p9".to_string()])
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found["p1"]["playerName"], "Black Mage");
    }

    #[tokio::test]
    async fn test_put_rejects_record_without_key() {
        let store = MemoryRecordStore::new();
        let result = store.put(EntityKind::Guild, json!({ "members": [] })).await;
        assert!(matches!(result, Err(RecordStoreError::InvalidRecord(_))));
    }

    #[tokio::test]
    async fn test_guild_writes_are_captured() {
        let log = Arc::new(MemoryChangeLog::default());
        let store = MemoryRecordStore::with_change_log(log.clone());

        store
            .put(EntityKind::Guild, json!({ "guildId": "guild1", "members": [] }))
            .await
            .unwrap();
        store
            .put(EntityKind::Guild, json!({ "guildId": "guild1", "members": ["p1"] }))
            .await
            .unwrap();
        store
            .put(EntityKind::Player, json!({ "playerId": "p1", "playerName": "Black Mage" }))
            .await
            .unwrap();

        let batch = log.poll(&Cursor::default()).await.unwrap();
        let kinds: Vec<EventKind> = batch.events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Created, EventKind::Updated]);
        assert_eq!(batch.events[1].new_image.as_ref().unwrap()["members"], json!(["p1"]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_capture_created_first() {
        for _ in 0..50 {
            let log = Arc::new(MemoryChangeLog::new(1, 10, std::time::Duration::from_millis(10)));
            let store = Arc::new(MemoryRecordStore::with_change_log(log.clone()));

            let puts: Vec<_> = (0..2)
                .map(|i| {
                    let store = store.clone();
                    tokio::spawn(async move {
                        store
                            .put(
                                EntityKind::Guild,
                                json!({ "guildId": "guild1", "members": [format!("p{}", i)] }),
                            )
                            .await
                    })
                })
                .collect();
            for put in puts {
                put.await.unwrap().unwrap();
            }

            let batch = log.poll(&Cursor::default()).await.unwrap();
            let kinds: Vec<EventKind> = batch.events.iter().map(|e| e.kind).collect();
            assert_eq!(kinds, vec![EventKind::Created, EventKind::Updated]);

            // The last captured image is the one left in the table.
            let stored = store
                .batch_get(EntityKind::Guild, &["guild1".to_string()])
                .await
                .unwrap();
            assert_eq!(batch.events[1].new_image.as_ref(), stored.get("guild1"));
        }
    }

    #[tokio::test]
    async fn test_injected_lookup_failures() {
        let store = MemoryRecordStore::new();
        store.fail_next_lookups(1).await;

        let ids = vec!["p1".to_string()];
        assert!(store.batch_get(EntityKind::Player, &ids).await.unwrap_err().is_transient());
        assert!(store.batch_get(EntityKind::Player, &ids).await.is_ok());
        assert_eq!(store.lookup_calls(), 2);
    }
}
