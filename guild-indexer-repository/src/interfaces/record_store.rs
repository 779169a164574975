//! Record store trait definition.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::RecordStoreError;
use crate::schema::EntityKind;

/// Point reads and writes against the record store.
///
/// Records are JSON objects; the key field of each entity kind comes from the
/// [`SchemaRegistry`](crate::schema::SchemaRegistry) the implementation was built with.
/// Multiple puts are not transactional.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the records with the given ids.
    ///
    /// Ids that do not exist are simply missing from the returned map; that is not an error.
    /// An `Err` means the call itself failed.
    async fn batch_get(
        &self,
        entity: EntityKind,
        ids: &[String],
    ) -> Result<HashMap<String, Value>, RecordStoreError>;

    /// Insert or replace a single record.
    async fn put(&self, entity: EntityKind, record: Value) -> Result<(), RecordStoreError>;

    /// Insert or replace several records.
    async fn batch_put(&self, entity: EntityKind, records: Vec<Value>)
        -> Result<(), RecordStoreError>;
}
