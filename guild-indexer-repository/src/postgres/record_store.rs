use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument};

use crate::errors::RecordStoreError;
use crate::interfaces::RecordStore;
use crate::schema::{EntityKind, EntitySchema, SchemaRegistry};
use crate::utils;

/// Record store backed by a PostgreSQL connection pool.
pub struct PostgresRecordStore {
    pool: PgPool,
    schema: SchemaRegistry,
}

impl PostgresRecordStore {
    /// Connect to `database_url` and build a store for the entities of `schema`.
    pub async fn new(database_url: &str, schema: SchemaRegistry) -> Result<Self, RecordStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| RecordStoreError::connection(e.to_string()))?;

        Ok(Self::with_pool(pool, schema))
    }

    /// Build a store on an existing pool.
    pub fn with_pool(pool: PgPool, schema: SchemaRegistry) -> Self {
        Self { pool, schema }
    }

    fn schema_of(&self, entity: EntityKind) -> Result<&EntitySchema, RecordStoreError> {
        self.schema.get(entity).ok_or_else(|| {
            RecordStoreError::invalid_record(format!("no schema registered for {:?}", entity))
        })
    }

    fn select_sql(table: &str) -> String {
        format!(r#"SELECT id, body FROM "{}" WHERE id = ANY($1)"#, table)
    }

    fn insert_prefix(table: &str) -> String {
        format!(r#"INSERT INTO "{}" (id, body) "#, table)
    }

    /// Pair every record with its key. A key written twice in one batch keeps the last record,
    /// since a single upsert statement cannot touch the same row twice.
    fn keyed_records(
        records: Vec<Value>,
        key_field: &str,
    ) -> Result<Vec<(String, Value)>, RecordStoreError> {
        let mut keyed: Vec<(String, Value)> = Vec::with_capacity(records.len());
        for record in records {
            let key = utils::record_key(&record, key_field)?;
            match keyed.iter_mut().find(|(k, _)| *k == key) {
                Some(existing) => existing.1 = record,
                None => keyed.push((key, record)),
            }
        }
        Ok(keyed)
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn batch_get(
        &self,
        entity: EntityKind,
        ids: &[String],
    ) -> Result<HashMap<String, Value>, RecordStoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let schema = self.schema_of(entity)?;

        let sql = Self::select_sql(&schema.table);
        let rows: Vec<(String, Value)> = sqlx::query_as(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        debug!(
            requested = ids.len(),
            found = rows.len(),
            table = %schema.table,
            "Batch get completed"
        );

        Ok(rows.into_iter().collect())
    }

    async fn put(&self, entity: EntityKind, record: Value) -> Result<(), RecordStoreError> {
        self.batch_put(entity, vec![record]).await
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn batch_put(
        &self,
        entity: EntityKind,
        records: Vec<Value>,
    ) -> Result<(), RecordStoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let schema = self.schema_of(entity)?;
        let keyed = Self::keyed_records(records, &schema.key_field)?;

        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new(Self::insert_prefix(&schema.table));
        query_builder.push_values(keyed, |mut b, (key, body)| {
            b.push_bind(key);
            b.push_bind(body);
        });
        query_builder.push(" ON CONFLICT (id) DO UPDATE SET body = EXCLUDED.body");

        query_builder.build().execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sql_quotes_table_names() {
        assert_eq!(
            PostgresRecordStore::select_sql("Players"),
            r#"SELECT id, body FROM "Players" WHERE id = ANY($1)"#
        );
        assert_eq!(
            PostgresRecordStore::insert_prefix("Guilds"),
            r#"INSERT INTO "Guilds" (id, body) "#
        );
    }

    #[test]
    fn test_keyed_records_keeps_last_write_per_key() {
        let keyed = PostgresRecordStore::keyed_records(
            vec![
                json!({ "playerId": "p1", "playerName": "Black Mage" }),
                json!({ "playerId": "p2", "playerName": "White Mage" }),
                json!({ "playerId": "p1", "playerName": "Red Mage" }),
            ],
            "playerId",
        )
        .unwrap();

        assert_eq!(keyed.len(), 2);
        assert_eq!(keyed[0].0, "p1");
        assert_eq!(keyed[0].1["playerName"], "Red Mage");
        assert_eq!(keyed[1].0, "p2");
    }

    #[test]
    fn test_keyed_records_rejects_missing_key() {
        let result = PostgresRecordStore::keyed_records(vec![json!({ "name": "x" })], "playerId");
        assert!(matches!(result, Err(RecordStoreError::InvalidRecord(_))));
    }
}
