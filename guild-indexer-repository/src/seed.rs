//! Fixture seeding through the record store.

use guild_indexer_shared::fixtures::{sample_guilds, sample_players};
use serde_json::Value;
use tracing::info;

use crate::errors::RecordStoreError;
use crate::interfaces::RecordStore;
use crate::schema::EntityKind;

/// Write the sample players, then the sample guilds.
///
/// Players go first so that the guild change events find every member when they are enriched.
/// Seeding twice overwrites the same records; with change capture enabled the second run emits
/// `updated` events, which the pipeline ignores.
pub async fn seed_fixtures(store: &dyn RecordStore) -> Result<(), RecordStoreError> {
    let players = sample_players()
        .iter()
        .map(to_record)
        .collect::<Result<Vec<_>, _>>()?;
    let guilds = sample_guilds()
        .iter()
        .map(to_record)
        .collect::<Result<Vec<_>, _>>()?;

    let (player_count, guild_count) = (players.len(), guilds.len());
    store.batch_put(EntityKind::Player, players).await?;
    store.batch_put(EntityKind::Guild, guilds).await?;

    info!(players = player_count, guilds = guild_count, "Seeded fixtures");
    Ok(())
}

fn to_record<T: serde::Serialize>(item: &T) -> Result<Value, RecordStoreError> {
    serde_json::to_value(item).map_err(|e| RecordStoreError::invalid_record(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRecordStore;

    #[tokio::test]
    async fn test_seed_writes_players_and_guilds() {
        let store = MemoryRecordStore::new();
        seed_fixtures(&store).await.unwrap();

        let players = store
            .batch_get(
                EntityKind::Player,
                &["p1", "p2", "p3", "p4"].map(String::from),
            )
            .await
            .unwrap();
        assert_eq!(players.len(), 4);
        assert_eq!(players["p1"]["playerName"], "Black Mage");

        let guilds = store
            .batch_get(EntityKind::Guild, &["guild1", "guild2"].map(String::from))
            .await
            .unwrap();
        assert_eq!(guilds.len(), 2);
        assert_eq!(guilds["guild1"]["members"], serde_json::json!(["p1", "p2"]));
    }
}
