//! Enrichment stage: resolves member ids into player names.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use guild_indexer_repository::{EntityKind, RecordStore, RecordStoreError};
use guild_indexer_shared::GuildDocument;
use serde_json::Value;
use thiserror::Error;
use tokio_retry::RetryIf;
use tracing::{debug, instrument, warn};

use crate::processor::CreatedGuild;
use crate::retry::RetryPolicy;

/// Errors from the enrichment stage.
#[derive(Error, Debug)]
pub enum EnrichmentError {
    /// The bulk player lookup kept failing; the batch goes to the dead-letter path unresolved.
    #[error("Player lookup failed after {attempts} attempts: {source}")]
    LookupFailed {
        attempts: u32,
        #[source]
        source: RecordStoreError,
    },
}

impl EnrichmentError {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::LookupFailed { attempts, .. } => *attempts,
        }
    }
}

/// Turns created guilds into search documents with one bulk player lookup per batch.
pub struct GuildEnricher {
    store: Arc<dyn RecordStore>,
    retry: RetryPolicy,
}

impl GuildEnricher {
    pub fn new(store: Arc<dyn RecordStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Enrich a batch of created guilds.
    ///
    /// Every document has exactly one member entry per member id of its guild, in the same
    /// order. Ids that the store does not know resolve to `None`. A batch without any member id
    /// performs no lookup.
    #[instrument(skip(self, guilds), fields(guild_count = guilds.len()))]
    pub async fn enrich(
        &self,
        guilds: &[CreatedGuild],
    ) -> Result<Vec<GuildDocument>, EnrichmentError> {
        let ids: Vec<String> = guilds
            .iter()
            .flat_map(|g| g.guild.members.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let names = if ids.is_empty() {
            HashMap::new()
        } else {
            self.lookup_names(&ids).await?
        };

        Ok(guilds
            .iter()
            .map(|g| {
                let members = resolve_members(&g.guild.guild_id, &g.guild.members, &names);
                GuildDocument::from_guild(&g.guild, members)
            })
            .collect())
    }

    async fn lookup_names(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, String>, EnrichmentError> {
        let attempts = AtomicU32::new(0);

        let records = RetryIf::spawn(
            self.retry.delays(),
            || {
                attempts.fetch_add(1, Ordering::Relaxed);
                self.store.batch_get(EntityKind::Player, ids)
            },
            |e: &RecordStoreError| {
                warn!(
                    error = %e,
                    attempt = attempts.load(Ordering::Relaxed),
                    "Player lookup failed"
                );
                e.is_transient()
            },
        )
        .await
        .map_err(|source| EnrichmentError::LookupFailed {
            attempts: attempts.load(Ordering::Relaxed),
            source,
        })?;

        debug!(requested = ids.len(), found = records.len(), "Resolved players");

        Ok(records
            .into_iter()
            .filter_map(|(id, record)| {
                let name = record.get("playerName").and_then(Value::as_str)?.to_string();
                Some((id, name))
            })
            .collect())
    }
}

/// Map member ids to names positionally. Unknown ids become `None`.
pub fn resolve_members(
    guild_id: &str,
    members: &[String],
    names: &HashMap<String, String>,
) -> Vec<Option<String>> {
    members
        .iter()
        .map(|id| {
            let name = names.get(id).cloned();
            if name.is_none() {
                debug!(guild_id = %guild_id, player_id = %id, "Member has no player record");
            }
            name
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use guild_indexer_repository::memory::MemoryRecordStore;
    use guild_indexer_shared::{Guild, SequencePosition};
    use serde_json::json;

    async fn store_with_players() -> Arc<MemoryRecordStore> {
        let store = Arc::new(MemoryRecordStore::new());
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
        store
    }

    fn created(id: &str, members: &[&str]) -> CreatedGuild {
        CreatedGuild {
            guild: Guild::new(id, members.iter().map(|m| m.to_string()).collect())
                .with_description("compete with other guilds!"),
            position: SequencePosition::new(0, 0),
        }
    }

    #[tokio::test]
    async fn test_members_resolve_to_names() {
        let enricher = GuildEnricher::new(store_with_players().await, RetryPolicy::immediate(3));

        let docs = enricher.enrich(&[created("guild1", &["p1", "p2"])]).await.unwrap();

        assert_eq!(
            docs[0].members,
            vec![Some("Black Mage".to_string()), Some("White Mage".to_string())]
        );
        assert_eq!(docs[0].description, "compete with other guilds!");
    }

    #[tokio::test]
    async fn test_dangling_member_resolves_to_sentinel() {
        let enricher = GuildEnricher::new(store_with_players().await, RetryPolicy::immediate(3));

        let docs = enricher.enrich(&[created("guild1", &["p1", "p9"])]).await.unwrap();

        assert_eq!(docs[0].members, vec![Some("Black Mage".to_string()), None]);
    }

    #[tokio::test]
    async fn test_one_lookup_per_batch_and_cardinality_kept() {
        let store = store_with_players().await;
        let enricher = GuildEnricher::new(store.clone(), RetryPolicy::immediate(3));
        let batch = vec![
            created("guild1", &["p1", "p2", "p1"]),
            created("guild2", &["p2", "p9"]),
            created("guild3", &[]),
        ];

        let docs = enricher.enrich(&batch).await.unwrap();

        assert_eq!(store.lookup_calls(), 1);
        for (doc, source) in docs.iter().zip(&batch) {
            assert_eq!(doc.members.len(), source.guild.members.len());
        }
        assert_eq!(docs[0].members[2], Some("Black Mage".to_string()));
        assert!(docs[2].members.is_empty());
    }

    #[tokio::test]
    async fn test_empty_id_set_skips_lookup() {
        let store = store_with_players().await;
        let enricher = GuildEnricher::new(store.clone(), RetryPolicy::immediate(3));

        let docs = enricher.enrich(&[created("guild1", &[])]).await.unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(store.lookup_calls(), 0);
    }

    #[tokio::test]
    async fn test_transient_lookup_failure_is_retried() {
        let store = store_with_players().await;
        store.fail_next_lookups(2).await;
        let enricher = GuildEnricher::new(store.clone(), RetryPolicy::immediate(3));

        let docs = enricher.enrich(&[created("guild1", &["p1"])]).await.unwrap();

        assert_eq!(docs[0].members, vec![Some("Black Mage".to_string())]);
        assert_eq!(store.lookup_calls(), 3);
    }

    #[tokio::test]
    async fn test_lookup_exhaustion_fails_the_batch() {
        let store = store_with_players().await;
        store.fail_next_lookups(10).await;
        let enricher = GuildEnricher::new(store.clone(), RetryPolicy::immediate(3));

        let err = enricher
            .enrich(&[created("guild1", &["p1"])])
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), 3);
        assert_eq!(store.lookup_calls(), 3);
    }

    #[test]
    fn test_resolve_members_is_positional() {
        let names = HashMap::from([("p2".to_string(), "White Mage".to_string())]);
        let members = vec!["p9".to_string(), "p2".to_string()];

        assert_eq!(
            resolve_members("guild1", &members, &names),
            vec![None, Some("White Mage".to_string())]
        );
    }
}
