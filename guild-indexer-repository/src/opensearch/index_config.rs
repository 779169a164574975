//! OpenSearch index configuration and mappings.
//!
//! This module defines the index settings and mappings for the guild search index.

use serde_json::{json, Value};

/// Configuration for the search index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Name of the index every operation targets.
    pub name: String,
}

impl IndexConfig {
    /// Create a new index configuration.
    ///
    /// # Arguments
    ///
    /// * `name` - The index name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Get the index settings and mappings for the guild search index.
///
/// The configuration includes:
/// - **text**: `description` and `members` for match queries
/// - **keyword**: `guildId` for exact lookups, plus `raw` sub-fields on name and style
/// - **date**: `indexedAt`
///
/// # Sharding Configuration
///
/// - 1 primary shard
/// - 1 replica for redundancy
pub fn get_index_settings() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1
        },
        "mappings": {
            "properties": {
                "guildId": {
                    "type": "keyword"
                },
                "guildName": {
                    "type": "text",
                    "fields": {
                        "raw": {
                            "type": "keyword"
                        }
                    }
                },
                "guildStyle": {
                    "type": "text",
                    "fields": {
                        "raw": {
                            "type": "keyword"
                        }
                    }
                },
                "description": {
                    "type": "text"
                },
                "members": {
                    "type": "text"
                },
                "indexedAt": {
                    "type": "date"
                }
            }
        }
    })
}
