//! Entity schema registry.
//!
//! Maps each entity kind to the field holding its primary key and the table it lives in. The
//! registry is built once at startup and handed to the record store implementations.

use std::collections::HashMap;

/// The entities the record store knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Guild,
    Player,
}

/// Storage metadata for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    /// Table (or collection) name.
    pub table: String,
    /// Name of the primary key field inside a record.
    pub key_field: String,
}

impl EntitySchema {
    pub fn new(table: impl Into<String>, key_field: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key_field: key_field.into(),
        }
    }
}

/// Static mapping from entity kind to its [`EntitySchema`].
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<EntityKind, EntitySchema>,
}

impl SchemaRegistry {
    /// The registry used in production: `Guilds` keyed by `guildId`, `Players` keyed by
    /// `playerId`.
    pub fn standard() -> Self {
        Self::new()
            .register(EntityKind::Guild, EntitySchema::new("Guilds", "guildId"))
            .register(EntityKind::Player, EntitySchema::new("Players", "playerId"))
    }

    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    /// Register (or replace) the schema of an entity kind.
    pub fn register(mut self, kind: EntityKind, schema: EntitySchema) -> Self {
        self.schemas.insert(kind, schema);
        self
    }

    /// Look up the schema of an entity kind.
    pub fn get(&self, kind: EntityKind) -> Option<&EntitySchema> {
        self.schemas.get(&kind)
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
