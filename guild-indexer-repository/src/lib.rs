//! # Guild Indexer Repository
//!
//! This crate provides the traits for every external collaborator of the guild indexer (search
//! index, record store, change capture source, dead-letter store) together with their
//! implementations: OpenSearch, PostgreSQL and in-memory. It also holds the entity schema
//! registry and the guild search service used by the query endpoints.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod opensearch;
pub mod postgres;
pub mod schema;
pub mod seed;
pub mod service;
pub mod types;
pub mod utils;

pub use config::SearchServiceConfig;
pub use errors::{DeadLetterError, RecordStoreError, SearchIndexError, SourceError};
pub use interfaces::{ChangeSource, DeadLetterStore, RecordStore, SearchIndexProvider};
pub use opensearch::OpenSearchProvider;
pub use postgres::PostgresRecordStore;
pub use schema::{EntityKind, EntitySchema, SchemaRegistry};
pub use seed::seed_fixtures;
pub use service::GuildSearchService;
pub use types::{BatchOperationResult, BatchOperationSummary, ChangeBatch, Cursor};
