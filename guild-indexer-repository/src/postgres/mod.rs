//! PostgreSQL implementation of the record store.
//!
//! Each entity kind lives in its own table with two columns: `id TEXT PRIMARY KEY` and
//! `body JSONB` holding the whole record. Tables are provisioned outside of this crate.

mod record_store;

pub use record_store::PostgresRecordStore;
