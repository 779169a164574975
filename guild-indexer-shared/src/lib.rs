//! # Guild Indexer Shared
//!
//! This crate defines shared data structures and types used across the guild indexer ecosystem.
//! It includes the record shapes read from the record store, the change events emitted by the
//! change capture source, the documents written to the search index and the dead-letter records
//! produced when delivery permanently fails.

pub mod fixtures;
pub mod types;

pub use types::change_event::{ChangeEvent, EventKind, SequencePosition};
pub use types::dead_letter::{DeadLetterRecord, FailureClass};
pub use types::guild::{Guild, Player};
pub use types::guild_document::GuildDocument;
pub use types::search_query::SearchField;
