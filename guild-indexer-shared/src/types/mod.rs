//! This module defines the core data structures and types used across the guild indexer.

pub mod change_event;
pub mod dead_letter;
pub mod guild;
pub mod guild_document;
pub mod search_query;

pub use change_event::{ChangeEvent, EventKind, SequencePosition};
pub use dead_letter::{DeadLetterRecord, FailureClass};
pub use guild::{Guild, Player};
pub use guild_document::GuildDocument;
pub use search_query::SearchField;
