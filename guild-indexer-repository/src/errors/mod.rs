//! Error types for the guild indexer repository.
//!
//! One error type per external collaborator: the search index, the record store, the
//! dead-letter store and the change capture source.

mod dead_letter_error;
mod record_store_error;
mod search_index_error;
mod source_error;

pub use dead_letter_error::DeadLetterError;
pub use record_store_error::RecordStoreError;
pub use search_index_error::SearchIndexError;
pub use source_error::SourceError;
