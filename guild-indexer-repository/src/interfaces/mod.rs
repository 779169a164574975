//! Interface definitions for the external collaborators of the indexer.
//!
//! Every collaborator sits behind a trait so that the pipeline stages receive explicit
//! dependency objects and tests can swap in fakes.

mod change_source;
mod dead_letter_store;
mod record_store;
mod search_index_provider;

pub use change_source::ChangeSource;
pub use dead_letter_store::DeadLetterStore;
pub use record_store::RecordStore;
pub use search_index_provider::SearchIndexProvider;
