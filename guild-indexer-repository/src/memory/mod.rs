//! In-memory implementations of every collaborator.
//!
//! Used for local single-process runs and by tests. Each store exposes a few failure
//! injection hooks so tests can drive the retry and dead-letter paths.

mod change_log;
mod dead_letter_store;
mod record_store;
mod search_index;

pub use change_log::MemoryChangeLog;
pub use dead_letter_store::MemoryDeadLetterStore;
pub use record_store::MemoryRecordStore;
pub use search_index::MemorySearchIndex;
