// App state for the query server
use std::sync::Arc;

use guild_indexer_repository::{GuildSearchService, RecordStore};

#[derive(Clone)]
pub struct AppState {
    /// Store the fixtures are written to.
    pub store: Arc<dyn RecordStore>,
    pub search: Arc<GuildSearchService>,
}
