// HTTP request handlers
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use guild_indexer_repository::seed_fixtures;
use guild_indexer_shared::{GuildDocument, SearchField};
use tracing::{error, info};

use crate::server::state::AppState;

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "Guild indexer is running")
}

/// Seed endpoint - writes the sample players and guilds to the record store
///
/// In local mode the guild writes go through the in-memory change log, so the guilds show up
/// in the index once their window is flushed.
pub async fn seed_handler(State(state): State<AppState>) -> impl IntoResponse {
    match seed_fixtures(state.store.as_ref()).await {
        Ok(()) => {
            info!("Seeded sample players and guilds");
            (StatusCode::OK, "Done")
        }
        Err(e) => {
            error!(error = %e, "Failed to seed sample data");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to seed sample data")
        }
    }
}

/// Match guilds on their description
pub async fn search_description(
    State(state): State<AppState>,
    Path(value): Path<String>,
) -> Json<Vec<GuildDocument>> {
    Json(state.search.search(SearchField::Description, &value).await)
}

/// Match guilds on the display name of one of their members
pub async fn search_player(
    State(state): State<AppState>,
    Path(value): Path<String>,
) -> Json<Vec<GuildDocument>> {
    Json(state.search.search(SearchField::Members, &value).await)
}
