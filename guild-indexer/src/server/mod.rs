// Server module - HTTP query surface
pub mod handlers;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::info;

pub use self::state::AppState;
use crate::IndexingError;

/// Create the Axum application router with all routes
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/manage", post(handlers::seed_handler))
        .route("/manage/description/:value", get(handlers::search_description))
        .route("/manage/player/:value", get(handlers::search_player))
        .route("/health", get(handlers::health_check))
        .with_state(state)
}

/// Run the server on the specified address until `shutdown` flips to `true`
pub async fn run_server(
    app: Router,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), IndexingError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| IndexingError::server(format!("Failed to bind {}: {}", addr, e)))?;

    info!("Server listening on {}", addr);
    info!("- Seed endpoint: http://{}/manage", addr);
    info!("- Search endpoints: http://{}/manage/{{description,player}}/{{value}}", addr);
    info!("- Health endpoint: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .map_err(|e| IndexingError::server(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use guild_indexer_repository::memory::{MemoryRecordStore, MemorySearchIndex};
    use guild_indexer_repository::{
        EntityKind, GuildSearchService, RecordStore, SearchIndexProvider,
    };
    use guild_indexer_shared::fixtures::sample_guilds;
    use guild_indexer_shared::GuildDocument;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app_with_index() -> (Router, Arc<MemoryRecordStore>) {
        let index = Arc::new(MemorySearchIndex::new());
        let documents: Vec<GuildDocument> = sample_guilds()
            .iter()
            .map(|g| GuildDocument::from_guild(g, vec![Some("Black Mage".to_string())]))
            .collect();
        index.bulk_upsert_documents(&documents).await.unwrap();

        let store = Arc::new(MemoryRecordStore::new());
        let app = create_app(AppState {
            store: store.clone(),
            search: Arc::new(GuildSearchService::new(index)),
        });
        (app, store)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Vec<GuildDocument>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_search_description() {
        let (app, _) = app_with_index().await;

        let (status, hits) = get_json(app, "/manage/description/midnight").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].guild_id, "guild1");
    }

    #[tokio::test]
    async fn test_search_player_without_match_is_empty() {
        let (app, _) = app_with_index().await;

        let (status, hits) = get_json(app, "/manage/player/Nobody").await;

        assert_eq!(status, StatusCode::OK);
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_seed_writes_fixtures() {
        let (app, store) = app_with_index().await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/manage")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Done");

        let players = store
            .batch_get(EntityKind::Player, &["p1".to_string()])
            .await
            .unwrap();
        assert_eq!(players.len(), 1);
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app_with_index().await;

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
