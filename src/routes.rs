use axum::Router;
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::chat::{messages, users};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Rate limiting on the REST send path: bursts of 30, refilling 1/sec
    // per IP. The WebSocket path is not limited; it carries its own
    // backpressure through the per-connection channel.
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(1)
            .burst_size(30)
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Spawn background task to clean up rate limiter state
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    // Message submission, rate limited
    let send_routes = Router::new()
        .route("/api/messages", axum::routing::post(messages::send_message))
        .layer(GovernorLayer {
            config: governor_config,
        });

    // Message reads, read state, and deletion (JWT via CurrentUser extractor)
    let message_routes = Router::new()
        .route(
            "/api/messages/conversations",
            axum::routing::get(messages::recent_conversations),
        )
        .route(
            "/api/messages/conversation/{user_id}",
            axum::routing::get(messages::conversation_history),
        )
        .route(
            "/api/messages/conversation/{user_id}",
            axum::routing::delete(messages::delete_conversation),
        )
        .route(
            "/api/messages/conversation/{user_id}/read",
            axum::routing::put(messages::mark_conversation_read),
        )
        .route(
            "/api/messages/unread-count",
            axum::routing::get(messages::unread_count),
        )
        .route(
            "/api/messages/read/{message_id}",
            axum::routing::put(messages::mark_message_read),
        )
        .route(
            "/api/messages/user/all",
            axum::routing::delete(messages::delete_all_sent),
        )
        .route(
            "/api/messages/{message_id}",
            axum::routing::delete(messages::delete_message),
        );

    // User directory
    let user_routes = Router::new()
        .route("/api/users", axum::routing::get(users::list_users))
        .route("/api/users/{user_id}", axum::routing::get(users::get_user));

    // WebSocket endpoint (auth via query param, not JWT header)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(send_routes)
        .merge(message_routes)
        .merge(user_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
