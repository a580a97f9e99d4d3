use crate::auth::DynVerifier;
use crate::chat::router::ConversationRouter;
use crate::db::DynStore;
use crate::ws::registry::SessionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Persistence collaborator: messages, users, advisory presence flags
    pub store: DynStore,
    /// Identity collaborator: session token verification
    pub verifier: DynVerifier,
    /// Live connections per user
    pub sessions: SessionRegistry,
    /// Conversation subscriptions per pairing
    pub conversations: ConversationRouter,
}
