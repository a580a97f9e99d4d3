pub mod jwt;
pub mod middleware;

use std::sync::Arc;

use async_trait::async_trait;

/// Authenticated principal attached to a connection or request for its
/// whole lifetime. Established once at handshake, never re-verified
/// per event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
}

/// Session token verification failures. The distinction matters at the
/// WebSocket handshake, where expired and invalid tokens close with
/// different reasons.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("session token expired")]
    Expired,
    #[error("invalid session token")]
    Invalid,
}

/// Identity collaborator: turns an opaque session token into an identity.
/// Token issuance lives in the identity service; this side only verifies.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn verify_session_token(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Shared handle to the identity collaborator.
pub type DynVerifier = Arc<dyn SessionVerifier>;
