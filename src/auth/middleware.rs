use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::{AuthError, Identity};
use crate::error::ChatError;
use crate::state::AppState;

/// Authenticated REST caller, extracted from the Authorization: Bearer
/// header. REST handlers take this as an argument; reaching the handler
/// body means the token already verified.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ChatError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::Invalid)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::Invalid)?;

        let identity = state.verifier.verify_session_token(token).await?;
        Ok(CurrentUser(identity))
    }
}
