//! REST endpoint for the user directory.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::auth::middleware::CurrentUser;
use crate::db::models::User;
use crate::error::ChatError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<User>,
}

/// GET /api/users
/// Everyone except the caller, for starting new conversations. The
/// is_online flags are the advisory persisted snapshots; clients get live
/// presence over the WebSocket.
pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<UsersResponse>, ChatError> {
    let users = state.store.list_users(Some(user.user_id)).await?;
    Ok(Json(UsersResponse { users }))
}

/// GET /api/users/{user_id}
/// One user's profile.
pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(user_id): Path<i64>,
) -> Result<Json<User>, ChatError> {
    let user = state
        .store
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| ChatError::NotFound(format!("user {user_id} not found")))?;
    Ok(Json(user))
}
