use std::path::Path;

use async_trait::async_trait;
use jsonwebtoken::{decode, DecodingKey, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, Identity, SessionVerifier};
use crate::db::DynStore;

/// Session token claims. Tokens are minted by the identity service with the
/// shared signing key; this crate only decodes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Load or generate the JWT signing key (256-bit random secret).
/// Key is stored as raw bytes in data_dir/jwt_secret.
pub fn load_or_generate_jwt_secret(data_dir: &str) -> Result<Vec<u8>, std::io::Error> {
    let key_path = Path::new(data_dir).join("jwt_secret");

    if key_path.exists() {
        let key = std::fs::read(&key_path)?;
        if key.len() == 32 {
            tracing::info!("JWT signing key loaded from {}", key_path.display());
            return Ok(key);
        }
        // Invalid key file — regenerate
        tracing::warn!("JWT key file has wrong size ({}), regenerating", key.len());
    }

    let key: [u8; 32] = rand::rng().random();
    std::fs::write(&key_path, key)?;
    tracing::info!("JWT signing key generated at {}", key_path.display());
    Ok(key.to_vec())
}

/// Decode and validate a session token signature and expiry.
pub fn validate_session_token(
    secret: &[u8],
    token: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;
    Ok(token_data.claims)
}

/// JWT-backed session verifier. Decodes the token, then resolves the
/// subject against the user store — a well-signed token for a deleted
/// user is still invalid.
pub struct JwtVerifier {
    secret: Vec<u8>,
    store: DynStore,
}

impl JwtVerifier {
    pub fn new(secret: Vec<u8>, store: DynStore) -> Self {
        Self { secret, store }
    }
}

#[async_trait]
impl SessionVerifier for JwtVerifier {
    async fn verify_session_token(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = validate_session_token(&self.secret, token).map_err(|err| {
            match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid,
            }
        })?;

        let user = self
            .store
            .find_user_by_id(claims.sub)
            .await
            .map_err(|err| {
                tracing::error!(user_id = claims.sub, error = %err, "User lookup failed during token verification");
                AuthError::Invalid
            })?
            .ok_or(AuthError::Invalid)?;

        Ok(Identity {
            user_id: user.id,
            username: user.username,
        })
    }
}
