/**
 * Session Tokens
 *
 * JWT creation and validation. The `sub` claim carries the numeric user id;
 * the signing secret comes from `ServerConfig` and travels through the app
 * state as a `JwtSecret`.
 */

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::backend::error::BackendError;
use crate::shared::UserId;

/// Tokens expire after 30 days
const TOKEN_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// HMAC secret used to sign and verify tokens
#[derive(Clone)]
pub struct JwtSecret(Arc<str>);

impl JwtSecret {
    pub fn new(secret: impl Into<Arc<str>>) -> Self {
        Self(secret.into())
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JwtSecret(..)")
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at time (Unix timestamp)
    pub iat: u64,
}

/// Create a token for `user_id`
pub fn create_token(user_id: UserId, secret: &JwtSecret) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp().max(0) as u64;
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + TOKEN_TTL_SECS,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify a token's signature and expiry
pub fn verify_token(token: &str, secret: &JwtSecret) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Resolve the caller's user id from a token
pub fn user_id_from_token(token: &str, secret: &JwtSecret) -> Result<UserId, BackendError> {
    let claims = verify_token(token, secret)
        .map_err(|e| BackendError::unauthorized(format!("Invalid token: {}", e)))?;
    claims
        .sub
        .parse::<UserId>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| BackendError::unauthorized("Invalid user ID"))
}
