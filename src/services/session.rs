//! Session values: the authenticated user plus the bearer token used for
//! every backend call made on their behalf.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// JWT claims issued by Supabase auth
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id (uuid)
    pub exp: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    Expired,
}

/// An authenticated request context.
///
/// Resolved once per request by the session middleware and handed explicitly
/// to every operation that talks to the backend, so row-level security sees
/// the caller's identity.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub access_token: String,
}

/// Validate a Supabase access token locally (HS256, audience `authenticated`).
pub fn validate_access_token(token: &str, secret: &[u8]) -> Result<AuthSession, SessionError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&["authenticated"]);
    validation.set_required_spec_claims(&["exp", "sub"]);

    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation).map_err(
        |e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
            _ => {
                tracing::debug!("JWT decode error: {:?}", e);
                SessionError::InvalidToken
            }
        },
    )?;

    let user_id = data
        .claims
        .sub
        .parse::<Uuid>()
        .map_err(|_| SessionError::InvalidToken)?;

    Ok(AuthSession {
        user_id,
        email: data.claims.email,
        access_token: token.to_string(),
    })
}
