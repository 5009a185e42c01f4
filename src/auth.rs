// Authentication: bearer JWT verification and the request extractor.
//
// Tokens are minted by the external account service; this backend only
// verifies them with the shared secret.

use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::config::LOCAL_USER_ID;
use crate::error::MatchError;

// ── JWT ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // account id
    #[serde(default = "default_role")]
    pub role: String,
    pub exp: usize, // expiry (unix timestamp)
}

fn default_role() -> String {
    "user".to_string()
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Mint a token. Used by tests and local tooling.
pub fn create_token(
    secret: &str,
    subject: &str,
    role: &str,
    ttl: chrono::Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = (chrono::Utc::now() + ttl).timestamp().max(0) as usize;

    let claims = Claims {
        sub: subject.to_string(),
        role: role.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

// ── Axum extractor: AuthUser ─────────────────────────────────────────

/// Extracts the authenticated caller from the Authorization header.
/// In local mode every request is a local admin.
/// Usage: `AuthUser(claims)` in handler parameters.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.0.sub
    }

    pub fn require_admin(&self) -> Result<(), MatchError> {
        if self.0.is_admin() {
            Ok(())
        } else {
            Err(MatchError::Forbidden("admin role required".to_string()))
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = MatchError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if state.config.local_mode {
            return Ok(AuthUser(Claims {
                sub: LOCAL_USER_ID.to_string(),
                role: "admin".to_string(),
                exp: usize::MAX,
            }));
        }

        let token = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or(MatchError::NotAuthenticated)?;

        match verify_token(&state.config.jwt_secret, token) {
            Ok(claims) if !claims.sub.trim().is_empty() => Ok(AuthUser(claims)),
            Ok(_) => Err(MatchError::NotAuthenticated),
            Err(e) => {
                tracing::debug!("Rejected bearer token: {e}");
                Err(MatchError::NotAuthenticated)
            }
        }
    }
}
