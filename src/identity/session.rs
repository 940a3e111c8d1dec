use axum::http::HeaderValue;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::principal::Identity;
use super::role::Role;
use crate::error::{AuthError, AuthResult};
use crate::tprintln;

/// Fixed cookie name carrying the session token.
pub const SESSION_COOKIE: &str = "serialmint_session";

// Sentinel claims written over the cookie on logout: a token that can never
// verify (zero validity window).
const INVALID_USERNAME: &str = "INVALID";
const INVALID_NAME: &str = "Not Logged-In";

/// Claims carried by a session token. Tokens are opaque to consumers beyond
/// signature verification plus these fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Username (provider nickname).
    pub sub: String,
    pub name: String,
    /// Provider identity URL the session was established from.
    pub identity: String,
    /// Role code as validated at login; 0 in the logout sentinel.
    pub role: i64,
    pub iat: i64,
    pub exp: i64,
}

/// Mints and verifies HS256 session tokens. The secret is read-only after
/// construction; an empty secret means the service cannot establish sessions
/// and `issue` fails accordingly.
pub struct TokenIssuer {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self { secret: secret.into(), ttl }
    }

    pub fn issue(&self, identity: &Identity, role: Role) -> AuthResult<String> {
        if self.secret.is_empty() {
            return Err(AuthError::token_issuance(
                "no-secret",
                "session signing secret is not configured",
            ));
        }
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: identity.nickname.clone(),
            name: identity.display_name().to_string(),
            identity: identity.claimed_id.clone(),
            role: role.code(),
            iat: now,
            exp: now + self.ttl.num_seconds(),
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| AuthError::token_issuance("encode-failed".to_string(), e.to_string()))?;
        tprintln!("session.issue user={} role={} ttl_secs={}", claims.sub, role, self.ttl.num_seconds());
        Ok(token)
    }

    /// Sentinel token written over the session cookie on logout. Best-effort:
    /// a failure here is logged and an empty value returned, and logout
    /// proceeds regardless.
    pub fn create_invalid(&self) -> String {
        let claims = SessionClaims {
            sub: INVALID_USERNAME.to_string(),
            name: INVALID_NAME.to_string(),
            identity: String::new(),
            role: 0,
            iat: Utc::now().timestamp(),
            exp: 0,
        };
        match jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        ) {
            Ok(t) => t,
            Err(e) => {
                error!("failed to build sentinel logout token: {}", e);
                String::new()
            }
        }
    }

    /// Check signature and expiry of a presented token and return its claims.
    pub fn verify(&self, token: &str) -> AuthResult<SessionClaims> {
        // Default validation: exp required, 60s leeway for clock drift.
        let validation = Validation::new(Algorithm::HS256);
        let data = jsonwebtoken::decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &validation,
        )
        .map_err(|e| {
            AuthError::unauthorized("error-auth".to_string(), format!("invalid session token: {}", e))
        })?;
        Ok(data.claims)
    }
}

/// `Set-Cookie` value for a fresh login.
pub fn session_cookie(token: &str) -> HeaderValue {
    // Secure, HttpOnly cookie scoped to path / with SameSite=Strict
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; Secure; SameSite=Strict; Path=/",
        SESSION_COOKIE, token
    ))
    .unwrap()
}

/// `Set-Cookie` value that overwrites the session with the sentinel token and
/// an expiry one day in the past, so the browser drops the cookie.
pub fn expired_session_cookie(token: &str) -> HeaderValue {
    let expires = (Utc::now() - Duration::days(1)).format("%a, %d %b %Y %H:%M:%S GMT");
    HeaderValue::from_str(&format!(
        "{}={}; Expires={}; HttpOnly; Secure; SameSite=Strict; Path=/",
        SESSION_COOKIE, token, expires
    ))
    .unwrap()
}
