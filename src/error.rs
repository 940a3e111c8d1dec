//! Unified auth-flow error model and mapping helpers.
//! One enum covers everything the login/logout/token path can fail with;
//! each variant carries a stable machine code plus a human message.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthError {
    /// Identity-provider verification failed: bad signature, replayed or
    /// stale nonce, cancelled login, or a response we could not parse.
    Verification { code: String, message: String },
    /// Session token could not be minted (missing secret, encode failure).
    TokenIssuance { code: String, message: String },
    /// A presented session token was missing, expired or unacceptable.
    Unauthorized { code: String, message: String },
    /// User lookup failed. Not-found and backend failure are deliberately
    /// the same variant: callers must not be able to probe for accounts.
    Lookup { code: String, message: String },
    /// A persisted role code outside the closed set. Data fault, never a
    /// silent default.
    RoleIntegrity { code: String, message: String },
}

impl AuthError {
    pub fn code_str(&self) -> &str {
        match self {
            AuthError::Verification { code, .. }
            | AuthError::TokenIssuance { code, .. }
            | AuthError::Unauthorized { code, .. }
            | AuthError::Lookup { code, .. }
            | AuthError::RoleIntegrity { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AuthError::Verification { message, .. }
            | AuthError::TokenIssuance { message, .. }
            | AuthError::Unauthorized { message, .. }
            | AuthError::Lookup { message, .. }
            | AuthError::RoleIntegrity { message, .. } => message.as_str(),
        }
    }

    pub fn verification<S: Into<String>>(code: S, msg: S) -> Self { AuthError::Verification { code: code.into(), message: msg.into() } }
    pub fn token_issuance<S: Into<String>>(code: S, msg: S) -> Self { AuthError::TokenIssuance { code: code.into(), message: msg.into() } }
    pub fn unauthorized<S: Into<String>>(code: S, msg: S) -> Self { AuthError::Unauthorized { code: code.into(), message: msg.into() } }
    pub fn lookup<S: Into<String>>(code: S, msg: S) -> Self { AuthError::Lookup { code: code.into(), message: msg.into() } }
    pub fn role_integrity<S: Into<String>>(code: S, msg: S) -> Self { AuthError::RoleIntegrity { code: code.into(), message: msg.into() } }

    /// A provider response that parsed but is missing required fields.
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        AuthError::Verification { code: "malformed-response".into(), message: msg.into() }
    }

    /// Map to HTTP status code for the browser-facing login path.
    pub fn http_status(&self) -> u16 {
        match self {
            AuthError::Verification { .. } => 400,
            AuthError::TokenIssuance { .. } => 400,
            AuthError::Unauthorized { .. } => 401,
            AuthError::Lookup { .. } => 500,
            AuthError::RoleIntegrity { .. } => 500,
        }
    }

    /// True when the user-visible message must be the generic server-error
    /// line; detail stays in the log only.
    pub fn conceals_detail(&self) -> bool {
        matches!(self, AuthError::Lookup { .. } | AuthError::RoleIntegrity { .. })
    }
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AuthError {}

pub type AuthResult<T> = Result<T, AuthError>;
