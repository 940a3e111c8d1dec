//! Federated identity, replay protection and session tokens.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod role;
mod nonce;
mod openid;
mod session;

pub use principal::Identity;
pub use role::Role;
pub use nonce::{format_nonce, MemoryNonceStore, NonceStore};
pub use openid::{parse_query, IdentityVerifier, SsoVerifier, OPENID_NS};
pub use session::{expired_session_cookie, session_cookie, SessionClaims, TokenIssuer, SESSION_COOKIE};
