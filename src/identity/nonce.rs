use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::error::{AuthError, AuthResult};
use crate::tprintln;

/// Replay protection for provider response nonces.
///
/// `accept` is a single atomic check-and-mark: a nonce is either accepted
/// exactly once within its freshness window or rejected. Implementations are
/// consulted during response verification, before any signature round trip.
pub trait NonceStore: Send + Sync {
    fn accept(&self, nonce: &str) -> AuthResult<()>;
}

/// In-memory nonce store.
///
/// A provider nonce is an RFC 3339 UTC timestamp (`2006-01-02T15:04:05Z`)
/// followed by salt characters. Entries older than `max_age` are rejected as
/// stale and pruned, so the map stays bounded by provider traffic within the
/// window.
pub struct MemoryNonceStore {
    max_age: Duration,
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
}

// Timestamp prefix is fixed-width: "YYYY-MM-DDTHH:MM:SSZ".
const NONCE_TS_LEN: usize = 20;

impl MemoryNonceStore {
    /// Nonce timestamps carry whole-second precision, so a `max_age` below
    /// one second cannot accept anything.
    pub fn new(max_age: Duration) -> Self {
        Self { max_age, seen: Mutex::new(HashMap::new()) }
    }

    fn parse_timestamp(nonce: &str) -> AuthResult<DateTime<Utc>> {
        if nonce.len() < NONCE_TS_LEN || !nonce.is_char_boundary(NONCE_TS_LEN) {
            return Err(AuthError::verification(
                "nonce-malformed".to_string(),
                format!("nonce too short: {:?}", nonce),
            ));
        }
        let ts = &nonce[..NONCE_TS_LEN];
        match DateTime::parse_from_rfc3339(ts) {
            Ok(t) => Ok(t.with_timezone(&Utc)),
            Err(e) => Err(AuthError::verification(
                "nonce-malformed".to_string(),
                format!("bad nonce timestamp {:?}: {}", ts, e),
            )),
        }
    }
}

impl Default for MemoryNonceStore {
    // 60s is the usual relying-party window; provider clock skew beyond that
    // means the response is not trustworthy anyway.
    fn default() -> Self {
        Self::new(Duration::seconds(60))
    }
}

impl NonceStore for MemoryNonceStore {
    fn accept(&self, nonce: &str) -> AuthResult<()> {
        let ts = Self::parse_timestamp(nonce)?;
        let now = Utc::now();
        if now - ts > self.max_age || ts - now > self.max_age {
            return Err(AuthError::verification(
                "nonce-stale".to_string(),
                format!("nonce timestamp {} outside the acceptance window", ts),
            ));
        }
        // Check, mark and prune under one lock so two requests carrying the
        // same nonce can never both win.
        let mut seen = self.seen.lock();
        if seen.contains_key(nonce) {
            return Err(AuthError::verification(
                "nonce-replayed".to_string(),
                "response nonce already used".to_string(),
            ));
        }
        let cutoff = now - self.max_age;
        seen.retain(|_, t| *t >= cutoff);
        seen.insert(nonce.to_string(), ts);
        tprintln!("nonce.accept ts={} tracked={}", ts, seen.len());
        Ok(())
    }
}

/// Format a nonce the way providers emit them. Shared with tests and the
/// verifier's diagnostics.
pub fn format_nonce(ts: DateTime<Utc>, salt: &str) -> String {
    format!("{}{}", ts.format("%Y-%m-%dT%H:%M:%SZ"), salt)
}
