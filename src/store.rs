//! User accounts and datastore record contracts.
//!
//! Persistence proper lives outside this service; the auth core only needs a
//! username lookup plus the serialized shapes that list responses carry.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found: {0}")]
    NotFound(String),
    #[error("datastore unavailable: {0}")]
    Unavailable(String),
}

/// A persisted account. `role` stays the raw persisted code here; it is
/// validated against the closed role set at login, not on load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub name: String,
    pub email: String,
    pub role: i64,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, username: &str) -> Result<User, StoreError>;
}

/// In-memory user store, seeded at startup.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        self.users.write().insert(user.username.clone(), user);
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_user(&self, username: &str) -> Result<User, StoreError> {
        self.users
            .read()
            .get(username)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(username.to_string()))
    }
}

/// Device model as carried in list responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Model {
    pub id: i64,
    pub brand_id: String,
    pub name: String,
    pub revision: i64,
}

/// Signing keypair metadata as carried in list responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Keypair {
    pub id: i64,
    pub authority_id: String,
    pub key_id: String,
    pub active: bool,
}

/// One issued-serial audit entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SigningLog {
    pub id: i64,
    pub make: String,
    pub model: String,
    pub serial_number: String,
    pub fingerprint: String,
    pub created: DateTime<Utc>,
}
