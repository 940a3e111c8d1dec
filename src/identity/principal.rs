use serde::{Deserialize, Serialize};

/// A federated identity asserted by the provider for one login request.
///
/// `nickname` is the stable username the rest of the service keys on. The
/// provider may omit it even on an otherwise valid response; it is carried as
/// an empty string in that case and the login controller rejects it there.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    /// Provider identity URL (`openid.claimed_id`).
    pub claimed_id: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub fullname: Option<String>,
}

impl Identity {
    /// Display name for token claims: full name when the provider sent one,
    /// otherwise the nickname.
    pub fn display_name(&self) -> &str {
        match &self.fullname {
            Some(n) if !n.is_empty() => n.as_str(),
            _ => self.nickname.as_str(),
        }
    }
}
