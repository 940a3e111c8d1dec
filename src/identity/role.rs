use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// Authorization roles, a closed set.
///
/// The numeric codes are the persisted representation; the gaps leave room
/// for intermediate levels without renumbering existing accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Standard,
    Admin,
    Superuser,
}

impl Role {
    pub const STANDARD_CODE: i64 = 100;
    pub const ADMIN_CODE: i64 = 200;
    pub const SUPERUSER_CODE: i64 = 300;

    /// Validate a persisted role code. Anything outside the closed set is a
    /// data-integrity fault for the request, never a silent default.
    pub fn from_code(code: i64) -> AuthResult<Role> {
        match code {
            Self::STANDARD_CODE => Ok(Role::Standard),
            Self::ADMIN_CODE => Ok(Role::Admin),
            Self::SUPERUSER_CODE => Ok(Role::Superuser),
            other => Err(AuthError::role_integrity(
                "invalid-role".to_string(),
                format!("role code {} is outside the known set", other),
            )),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Role::Standard => Self::STANDARD_CODE,
            Role::Admin => Self::ADMIN_CODE,
            Role::Superuser => Self::SUPERUSER_CODE,
        }
    }

    /// True for roles allowed to submit signing-key material.
    pub fn can_manage_keys(self) -> bool {
        matches!(self, Role::Admin | Role::Superuser)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Standard => "standard",
            Role::Admin => "admin",
            Role::Superuser => "superuser",
        };
        f.write_str(s)
    }
}
