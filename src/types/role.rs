use std::fmt;

use serde::{Deserialize, Serialize};

/// Visibility level derived from an identity's profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    pub const ADMIN: &'static str = "admin";
    pub const USER: &'static str = "user";

    /// Maps a raw profile role to a `Role`. Only an exact `admin` grants
    /// administrator access; anything else, including no profile, is `User`.
    #[must_use]
    pub fn from_profile(raw: Option<&str>) -> Self {
        match raw {
            Some(Self::ADMIN) => Role::Admin,
            _ => Role::User,
        }
    }

    /// Strict parse used by the CLI, where a typo must not silently demote.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            Self::ADMIN => Some(Role::Admin),
            Self::USER => Some(Role::User),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => Self::ADMIN,
            Role::User => Self::USER,
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
