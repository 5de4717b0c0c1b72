use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::Role;

/// An authenticated end user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Access/refresh token pair issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Unix timestamp (seconds) at which the access token stops being accepted.
    pub expires_at: i64,
    pub user: Identity,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    #[must_use]
    pub fn expires_within(&self, now: DateTime<Utc>, leeway: Duration) -> bool {
        self.expires_at <= (now + leeway).timestamp()
    }
}

#[derive(Debug, Clone)]
pub enum SignUp {
    SignedIn(Session),
    /// The provider created the identity but withholds a session until the
    /// address is confirmed.
    ConfirmationRequired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    /// Raw role value; see [`Role::from_profile`].
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    #[must_use]
    pub fn role(&self) -> Role {
        Role::from_profile(Some(&self.role))
    }
}

/// A record in the managed `users` table. Every row has exactly one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    #[serde(deserialize_with = "deserialize_row_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Hosted tables may use integer identity columns; ids are carried as text.
fn deserialize_row_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Int(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRow {
    pub name: String,
    pub email: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowChanges {
    pub name: String,
    pub email: String,
    pub updated_at: DateTime<Utc>,
}

/// Ownership filter applied to every row read and mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowScope {
    All,
    OwnedBy(String),
}

impl RowScope {
    #[must_use]
    pub fn for_role(role: Role, identity_id: &str) -> Self {
        if role.is_admin() {
            RowScope::All
        } else {
            RowScope::OwnedBy(identity_id.to_string())
        }
    }

    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        match self {
            RowScope::All => None,
            RowScope::OwnedBy(id) => Some(id),
        }
    }

    #[must_use]
    pub fn permits(&self, row: &Row) -> bool {
        self.owner().is_none_or(|owner| owner == row.user_id)
    }
}

/// Locally stored credentials for an identity.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id.clone(),
            email: Some(self.email.clone()),
        }
    }
}

/// Locally issued session. Both tokens are stored hashed.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub account_id: String,
    pub access_hash: String,
    pub access_lookup: String,
    pub refresh_hash: String,
    pub refresh_lookup: String,
    pub access_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
