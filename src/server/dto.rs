use serde::Deserialize;

use crate::types::{Identity, Role, Row};

#[derive(Debug, Default, Deserialize)]
pub struct CredentialsForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RowForm {
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Add,
    Update,
    Delete,
}

impl Intent {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "add" => Some(Intent::Add),
            "update" => Some(Intent::Update),
            "delete" => Some(Intent::Delete),
            _ => None,
        }
    }
}

/// Everything the users page renders.
#[derive(Debug, Clone)]
pub struct UsersPage {
    pub identity: Identity,
    pub role: Role,
    pub rows: Vec<Row>,
}
