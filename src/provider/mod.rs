//! Identity and data provider seam.
//!
//! The application never verifies credentials or talks SQL itself; it relays
//! the caller's access token to a [`Provider`]. Two implementations exist:
//! [`HostedProvider`] for a Supabase-compatible service and [`LocalProvider`]
//! for an embedded SQLite database.

mod hosted;
mod local;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use hosted::HostedProvider;
pub use local::LocalProvider;

use crate::config::{ProviderKind, ServerConfig};
use crate::error::{Error, Result};
use crate::store::{SqliteStore, Store};
use crate::types::{Identity, NewRow, Row, RowChanges, RowScope, Session, SignUp};

#[async_trait]
pub trait Provider: Send + Sync {
    // Identity operations
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session>;
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUp>;
    /// `Ok(None)` when the provider no longer accepts the access token.
    async fn get_user(&self, access_token: &str) -> Result<Option<Identity>>;
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session>;
    async fn sign_out(&self, access_token: &str) -> Result<()>;

    // Table operations, performed on behalf of the access token's identity
    async fn get_profile_role(&self, access_token: &str, identity_id: &str)
    -> Result<Option<String>>;
    async fn list_rows(&self, access_token: &str, scope: &RowScope) -> Result<Vec<Row>>;
    async fn insert_row(&self, access_token: &str, row: &NewRow) -> Result<Row>;
    /// Returns the number of rows changed.
    async fn update_row(
        &self,
        access_token: &str,
        id: &str,
        changes: &RowChanges,
        scope: &RowScope,
    ) -> Result<u64>;
    /// Returns the number of rows removed.
    async fn delete_row(&self, access_token: &str, id: &str, scope: &RowScope) -> Result<u64>;
}

/// Builds the provider selected by the configuration. The local provider
/// creates its database schema if needed.
pub fn from_config(config: &ServerConfig) -> Result<Arc<dyn Provider>> {
    match config.provider {
        ProviderKind::Local => {
            std::fs::create_dir_all(&config.data_dir)?;
            let store = SqliteStore::new(config.db_path())?;
            store.initialize()?;
            Ok(Arc::new(LocalProvider::new(
                Arc::new(store),
                chrono::Duration::seconds(config.access_token_ttl_secs),
            )))
        }
        ProviderKind::Hosted => {
            let url = config
                .provider_url
                .as_deref()
                .ok_or_else(|| Error::Config("hosted provider requires provider_url".into()))?;
            let key = config
                .anon_key
                .as_deref()
                .ok_or_else(|| Error::Config("hosted provider requires anon_key".into()))?;
            Ok(Arc::new(HostedProvider::new(
                url,
                key,
                Duration::from_secs(config.http_timeout_secs),
            )?))
        }
    }
}
