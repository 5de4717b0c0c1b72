mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::*;

/// Store defines the local database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Account operations
    fn create_account(&self, account: &Account) -> Result<()>;
    fn get_account(&self, id: &str) -> Result<Option<Account>>;
    fn get_account_by_email(&self, email: &str) -> Result<Option<Account>>;

    // Session operations
    fn create_session(&self, session: &SessionRecord) -> Result<()>;
    fn get_session_by_access_lookup(&self, lookup: &str) -> Result<Option<SessionRecord>>;
    fn get_session_by_refresh_lookup(&self, lookup: &str) -> Result<Option<SessionRecord>>;
    fn delete_session(&self, id: &str) -> Result<bool>;
    /// Removes sessions whose access token expired before `cutoff`.
    fn delete_sessions_expired_before(&self, cutoff: &DateTime<Utc>) -> Result<u64>;

    // Profile operations
    fn upsert_profile(&self, profile: &Profile) -> Result<()>;
    fn get_profile(&self, id: &str) -> Result<Option<Profile>>;

    // Row operations, all filtered by the given ownership scope
    fn create_row(&self, row: &Row) -> Result<()>;
    fn list_rows(&self, scope: &RowScope) -> Result<Vec<Row>>;
    fn update_row(&self, id: &str, changes: &RowChanges, scope: &RowScope) -> Result<u64>;
    fn delete_row(&self, id: &str, scope: &RowScope) -> Result<u64>;
}
