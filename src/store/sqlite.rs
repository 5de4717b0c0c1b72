use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

// Fixed-width so that text ordering matches time ordering.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn account_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        account_id: row.get(1)?,
        access_hash: row.get(2)?,
        access_lookup: row.get(3)?,
        refresh_hash: row.get(4)?,
        refresh_lookup: row.get(5)?,
        access_expires_at: parse_datetime(&row.get::<_, String>(6)?),
        created_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

fn row_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok(Row {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        user_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: row
            .get::<_, Option<String>>(5)?
            .map(|s| parse_datetime(&s)),
    })
}

const SESSION_COLUMNS: &str = "id, account_id, access_hash, access_lookup, refresh_hash, refresh_lookup, access_expires_at, created_at";

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // Account operations

    fn create_account(&self, account: &Account) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO accounts (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                account.id,
                account.email,
                account.password_hash,
                format_datetime(&account.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_account(&self, id: &str) -> Result<Option<Account>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, email, password_hash, created_at FROM accounts WHERE id = ?1",
            params![id],
            account_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, email, password_hash, created_at FROM accounts WHERE email = ?1",
            params![email],
            account_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    // Session operations

    fn create_session(&self, session: &SessionRecord) -> Result<()> {
        let result = self.conn().execute(
            &format!("INSERT INTO sessions ({SESSION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                session.id,
                session.account_id,
                session.access_hash,
                session.access_lookup,
                session.refresh_hash,
                session.refresh_lookup,
                format_datetime(&session.access_expires_at),
                format_datetime(&session.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::TokenLookupCollision),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_session_by_access_lookup(&self, lookup: &str) -> Result<Option<SessionRecord>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE access_lookup = ?1"),
            params![lookup],
            session_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_session_by_refresh_lookup(&self, lookup: &str) -> Result<Option<SessionRecord>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE refresh_lookup = ?1"),
            params![lookup],
            session_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn delete_session(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn delete_sessions_expired_before(&self, cutoff: &DateTime<Utc>) -> Result<u64> {
        let rows = self.conn().execute(
            "DELETE FROM sessions WHERE access_expires_at < ?1",
            params![format_datetime(cutoff)],
        )?;
        Ok(rows as u64)
    }

    // Profile operations

    fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO profiles (id, role, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET role = excluded.role, updated_at = excluded.updated_at",
            params![
                profile.id,
                profile.role,
                format_datetime(&profile.created_at),
                format_datetime(&profile.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            // The only foreign key is the owning account.
            Err(e) if is_constraint_violation(&e) => Err(Error::NotFound),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_profile(&self, id: &str) -> Result<Option<Profile>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, role, created_at, updated_at FROM profiles WHERE id = ?1",
            params![id],
            |row| {
                Ok(Profile {
                    id: row.get(0)?,
                    role: row.get(1)?,
                    created_at: parse_datetime(&row.get::<_, String>(2)?),
                    updated_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    // Row operations

    fn create_row(&self, row: &Row) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, name, email, user_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.id,
                row.name,
                row.email,
                row.user_id,
                format_datetime(&row.created_at),
                row.updated_at.as_ref().map(format_datetime),
            ],
        )?;
        Ok(())
    }

    fn list_rows(&self, scope: &RowScope) -> Result<Vec<Row>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, email, user_id, created_at, updated_at
             FROM users WHERE (?1 IS NULL OR user_id = ?1)
             ORDER BY created_at DESC, rowid DESC",
        )?;

        let rows = stmt.query_map(params![scope.owner()], row_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_row(&self, id: &str, changes: &RowChanges, scope: &RowScope) -> Result<u64> {
        let rows = self.conn().execute(
            "UPDATE users SET name = ?1, email = ?2, updated_at = ?3
             WHERE id = ?4 AND (?5 IS NULL OR user_id = ?5)",
            params![
                changes.name,
                changes.email,
                format_datetime(&changes.updated_at),
                id,
                scope.owner(),
            ],
        )?;
        Ok(rows as u64)
    }

    fn delete_row(&self, id: &str, scope: &RowScope) -> Result<u64> {
        let rows = self.conn().execute(
            "DELETE FROM users WHERE id = ?1 AND (?2 IS NULL OR user_id = ?2)",
            params![id, scope.owner()],
        )?;
        Ok(rows as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn open_store(temp: &TempDir) -> SqliteStore {
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        store
    }

    fn account(id: &str, email: &str) -> Account {
        Account {
            id: id.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
        }
    }

    fn row(id: &str, owner: &str, created_at: DateTime<Utc>) -> Row {
        Row {
            id: id.to_string(),
            name: format!("name-{id}"),
            email: format!("{id}@example.com"),
            user_id: owner.to_string(),
            created_at,
            updated_at: None,
        }
    }

    fn seed_two_owners(store: &SqliteStore) {
        store.create_account(&account("alice", "alice@example.com")).unwrap();
        store.create_account(&account("bob", "bob@example.com")).unwrap();

        let base = Utc::now();
        store.create_row(&row("r1", "alice", base)).unwrap();
        store
            .create_row(&row("r2", "bob", base + Duration::seconds(1)))
            .unwrap();
        store
            .create_row(&row("r3", "alice", base + Duration::seconds(2)))
            .unwrap();
    }

    #[test]
    fn test_initialize_creates_tables() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"accounts".to_string()));
        assert!(tables.contains(&"sessions".to_string()));
        assert!(tables.contains(&"profiles".to_string()));
        assert!(tables.contains(&"users".to_string()));
    }

    #[test]
    fn test_duplicate_email_is_rejected() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        store.create_account(&account("a1", "same@example.com")).unwrap();
        let result = store.create_account(&account("a2", "same@example.com"));
        assert!(matches!(result, Err(Error::AlreadyExists)));
    }

    #[test]
    fn test_list_rows_newest_first_and_scoped() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        seed_two_owners(&store);

        let all: Vec<String> = store
            .list_rows(&RowScope::All)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(all, vec!["r3", "r2", "r1"]);

        let alice: Vec<String> = store
            .list_rows(&RowScope::OwnedBy("alice".to_string()))
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(alice, vec!["r3", "r1"]);
    }

    #[test]
    fn test_scoped_mutations_skip_foreign_rows() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        seed_two_owners(&store);

        let bob = RowScope::OwnedBy("bob".to_string());
        let changes = RowChanges {
            name: "Mallory".to_string(),
            email: "mallory@example.com".to_string(),
            updated_at: Utc::now(),
        };

        assert_eq!(store.update_row("r1", &changes, &bob).unwrap(), 0);
        assert_eq!(store.delete_row("r1", &bob).unwrap(), 0);
        assert_eq!(store.list_rows(&RowScope::All).unwrap().len(), 3);

        assert_eq!(store.update_row("r1", &changes, &RowScope::All).unwrap(), 1);
        let updated = store
            .list_rows(&RowScope::OwnedBy("alice".to_string()))
            .unwrap()
            .into_iter()
            .find(|r| r.id == "r1")
            .unwrap();
        assert_eq!(updated.name, "Mallory");
        assert!(updated.updated_at.is_some());

        assert_eq!(store.delete_row("r1", &RowScope::All).unwrap(), 1);
        assert_eq!(store.list_rows(&RowScope::All).unwrap().len(), 2);
    }

    #[test]
    fn test_profile_upsert_replaces_role() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        store.create_account(&account("a1", "a1@example.com")).unwrap();

        let now = Utc::now();
        let mut profile = Profile {
            id: "a1".to_string(),
            role: "user".to_string(),
            created_at: now,
            updated_at: now,
        };
        store.upsert_profile(&profile).unwrap();

        profile.role = "admin".to_string();
        store.upsert_profile(&profile).unwrap();

        let fetched = store.get_profile("a1").unwrap().unwrap();
        assert_eq!(fetched.role, "admin");
        assert!(store.get_profile("missing").unwrap().is_none());
    }

    #[test]
    fn test_session_lookup_collision() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        store.create_account(&account("a1", "a1@example.com")).unwrap();

        let session = SessionRecord {
            id: "s1".to_string(),
            account_id: "a1".to_string(),
            access_hash: "h1".to_string(),
            access_lookup: "lookup01".to_string(),
            refresh_hash: "h2".to_string(),
            refresh_lookup: "lookup02".to_string(),
            access_expires_at: Utc::now(),
            created_at: Utc::now(),
        };
        store.create_session(&session).unwrap();

        let clash = SessionRecord {
            id: "s2".to_string(),
            refresh_lookup: "lookup03".to_string(),
            ..session.clone()
        };
        let result = store.create_session(&clash);
        assert!(matches!(result, Err(Error::TokenLookupCollision)));

        let found = store.get_session_by_refresh_lookup("lookup02").unwrap().unwrap();
        assert_eq!(found.id, "s1");
        assert!(store.delete_session("s1").unwrap());
        assert!(store.get_session_by_access_lookup("lookup01").unwrap().is_none());
    }

    #[test]
    fn test_delete_sessions_expired_before() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        store.create_account(&account("a1", "a1@example.com")).unwrap();

        let now = Utc::now();
        let session = |id: &str, expires: DateTime<Utc>| SessionRecord {
            id: id.to_string(),
            account_id: "a1".to_string(),
            access_hash: "h".to_string(),
            access_lookup: format!("{id}-access"),
            refresh_hash: "h".to_string(),
            refresh_lookup: format!("{id}-refresh"),
            access_expires_at: expires,
            created_at: now,
        };
        store.create_session(&session("old", now - Duration::days(500))).unwrap();
        store.create_session(&session("recent", now - Duration::hours(1))).unwrap();

        let removed = store
            .delete_sessions_expired_before(&(now - Duration::days(400)))
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_session_by_access_lookup("old-access").unwrap().is_none());
        assert!(store.get_session_by_access_lookup("recent-access").unwrap().is_some());
    }
}
