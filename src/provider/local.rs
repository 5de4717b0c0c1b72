use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use super::Provider;
use crate::auth::session::SESSION_MAX_AGE_SECS;
use crate::auth::{TokenGenerator, hash_password, parse_token, verify_password};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::*;

const INVALID_CREDENTIALS: &str = "Invalid login credentials";
const ALREADY_REGISTERED: &str = "User already registered";
const INVALID_EMAIL: &str = "Unable to validate email address: invalid format";
const WEAK_PASSWORD: &str = "Password should be at least 6 characters.";
const INVALID_REFRESH: &str = "Invalid Refresh Token: Refresh Token Not Found";
const MIN_PASSWORD_LEN: usize = 6;
const MAX_RETRIES: u32 = 3;

/// Provider backed by the local SQLite store. Sessions are opaque token pairs
/// whose access half expires after `access_ttl`; refreshing rotates both.
pub struct LocalProvider {
    store: Arc<dyn Store>,
    tokens: TokenGenerator,
    access_ttl: Duration,
}

impl LocalProvider {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, access_ttl: Duration) -> Self {
        Self {
            store,
            tokens: TokenGenerator::new(),
            access_ttl,
        }
    }

    /// Drops sessions whose cookie can no longer exist in any browser.
    fn sweep_sessions(&self) {
        let cutoff = Utc::now() - Duration::seconds(SESSION_MAX_AGE_SECS);
        match self.store.delete_sessions_expired_before(&cutoff) {
            Ok(0) => {}
            Ok(n) => tracing::debug!("Swept {n} abandoned sessions"),
            Err(e) => tracing::warn!("Session sweep failed: {e}"),
        }
    }

    fn issue_session(&self, account: &Account) -> Result<Session> {
        self.sweep_sessions();

        for _ in 0..MAX_RETRIES {
            let access = self.tokens.generate()?;
            let refresh = self.tokens.generate()?;
            let now = Utc::now();

            let record = SessionRecord {
                id: Uuid::new_v4().to_string(),
                account_id: account.id.clone(),
                access_hash: access.hash,
                access_lookup: access.lookup,
                refresh_hash: refresh.hash,
                refresh_lookup: refresh.lookup,
                access_expires_at: now + self.access_ttl,
                created_at: now,
            };

            match self.store.create_session(&record) {
                Ok(()) => {
                    return Ok(Session {
                        access_token: access.raw,
                        refresh_token: refresh.raw,
                        token_type: "bearer".to_string(),
                        expires_at: record.access_expires_at.timestamp(),
                        user: account.identity(),
                    });
                }
                Err(Error::TokenLookupCollision) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(Error::TokenLookupCollision)
    }

    /// Account behind an unexpired access token, if any.
    fn authenticate(&self, access_token: &str) -> Result<Option<Account>> {
        let Ok((lookup, _secret)) = parse_token(access_token) else {
            return Ok(None);
        };

        let Some(session) = self.store.get_session_by_access_lookup(&lookup)? else {
            return Ok(None);
        };

        if !self.tokens.verify(access_token, &session.access_hash)? {
            return Ok(None);
        }

        if session.access_expires_at <= Utc::now() {
            return Ok(None);
        }

        self.store.get_account(&session.account_id)
    }

    fn require_account(&self, access_token: &str) -> Result<Account> {
        self.authenticate(access_token)?.ok_or(Error::Unauthorized)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl Provider for LocalProvider {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let account = self
            .store
            .get_account_by_email(&normalize_email(email))?
            .ok_or_else(|| Error::Auth(INVALID_CREDENTIALS.into()))?;

        if !verify_password(password, &account.password_hash)? {
            return Err(Error::Auth(INVALID_CREDENTIALS.into()));
        }

        self.issue_session(&account)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUp> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(Error::Auth(INVALID_EMAIL.into()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::Auth(WEAK_PASSWORD.into()));
        }

        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4().to_string(),
            email,
            password_hash: hash_password(password)?,
            created_at: now,
        };

        match self.store.create_account(&account) {
            Ok(()) => {}
            Err(Error::AlreadyExists) => return Err(Error::Auth(ALREADY_REGISTERED.into())),
            Err(e) => return Err(e),
        }

        self.store.upsert_profile(&Profile {
            id: account.id.clone(),
            role: Role::User.as_str().to_string(),
            created_at: now,
            updated_at: now,
        })?;

        tracing::info!("Registered account {}", account.id);

        Ok(SignUp::SignedIn(self.issue_session(&account)?))
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<Identity>> {
        Ok(self.authenticate(access_token)?.map(|a| a.identity()))
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session> {
        let invalid = || Error::Auth(INVALID_REFRESH.into());

        let (lookup, _secret) = parse_token(refresh_token).map_err(|_| invalid())?;
        let session = self
            .store
            .get_session_by_refresh_lookup(&lookup)?
            .ok_or_else(invalid)?;

        if !self.tokens.verify(refresh_token, &session.refresh_hash)? {
            return Err(invalid());
        }

        let account = self.store.get_account(&session.account_id)?.ok_or_else(invalid)?;

        // Rotation: a refresh token is good for exactly one refresh.
        if !self.store.delete_session(&session.id)? {
            return Err(invalid());
        }

        self.issue_session(&account)
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let Ok((lookup, _secret)) = parse_token(access_token) else {
            return Ok(());
        };

        if let Some(session) = self.store.get_session_by_access_lookup(&lookup)? {
            if self.tokens.verify(access_token, &session.access_hash)? {
                self.store.delete_session(&session.id)?;
            }
        }
        Ok(())
    }

    async fn get_profile_role(
        &self,
        access_token: &str,
        identity_id: &str,
    ) -> Result<Option<String>> {
        self.require_account(access_token)?;
        Ok(self.store.get_profile(identity_id)?.map(|p| p.role))
    }

    async fn list_rows(&self, access_token: &str, scope: &RowScope) -> Result<Vec<Row>> {
        self.require_account(access_token)?;
        self.store.list_rows(scope)
    }

    async fn insert_row(&self, access_token: &str, row: &NewRow) -> Result<Row> {
        let account = self.require_account(access_token)?;
        if row.user_id != account.id {
            return Err(Error::Provider {
                status: 403,
                message: "rows can only be created for the signed-in identity".into(),
            });
        }

        let row = Row {
            id: Uuid::new_v4().to_string(),
            name: row.name.clone(),
            email: row.email.clone(),
            user_id: row.user_id.clone(),
            created_at: Utc::now(),
            updated_at: None,
        };
        self.store.create_row(&row)?;
        Ok(row)
    }

    async fn update_row(
        &self,
        access_token: &str,
        id: &str,
        changes: &RowChanges,
        scope: &RowScope,
    ) -> Result<u64> {
        self.require_account(access_token)?;
        self.store.update_row(id, changes, scope)
    }

    async fn delete_row(&self, access_token: &str, id: &str, scope: &RowScope) -> Result<u64> {
        self.require_account(access_token)?;
        self.store.delete_row(id, scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use tempfile::TempDir;

    fn provider(temp: &TempDir, ttl: Duration) -> LocalProvider {
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        LocalProvider::new(Arc::new(store), ttl)
    }

    async fn signed_up(provider: &LocalProvider, email: &str) -> Session {
        match provider.sign_up(email, "password123").await.unwrap() {
            SignUp::SignedIn(session) => session,
            SignUp::ConfirmationRequired => panic!("local sign-up never defers"),
        }
    }

    #[tokio::test]
    async fn test_sign_up_creates_user_profile() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp, Duration::hours(1));

        let session = signed_up(&provider, " Jane@Example.com ").await;
        assert_eq!(session.user.email.as_deref(), Some("jane@example.com"));

        let role = provider
            .get_profile_role(&session.access_token, &session.user.id)
            .await
            .unwrap();
        assert_eq!(role.as_deref(), Some("user"));
    }

    #[tokio::test]
    async fn test_sign_up_rejects_duplicates_and_weak_passwords() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp, Duration::hours(1));
        signed_up(&provider, "jane@example.com").await;

        let dup = provider.sign_up("jane@example.com", "password123").await;
        assert!(matches!(dup, Err(Error::Auth(msg)) if msg == ALREADY_REGISTERED));

        let weak = provider.sign_up("joe@example.com", "123").await;
        assert!(matches!(weak, Err(Error::Auth(msg)) if msg == WEAK_PASSWORD));
    }

    #[tokio::test]
    async fn test_sign_in_checks_password() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp, Duration::hours(1));
        signed_up(&provider, "jane@example.com").await;

        let session = provider
            .sign_in_with_password("jane@example.com", "password123")
            .await
            .unwrap();
        assert!(provider.get_user(&session.access_token).await.unwrap().is_some());

        let wrong = provider
            .sign_in_with_password("jane@example.com", "nope")
            .await;
        assert!(matches!(wrong, Err(Error::Auth(msg)) if msg == INVALID_CREDENTIALS));

        let unknown = provider
            .sign_in_with_password("who@example.com", "password123")
            .await;
        assert!(matches!(unknown, Err(Error::Auth(msg)) if msg == INVALID_CREDENTIALS));
    }

    #[tokio::test]
    async fn test_expired_access_token_is_not_accepted() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp, Duration::seconds(-1));
        let session = signed_up(&provider, "jane@example.com").await;

        assert!(provider.get_user(&session.access_token).await.unwrap().is_none());
        let rows = provider.list_rows(&session.access_token, &RowScope::All).await;
        assert!(matches!(rows, Err(Error::Unauthorized)));
    }

    #[tokio::test]
    async fn test_refresh_rotates_tokens() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp, Duration::hours(1));
        let first = signed_up(&provider, "jane@example.com").await;

        let second = provider.refresh_session(&first.refresh_token).await.unwrap();
        assert_ne!(second.access_token, first.access_token);
        assert_eq!(second.user, first.user);

        assert!(provider.get_user(&first.access_token).await.unwrap().is_none());
        assert!(provider.get_user(&second.access_token).await.unwrap().is_some());

        let reused = provider.refresh_session(&first.refresh_token).await;
        assert!(matches!(reused, Err(Error::Auth(_))));
    }

    #[tokio::test]
    async fn test_sign_out_revokes_session() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp, Duration::hours(1));
        let session = signed_up(&provider, "jane@example.com").await;

        provider.sign_out(&session.access_token).await.unwrap();
        assert!(provider.get_user(&session.access_token).await.unwrap().is_none());
        provider.sign_out("garbage").await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_is_bound_to_token_owner() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp, Duration::hours(1));
        let jane = signed_up(&provider, "jane@example.com").await;
        let joe = signed_up(&provider, "joe@example.com").await;

        let own = NewRow {
            name: "Jane".into(),
            email: "jane@x.com".into(),
            user_id: jane.user.id.clone(),
        };
        let row = provider.insert_row(&jane.access_token, &own).await.unwrap();
        assert_eq!(row.user_id, jane.user.id);

        let forged = NewRow {
            user_id: jane.user.id.clone(),
            ..own
        };
        let result = provider.insert_row(&joe.access_token, &forged).await;
        assert!(matches!(result, Err(Error::Provider { status: 403, .. })));
    }

    #[tokio::test]
    async fn test_issuing_sweeps_abandoned_sessions() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::new(temp.path().join("test.db")).unwrap());
        store.initialize().unwrap();
        let provider = LocalProvider::new(Arc::clone(&store) as Arc<dyn Store>, Duration::hours(1));

        let jane = signed_up(&provider, "jane@example.com").await;
        let long_ago = Utc::now() - Duration::seconds(SESSION_MAX_AGE_SECS) - Duration::days(1);
        store
            .create_session(&SessionRecord {
                id: "abandoned".into(),
                account_id: jane.user.id.clone(),
                access_hash: "h".into(),
                access_lookup: "abandonedacc".into(),
                refresh_hash: "h".into(),
                refresh_lookup: "abandonedref".into(),
                access_expires_at: long_ago,
                created_at: long_ago,
            })
            .unwrap();

        provider
            .sign_in_with_password("jane@example.com", "password123")
            .await
            .unwrap();

        assert!(store.get_session_by_refresh_lookup("abandonedref").unwrap().is_none());
        assert!(provider.get_user(&jane.access_token).await.unwrap().is_some());
    }
}
