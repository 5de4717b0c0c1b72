//! Per-request session client.
//!
//! A [`SessionClient`] pairs the shared [`Provider`] with one request's
//! [`CookieBridge`]. The session itself lives in a cookie: JSON, base64url
//! encoded behind a `base64-` prefix, split into `<name>.0`, `<name>.1`, ...
//! when it outgrows a single cookie.

use std::sync::{Arc, Mutex};

use axum::http::HeaderMap;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};

use super::cookies::{CookieBridge, CookieOptions, RequestCookie};
use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::types::{Identity, NewRow, Row, RowChanges, RowScope, Session, SignUp};

pub const CHUNK_SIZE: usize = 3180;
const BASE64_PREFIX: &str = "base64-";
pub const SESSION_MAX_AGE_SECS: i64 = 400 * 24 * 60 * 60;

/// How close to expiry an access token may get before it is refreshed.
pub const REFRESH_LEEWAY_SECS: i64 = 10;

/// Name and attributes of the session cookie.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    pub name: String,
    pub secure: bool,
}

impl SessionCookie {
    fn options(&self) -> CookieOptions {
        CookieOptions {
            max_age: Some(SESSION_MAX_AGE_SECS),
            http_only: Some(true),
            secure: Some(self.secure),
            ..CookieOptions::default()
        }
    }

    fn removal_options(&self) -> CookieOptions {
        CookieOptions {
            http_only: Some(true),
            secure: Some(self.secure),
            ..CookieOptions::expired()
        }
    }
}

pub struct SessionClient {
    provider: Arc<dyn Provider>,
    cookie: SessionCookie,
    cookies: Arc<CookieBridge>,
    /// Session as resolved for this request. `None` until first read.
    resolved: Mutex<Option<Option<Session>>>,
}

impl SessionClient {
    /// Builds a client bound to this request's cookies. Returns the client and
    /// a handle for collecting the `Set-Cookie` values it produces.
    pub fn from_request(
        provider: Arc<dyn Provider>,
        cookie: &SessionCookie,
        headers: &HeaderMap,
    ) -> (Self, Arc<CookieBridge>) {
        let cookies = Arc::new(CookieBridge::from_headers(headers));
        let client = Self {
            provider,
            cookie: cookie.clone(),
            cookies: Arc::clone(&cookies),
            resolved: Mutex::new(None),
        };
        (client, cookies)
    }

    fn resolved(&self) -> std::sync::MutexGuard<'_, Option<Option<Session>>> {
        self.resolved.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current session from cookies, refreshed when the access token is at or
    /// near expiry. A rejected refresh clears the session cookie. Resolved at
    /// most once per request; later calls reuse the result.
    pub async fn get_session(&self) -> Result<Option<Session>> {
        let cached = self.resolved().clone();
        if let Some(session) = cached {
            return Ok(session);
        }

        let session = self.load_session().await?;
        *self.resolved() = Some(session.clone());
        Ok(session)
    }

    async fn load_session(&self) -> Result<Option<Session>> {
        let Some(raw) = read_chunked(&self.cookies.get_all(), &self.cookie.name) else {
            return Ok(None);
        };

        let session = match decode_session(&raw) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Discarding unreadable session cookie: {e}");
                self.clear_session();
                return Ok(None);
            }
        };

        if !session.expires_within(Utc::now(), Duration::seconds(REFRESH_LEEWAY_SECS)) {
            return Ok(Some(session));
        }

        match self.provider.refresh_session(&session.refresh_token).await {
            Ok(fresh) => {
                tracing::debug!("Refreshed session for {}", fresh.user.id);
                self.store_session(&fresh)?;
                Ok(Some(fresh))
            }
            Err(Error::Auth(message)) => {
                tracing::info!("Session refresh rejected: {message}");
                self.clear_session();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Verifies the session with the provider and returns its identity.
    pub async fn get_user(&self) -> Result<Option<Identity>> {
        let Some(session) = self.get_session().await? else {
            return Ok(None);
        };

        match self.provider.get_user(&session.access_token).await? {
            Some(identity) => Ok(Some(identity)),
            None => {
                self.clear_session();
                Ok(None)
            }
        }
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Identity> {
        let session = self.provider.sign_in_with_password(email, password).await?;
        self.store_session(&session)?;
        Ok(session.user)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUp> {
        let outcome = self.provider.sign_up(email, password).await?;
        if let SignUp::SignedIn(session) = &outcome {
            self.store_session(session)?;
        }
        Ok(outcome)
    }

    /// Revokes the session with the provider (best effort) and always clears
    /// the session cookie.
    pub async fn sign_out(&self) -> Result<()> {
        let session = read_chunked(&self.cookies.get_all(), &self.cookie.name)
            .and_then(|raw| decode_session(&raw).ok());

        if let Some(session) = session {
            if let Err(e) = self.provider.sign_out(&session.access_token).await {
                tracing::warn!("Provider sign-out failed: {e}");
            }
        }

        self.clear_session();
        Ok(())
    }

    async fn access_token(&self) -> Result<String> {
        self.get_session()
            .await?
            .map(|s| s.access_token)
            .ok_or(Error::Unauthorized)
    }

    pub async fn profile_role(&self, identity_id: &str) -> Result<Option<String>> {
        let token = self.access_token().await?;
        self.provider.get_profile_role(&token, identity_id).await
    }

    pub async fn list_rows(&self, scope: &RowScope) -> Result<Vec<Row>> {
        let token = self.access_token().await?;
        let mut rows = self.provider.list_rows(&token, scope).await?;
        rows.retain(|row| scope.permits(row));
        Ok(rows)
    }

    pub async fn insert_row(&self, row: &NewRow) -> Result<Row> {
        let token = self.access_token().await?;
        self.provider.insert_row(&token, row).await
    }

    pub async fn update_row(&self, id: &str, changes: &RowChanges, scope: &RowScope) -> Result<u64> {
        let token = self.access_token().await?;
        self.provider.update_row(&token, id, changes, scope).await
    }

    pub async fn delete_row(&self, id: &str, scope: &RowScope) -> Result<u64> {
        let token = self.access_token().await?;
        self.provider.delete_row(&token, id, scope).await
    }

    fn store_session(&self, session: &Session) -> Result<()> {
        let encoded = encode_session(session)?;
        let chunks = chunk_value(&self.cookie.name, &encoded);
        let existing = self.cookies.get_all();

        for stale in session_cookie_names(&existing, &self.cookie.name) {
            if !chunks.iter().any(|(name, _)| *name == stale) {
                self.cookies.set(&stale, "", self.cookie.removal_options());
            }
        }

        let options = self.cookie.options();
        for (name, value) in chunks {
            self.cookies.set(&name, &value, options.clone());
        }
        *self.resolved() = Some(Some(session.clone()));
        Ok(())
    }

    fn clear_session(&self) {
        let options = self.cookie.removal_options();
        for name in session_cookie_names(&self.cookies.get_all(), &self.cookie.name) {
            self.cookies.set(&name, "", options.clone());
        }
        *self.resolved() = Some(None);
    }
}

pub fn encode_session(session: &Session) -> Result<String> {
    let json = serde_json::to_vec(session)
        .map_err(|e| Error::InvalidSession(format!("failed to encode session: {e}")))?;
    Ok(format!("{BASE64_PREFIX}{}", URL_SAFE_NO_PAD.encode(json)))
}

/// Accepts the `base64-` form and plain JSON.
pub fn decode_session(value: &str) -> Result<Session> {
    let json = match value.strip_prefix(BASE64_PREFIX) {
        Some(encoded) => URL_SAFE_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .map_err(|e| Error::InvalidSession(format!("bad base64: {e}")))?,
        None => value.as_bytes().to_vec(),
    };

    serde_json::from_slice(&json).map_err(|e| Error::InvalidSession(format!("bad session json: {e}")))
}

/// Splits a cookie value into `(name, value)` pairs of at most
/// [`CHUNK_SIZE`] bytes. Short values keep the bare name.
fn chunk_value(name: &str, value: &str) -> Vec<(String, String)> {
    if value.len() <= CHUNK_SIZE {
        return vec![(name.to_string(), value.to_string())];
    }

    // Encoded sessions are ASCII, so byte slicing stays on char boundaries.
    value
        .as_bytes()
        .chunks(CHUNK_SIZE)
        .enumerate()
        .map(|(i, chunk)| (format!("{name}.{i}"), String::from_utf8_lossy(chunk).into_owned()))
        .collect()
}

/// Reads a possibly chunked cookie. The bare name takes precedence; chunks
/// are joined from `.0` upward until the first gap.
fn read_chunked(cookies: &[RequestCookie], name: &str) -> Option<String> {
    if let Some(c) = cookies.iter().find(|c| c.name == name) {
        return Some(c.value.clone());
    }

    let mut value = String::new();
    for i in 0.. {
        let chunk_name = format!("{name}.{i}");
        match cookies.iter().find(|c| c.name == chunk_name) {
            Some(c) => value.push_str(&c.value),
            None if i == 0 => return None,
            None => break,
        }
    }
    Some(value)
}

fn session_cookie_names(cookies: &[RequestCookie], name: &str) -> Vec<String> {
    cookies
        .iter()
        .filter(|c| {
            c.name == name
                || c.name
                    .strip_prefix(name)
                    .and_then(|rest| rest.strip_prefix('.'))
                    .is_some_and(|idx| !idx.is_empty() && idx.chars().all(|ch| ch.is_ascii_digit()))
        })
        .map(|c| c.name.clone())
        .collect()
}
