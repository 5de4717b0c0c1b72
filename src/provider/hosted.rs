use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::Provider;
use crate::error::{Error, Result};
use crate::types::*;

const PROFILES_TABLE: &str = "profiles";
const ROWS_TABLE: &str = "users";

/// Provider speaking the Supabase REST dialect: GoTrue under `/auth/v1` and
/// PostgREST under `/rest/v1`.
#[derive(Clone)]
pub struct HostedProvider {
    client: Client,
    base_url: String,
    anon_key: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileRoleResponse {
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self, status: StatusCode) -> String {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
            .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()))
    }
}

impl From<UserResponse> for Identity {
    fn from(user: UserResponse) -> Self {
        Identity {
            id: user.id,
            email: user.email,
        }
    }
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self.expires_at.unwrap_or_else(|| {
            chrono::Utc::now().timestamp() + self.expires_in.unwrap_or(3600)
        });
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type.unwrap_or_else(|| "bearer".to_string()),
            expires_at,
            user: self.user.into(),
        }
    }
}

impl HostedProvider {
    pub fn new(base_url: &str, anon_key: &str, timeout: Duration) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(Error::Config("provider url cannot be empty".into()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        })
    }

    #[must_use]
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("apikey", &self.anon_key)
    }

    fn auth(&self, method: Method, path: &str) -> RequestBuilder {
        self.request(method, &format!("/auth/v1{path}"))
    }

    /// PostgREST request authorised as the access token's identity.
    fn table(&self, method: Method, table: &str, access_token: &str) -> RequestBuilder {
        self.request(method, &format!("/rest/v1/{table}"))
            .bearer_auth(access_token)
    }

    async fn read_error(resp: Response) -> (StatusCode, String) {
        let status = resp.status();
        let body: ErrorBody = resp.json().await.unwrap_or_default();
        (status, body.into_message(status))
    }

    /// Auth endpoint failures: client errors are credential problems whose
    /// message is shown to the user.
    async fn auth_error(resp: Response) -> Error {
        let (status, message) = Self::read_error(resp).await;
        if status.is_client_error() {
            Error::Auth(message)
        } else {
            Error::Provider {
                status: status.as_u16(),
                message,
            }
        }
    }

    async fn api_error(resp: Response) -> Error {
        let (status, message) = Self::read_error(resp).await;
        Error::Provider {
            status: status.as_u16(),
            message,
        }
    }

    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<Session> {
        let resp = self
            .auth(Method::POST, "/token")
            .query(&[("grant_type", grant_type)])
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::auth_error(resp).await);
        }

        let token: TokenResponse = resp.json().await?;
        Ok(token.into_session())
    }

    fn scope_filters(id: &str, scope: &RowScope) -> Vec<(&'static str, String)> {
        let mut filters = vec![("id", format!("eq.{id}"))];
        if let Some(owner) = scope.owner() {
            filters.push(("user_id", format!("eq.{owner}")));
        }
        filters
    }

    async fn affected(resp: Response) -> Result<u64> {
        if !resp.status().is_success() {
            return Err(Self::api_error(resp).await);
        }
        let rows: Vec<Value> = resp.json().await?;
        Ok(rows.len() as u64)
    }
}

#[async_trait]
impl Provider for HostedProvider {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        self.token_grant(
            "password",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUp> {
        let resp = self
            .auth(Method::POST, "/signup")
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::auth_error(resp).await);
        }

        // With email confirmation enabled the provider answers with a bare
        // user object and no tokens.
        let body: Value = resp.json().await?;
        if body.get("access_token").is_some_and(|t| !t.is_null()) {
            let token: TokenResponse = serde_json::from_value(body).map_err(|e| Error::Provider {
                status: 200,
                message: format!("unexpected sign-up response: {e}"),
            })?;
            Ok(SignUp::SignedIn(token.into_session()))
        } else {
            Ok(SignUp::ConfirmationRequired)
        }
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<Identity>> {
        let resp = self
            .auth(Method::GET, "/user")
            .bearer_auth(access_token)
            .send()
            .await?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            s if s.is_success() => {
                let user: UserResponse = resp.json().await?;
                Ok(Some(user.into()))
            }
            _ => Err(Self::api_error(resp).await),
        }
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session> {
        self.token_grant(
            "refresh_token",
            serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let resp = self
            .auth(Method::POST, "/logout")
            .bearer_auth(access_token)
            .send()
            .await?;

        // An already-invalid token is as signed out as it gets.
        if resp.status().is_success() || resp.status().is_client_error() {
            Ok(())
        } else {
            Err(Self::api_error(resp).await)
        }
    }

    async fn get_profile_role(
        &self,
        access_token: &str,
        identity_id: &str,
    ) -> Result<Option<String>> {
        let resp = self
            .table(Method::GET, PROFILES_TABLE, access_token)
            .query(&[("select", "role".to_string()), ("id", format!("eq.{identity_id}"))])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::api_error(resp).await);
        }

        let profiles: Vec<ProfileRoleResponse> = resp.json().await?;
        if profiles.len() > 1 {
            return Err(Error::Provider {
                status: 406,
                message: "multiple profiles for one identity".into(),
            });
        }
        Ok(profiles.into_iter().next().and_then(|p| p.role))
    }

    async fn list_rows(&self, access_token: &str, scope: &RowScope) -> Result<Vec<Row>> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        if let Some(owner) = scope.owner() {
            query.push(("user_id", format!("eq.{owner}")));
        }

        let resp = self
            .table(Method::GET, ROWS_TABLE, access_token)
            .query(&query)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::api_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn insert_row(&self, access_token: &str, row: &NewRow) -> Result<Row> {
        let resp = self
            .table(Method::POST, ROWS_TABLE, access_token)
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::api_error(resp).await);
        }

        let rows: Vec<Row> = resp.json().await?;
        rows.into_iter().next().ok_or_else(|| Error::Provider {
            status: 200,
            message: "insert returned no row".into(),
        })
    }

    async fn update_row(
        &self,
        access_token: &str,
        id: &str,
        changes: &RowChanges,
        scope: &RowScope,
    ) -> Result<u64> {
        let resp = self
            .table(Method::PATCH, ROWS_TABLE, access_token)
            .query(&Self::scope_filters(id, scope))
            .header("Prefer", "return=representation")
            .json(changes)
            .send()
            .await?;
        Self::affected(resp).await
    }

    async fn delete_row(&self, access_token: &str, id: &str, scope: &RowScope) -> Result<u64> {
        let resp = self
            .table(Method::DELETE, ROWS_TABLE, access_token)
            .query(&Self::scope_filters(id, scope))
            .header("Prefer", "return=representation")
            .send()
            .await?;
        Self::affected(resp).await
    }
}
