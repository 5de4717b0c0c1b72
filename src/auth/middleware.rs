use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};

use super::cookies::{CookieBridge, append_set_cookie_headers};
use super::role::resolve_role;
use super::session::SessionClient;
use crate::server::{AppState, LOGIN_PATH};
use crate::types::{Identity, Role, RowScope};

/// A session client built fresh for this request, authenticated or not.
pub struct RequestSession {
    pub client: SessionClient,
    pub cookies: Arc<CookieBridge>,
}

/// Extractor that requires a signed-in identity and resolves its role.
pub struct RequireIdentity {
    pub client: SessionClient,
    pub cookies: Arc<CookieBridge>,
    pub identity: Identity,
    pub role: Role,
}

impl RequireIdentity {
    #[must_use]
    pub fn scope(&self) -> RowScope {
        RowScope::for_role(self.role, &self.identity.id)
    }
}

#[derive(Debug)]
pub enum AuthRejection {
    /// No usable session. Carries any cookie writes made while finding that
    /// out (e.g. clearing a stale session).
    LoginRequired { set_cookies: Vec<String> },
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            AuthRejection::LoginRequired { set_cookies } => {
                let mut response = Redirect::to(LOGIN_PATH).into_response();
                append_set_cookie_headers(response.headers_mut(), &set_cookies);
                response
            }
        }
    }
}

impl FromRequestParts<Arc<AppState>> for RequestSession {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let (client, cookies) = state.session_client(&parts.headers);
        Ok(RequestSession { client, cookies })
    }
}

impl FromRequestParts<Arc<AppState>> for RequireIdentity {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let (client, cookies) = state.session_client(&parts.headers);

        let identity = match client.get_user().await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                return Err(AuthRejection::LoginRequired {
                    set_cookies: cookies.set_cookie_headers(),
                });
            }
            Err(e) => {
                tracing::warn!("Could not verify session, treating as signed out: {e}");
                return Err(AuthRejection::LoginRequired {
                    set_cookies: cookies.set_cookie_headers(),
                });
            }
        };

        let role = resolve_role(&client, &identity.id).await;

        Ok(RequireIdentity {
            client,
            cookies,
            identity,
            role,
        })
    }
}
