use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::{Redirect, Response};
use axum::{Router, routing::get, routing::post};

use super::pages::{auth, users};
use super::{LOGIN_PATH, LOGOUT_PATH, SIGNUP_PATH, USERS_PATH};
use crate::auth::{CookieBridge, SessionClient, SessionCookie};
use crate::config::ServerConfig;
use crate::error::Result;
use crate::provider::{self, Provider};

pub struct AppState {
    pub provider: Arc<dyn Provider>,
    pub session_cookie: SessionCookie,
}

impl AppState {
    #[must_use]
    pub fn new(provider: Arc<dyn Provider>, session_cookie: SessionCookie) -> Self {
        Self {
            provider,
            session_cookie,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        config.validate()?;
        let provider = provider::from_config(config)?;
        Ok(Self::new(
            provider,
            SessionCookie {
                name: config.session_cookie_name(),
                secure: config.secure_cookies,
            },
        ))
    }

    /// Session client for one request. Never cached: it holds that request's
    /// cookies.
    #[must_use]
    pub fn session_client(&self, headers: &HeaderMap) -> (SessionClient, Arc<CookieBridge>) {
        SessionClient::from_request(Arc::clone(&self.provider), &self.session_cookie, headers)
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn index() -> Redirect {
    Redirect::to(USERS_PATH)
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route(LOGIN_PATH, get(auth::login_form).post(auth::login))
        .route(SIGNUP_PATH, get(auth::signup_form).post(auth::signup))
        .route(LOGOUT_PATH, post(auth::logout))
        .route(USERS_PATH, get(users::load).post(users::act))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
