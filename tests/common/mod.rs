//! In-process harness: the router backed by a local provider in a temp dir,
//! driven with `tower::ServiceExt::oneshot`, plus a small cookie jar that
//! plays the browser.

#![allow(dead_code)]

use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use chrono::Utc;
use cookie::Cookie;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use roster::auth::SessionCookie;
use roster::provider::LocalProvider;
use roster::server::{AppState, create_router};
use roster::store::{SqliteStore, Store};
use roster::types::{Profile, Role};

pub const COOKIE_NAME: &str = "sb-test-auth-token";
pub const PASSWORD: &str = "correct horse battery";

/// Any router, driven request by request.
pub struct RouterApp {
    router: Router,
}

/// The router over a local provider, with direct access to its store.
pub struct TestApp {
    pub temp_dir: TempDir,
    pub store: Arc<SqliteStore>,
    app: RouterApp,
}

impl Deref for TestApp {
    type Target = RouterApp;

    fn deref(&self) -> &RouterApp {
        &self.app
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    pub fn set_cookies(&self) -> Vec<Cookie<'static>> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| Cookie::parse_encoded(v.to_string()).ok())
            .collect()
    }

    pub fn set_cookie(&self, name: &str) -> Option<Cookie<'static>> {
        self.set_cookies().into_iter().rev().find(|c| c.name() == name)
    }

    pub fn assert_redirect(&self, to: &str) {
        assert_eq!(self.status, StatusCode::SEE_OTHER, "body: {}", self.body);
        assert_eq!(self.location(), Some(to));
    }
}

/// Browser-side cookie storage for one user agent.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: Vec<(String, String)>,
}

impl CookieJar {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.cookies.retain(|(n, _)| n != name);
        self.cookies.push((name.to_string(), value.to_string()));
    }

    /// Applies `Set-Cookie` headers in order; `Max-Age=0` deletes.
    pub fn absorb(&mut self, response: &TestResponse) {
        for cookie in response.set_cookies() {
            let expired = cookie
                .max_age()
                .is_some_and(|age| age.whole_seconds() <= 0);
            if expired {
                self.cookies.retain(|(n, _)| n != cookie.name());
            } else {
                self.insert(cookie.name(), cookie.value());
            }
        }
    }

    fn header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(n, v)| Cookie::new(n.as_str(), v.as_str()).encoded().to_string())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

impl RouterApp {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("read body")
            .to_bytes();

        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    pub async fn get(&self, path: &str, jar: &mut CookieJar) -> TestResponse {
        let mut builder = Request::builder().method("GET").uri(path);
        if let Some(cookie) = jar.header() {
            builder = builder.header(header::COOKIE, cookie);
        }
        let response = self
            .send(builder.body(Body::empty()).expect("build request"))
            .await;
        jar.absorb(&response);
        response
    }

    pub async fn post_form(
        &self,
        path: &str,
        form: &[(&str, &str)],
        jar: &mut CookieJar,
    ) -> TestResponse {
        let body = form
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = jar.header() {
            builder = builder.header(header::COOKIE, cookie);
        }
        let response = self
            .send(builder.body(Body::from(body)).expect("build request"))
            .await;
        jar.absorb(&response);
        response
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_access_ttl(chrono::Duration::hours(1))
    }

    pub fn with_access_ttl(ttl: chrono::Duration) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let store = Arc::new(SqliteStore::new(temp_dir.path().join("roster.db")).expect("open store"));
        store.initialize().expect("initialize store");

        let provider = LocalProvider::new(Arc::clone(&store) as Arc<dyn Store>, ttl);
        let state = Arc::new(AppState::new(
            Arc::new(provider),
            SessionCookie {
                name: COOKIE_NAME.to_string(),
                secure: false,
            },
        ));

        Self {
            temp_dir,
            store,
            app: RouterApp::new(create_router(state)),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.temp_dir.path().join("roster.db")
    }

    /// Runs raw SQL for breaking the schema on purpose.
    pub fn exec_sql(&self, sql: &str) {
        self.store
            .connection()
            .execute_batch(sql)
            .expect("execute sql");
    }

    /// Signs up through the form and returns the signed-in jar.
    pub async fn sign_up(&self, email: &str) -> CookieJar {
        let mut jar = CookieJar::default();
        let response = self
            .post_form("/signup", &[("email", email), ("password", PASSWORD)], &mut jar)
            .await;
        response.assert_redirect("/users");
        assert!(jar.get(COOKIE_NAME).is_some(), "session cookie missing");
        jar
    }

    pub fn set_role(&self, email: &str, role: Role) {
        let account = self
            .store
            .get_account_by_email(email)
            .expect("lookup account")
            .expect("account exists");
        let now = Utc::now();
        self.store
            .upsert_profile(&Profile {
                id: account.id,
                role: role.as_str().to_string(),
                created_at: now,
                updated_at: now,
            })
            .expect("upsert profile");
    }

    pub async fn add_row(&self, jar: &mut CookieJar, name: &str, email: &str) -> TestResponse {
        self.post_form(
            "/users",
            &[("intent", "add"), ("name", name), ("email", email)],
            jar,
        )
        .await
    }

    /// Ids of all stored rows named `name`, read straight from the store.
    pub fn row_ids(&self, name: &str) -> Vec<String> {
        self.store
            .list_rows(&roster::types::RowScope::All)
            .expect("list rows")
            .into_iter()
            .filter(|r| r.name == name)
            .map(|r| r.id)
            .collect()
    }
}
