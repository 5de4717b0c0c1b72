//! Request-scoped cookie bridge.
//!
//! Reads the incoming `Cookie` header once, collects cookie writes made while
//! the request is handled (session refresh, sign-in, flash messages) and turns
//! them into `Set-Cookie` header values for the response. One bridge lives for
//! exactly one request.

use std::sync::Mutex;

use axum::http::{HeaderMap, HeaderValue, header};
use cookie::time::OffsetDateTime;
use cookie::{Cookie, SameSite};

pub const DEFAULT_PATH: &str = "/";
pub const DEFAULT_SAME_SITE: SameSite = SameSite::Lax;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestCookie {
    pub name: String,
    pub value: String,
}

/// Per-cookie attributes. `None` falls back to the bridge defaults
/// (`Path=/`, `SameSite=Lax`) or leaves the attribute out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: Option<String>,
    pub domain: Option<String>,
    /// Seconds. Zero or less expires the cookie immediately.
    pub max_age: Option<i64>,
    pub expires: Option<OffsetDateTime>,
    pub http_only: Option<bool>,
    pub secure: Option<bool>,
    pub same_site: Option<SameSite>,
}

impl CookieOptions {
    #[must_use]
    pub fn expired() -> Self {
        Self {
            max_age: Some(0),
            ..Self::default()
        }
    }

    fn removes(&self) -> bool {
        match self.max_age {
            Some(age) => age <= 0,
            None => self
                .expires
                .is_some_and(|at| at <= OffsetDateTime::now_utc()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieToSet {
    pub name: String,
    pub value: String,
    pub options: CookieOptions,
}

impl CookieToSet {
    pub fn new(name: impl Into<String>, value: impl Into<String>, options: CookieOptions) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            options,
        }
    }

    /// Renders the literal `Set-Cookie` value, value percent-encoded.
    #[must_use]
    pub fn to_header_string(&self) -> String {
        let opts = &self.options;
        let mut builder = Cookie::build((self.name.clone(), self.value.clone()))
            .path(opts.path.clone().unwrap_or_else(|| DEFAULT_PATH.to_string()))
            .same_site(opts.same_site.unwrap_or(DEFAULT_SAME_SITE));

        if let Some(domain) = &opts.domain {
            builder = builder.domain(domain.clone());
        }
        if let Some(seconds) = opts.max_age {
            builder = builder.max_age(cookie::time::Duration::seconds(seconds.max(0)));
        }
        if let Some(at) = opts.expires {
            builder = builder.expires(at);
        }
        if let Some(http_only) = opts.http_only {
            builder = builder.http_only(http_only);
        }
        if let Some(secure) = opts.secure {
            builder = builder.secure(secure);
        }

        builder.build().encoded().to_string()
    }
}

pub struct CookieBridge {
    incoming: Vec<RequestCookie>,
    pending: Mutex<Vec<CookieToSet>>,
}

impl CookieBridge {
    /// Parses a raw `Cookie` header. Malformed pairs are skipped and the
    /// first occurrence of a repeated name wins.
    #[must_use]
    pub fn new(cookie_header: Option<&str>) -> Self {
        let mut incoming: Vec<RequestCookie> = Vec::new();

        for parsed in Cookie::split_parse_encoded(cookie_header.unwrap_or("")) {
            let Ok(cookie) = parsed else {
                continue;
            };
            if cookie.name().is_empty() || incoming.iter().any(|c| c.name == cookie.name()) {
                continue;
            }
            incoming.push(RequestCookie {
                name: cookie.name().to_string(),
                value: cookie.value().to_string(),
            });
        }

        Self {
            incoming,
            pending: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let joined = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join("; ");

        Self::new(Some(&joined))
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, Vec<CookieToSet>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Request cookies with this request's own writes applied on top, so a
    /// cookie rewritten mid-request reads back with its new value.
    #[must_use]
    pub fn get_all(&self) -> Vec<RequestCookie> {
        let mut cookies = self.incoming.clone();

        for set in self.pending().iter() {
            cookies.retain(|c| c.name != set.name);
            if !set.options.removes() {
                cookies.push(RequestCookie {
                    name: set.name.clone(),
                    value: set.value.clone(),
                });
            }
        }

        cookies
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.get_all()
            .into_iter()
            .find(|c| c.name == name)
            .map(|c| c.value)
    }

    pub fn set_all(&self, cookies: impl IntoIterator<Item = CookieToSet>) {
        self.pending().extend(cookies);
    }

    pub fn set(&self, name: &str, value: &str, options: CookieOptions) {
        self.set_all([CookieToSet::new(name, value, options)]);
    }

    pub fn remove(&self, name: &str) {
        self.set(name, "", CookieOptions::expired());
    }

    /// Finalizes the accumulated writes into `Set-Cookie` header values,
    /// in the order they were made.
    #[must_use]
    pub fn set_cookie_headers(&self) -> Vec<String> {
        self.pending()
            .iter()
            .map(CookieToSet::to_header_string)
            .collect()
    }
}

/// Appends one `Set-Cookie` header per value; values are never comma-joined.
pub fn append_set_cookie_headers(headers: &mut HeaderMap, set_cookies: &[String]) {
    for value in set_cookies {
        match HeaderValue::from_str(value) {
            Ok(v) => {
                headers.append(header::SET_COOKIE, v);
            }
            Err(e) => tracing::warn!("Dropping unrepresentable Set-Cookie value: {e}"),
        }
    }
}
