use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use super::views;
use crate::auth::{CookieBridge, append_set_cookie_headers};

/// Page-level failure rendered as an HTML error page. Internal details are
/// logged where the error is raised; only `message` reaches the browser.
#[derive(Debug)]
pub struct PageError {
    pub status: StatusCode,
    pub message: String,
    pub set_cookies: Vec<String>,
}

impl PageError {
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            set_cookies: Vec::new(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Carries the request's cookie writes (e.g. a refreshed session) onto
    /// the error response.
    #[must_use]
    pub fn with_cookies(mut self, cookies: &CookieBridge) -> Self {
        self.set_cookies = cookies.set_cookie_headers();
        self
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let body = views::error_page(self.status, &self.message);
        let mut response = (self.status, Html(body)).into_response();
        append_set_cookie_headers(response.headers_mut(), &self.set_cookies);
        response
    }
}

/// Attaches every cookie written during the request to `response`.
pub fn with_cookies(response: impl IntoResponse, cookies: &CookieBridge) -> Response {
    let mut response = response.into_response();
    append_set_cookie_headers(response.headers_mut(), &cookies.set_cookie_headers());
    response
}

/// Extension trait for turning provider failures into a logged [`PageError`].
pub trait PageResultExt<T> {
    fn page_err(self, message: &'static str) -> Result<T, PageError>;
}

impl<T> PageResultExt<T> for crate::error::Result<T> {
    fn page_err(self, message: &'static str) -> Result<T, PageError> {
        self.map_err(|e| {
            tracing::error!("{message}: {e}");
            PageError::internal(message)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CookieOptions;
    use axum::http::header;

    #[test]
    fn test_page_error_carries_cookies() {
        let cookies = CookieBridge::new(None);
        cookies.set("sb-auth", "v", CookieOptions::default());

        let response = PageError::internal("boom").with_cookies(&cookies).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers().get_all(header::SET_COOKIE).iter().count(), 1);
    }

    #[test]
    fn test_page_err_hides_details() {
        let result: crate::error::Result<()> =
            Err(crate::error::Error::Provider { status: 500, message: "secret".into() });
        let err = result.page_err("Could not load rows.").unwrap_err();
        assert_eq!(err.message, "Could not load rows.");
    }
}
