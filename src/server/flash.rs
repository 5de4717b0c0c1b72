//! One-shot status messages carried across the post/redirect/get cycle.

use crate::auth::{CookieBridge, CookieOptions};

pub const FLASH_COOKIE: &str = "roster-flash";
const FLASH_MAX_AGE_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    Success,
    Error,
}

impl FlashKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashKind::Success => "success",
            FlashKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }

    fn encode(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.message)
    }

    fn decode(value: &str) -> Option<Self> {
        let (kind, message) = value.split_once(':')?;
        let kind = match kind {
            "success" => FlashKind::Success,
            "error" => FlashKind::Error,
            _ => return None,
        };
        Some(Self {
            kind,
            message: message.to_string(),
        })
    }
}

fn options(max_age: i64, secure: bool) -> CookieOptions {
    CookieOptions {
        max_age: Some(max_age),
        http_only: Some(true),
        secure: Some(secure),
        ..CookieOptions::default()
    }
}

/// `secure` follows the session cookie setting.
pub fn set_flash(cookies: &CookieBridge, flash: &Flash, secure: bool) {
    cookies.set(FLASH_COOKIE, &flash.encode(), options(FLASH_MAX_AGE_SECS, secure));
}

/// Reads the pending flash, if any, and schedules its removal.
pub fn take_flash(cookies: &CookieBridge, secure: bool) -> Option<Flash> {
    let value = cookies.get(FLASH_COOKIE)?;
    cookies.set(FLASH_COOKIE, "", options(0, secure));
    Flash::decode(&value)
}
