//! Server-rendered HTML. Every interpolated value goes through [`escape`].

use std::fmt::Write;

use axum::http::StatusCode;

use super::dto::UsersPage;
use super::flash::{Flash, FlashKind};
use super::{LOGIN_PATH, LOGOUT_PATH, SIGNUP_PATH, USERS_PATH};
use crate::types::Row;

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; background: #f9fafb; color: #111827; margin: 0; }
main { max-width: 64rem; margin: 0 auto; padding: 2rem 1rem; }
.card { background: #fff; border: 1px solid #e5e7eb; border-radius: 1rem; padding: 1.5rem; margin-bottom: 1.5rem; }
.narrow { max-width: 28rem; margin: 4rem auto; }
.row { display: flex; gap: .75rem; align-items: flex-end; flex-wrap: wrap; }
.row > label { flex: 1; min-width: 10rem; }
label { display: block; font-size: .875rem; font-weight: 500; }
input { display: block; width: 100%; box-sizing: border-box; padding: .6rem .9rem; margin-top: .35rem; border: 1px solid #d1d5db; border-radius: .5rem; }
button { padding: .6rem 1rem; border-radius: .5rem; border: 1px solid #d1d5db; background: #fff; cursor: pointer; }
button.primary { background: #4f46e5; border-color: #4f46e5; color: #fff; }
button.danger { background: #fef2f2; border-color: #fecaca; color: #b91c1c; }
button:disabled, input:disabled { opacity: .6; cursor: not-allowed; }
.banner { border-radius: .5rem; padding: .75rem 1rem; margin: 1rem 0; font-size: .875rem; }
.banner.error { background: #fef2f2; border: 1px solid #fecaca; color: #b91c1c; }
.banner.success { background: #ecfdf5; border: 1px solid #a7f3d0; color: #047857; }
.muted { color: #6b7280; font-size: .875rem; }
header { display: flex; justify-content: space-between; align-items: flex-start; gap: 1rem; }
"#;

/// Disables a form's controls once it is submitted and swaps in the busy
/// label of the pressed button. Deferred so the submitted values are kept.
const SUBMIT_SCRIPT: &str = r#"
document.addEventListener("submit", function (event) {
  var form = event.target;
  var button = event.submitter;
  setTimeout(function () {
    form.querySelectorAll("input, button").forEach(function (el) { el.disabled = true; });
    if (button && button.dataset.busy) { button.textContent = button.dataset.busy; }
  }, 0);
});
"#;

#[must_use]
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n<main>\n{body}\n</main>\n\
         <script>{SUBMIT_SCRIPT}</script>\n</body>\n</html>\n",
        escape(title)
    )
}

fn banner(kind: &str, message: &str) -> String {
    format!(
        "<div class=\"banner {kind}\" role=\"status\">{}</div>",
        escape(message)
    )
}

/// State of the sign-in and sign-up forms.
#[derive(Debug, Default)]
pub struct AuthForm<'a> {
    pub email: &'a str,
    pub error: Option<&'a str>,
    pub notice: Option<&'a str>,
    /// Renders every control disabled (e.g. after a confirmation email).
    pub disabled: bool,
}

struct AuthPage<'a> {
    title: &'a str,
    subtitle: &'a str,
    action: &'a str,
    submit: &'a str,
    busy: &'a str,
    password_autocomplete: &'a str,
    password_hint: Option<&'a str>,
    footer: &'a str,
}

fn auth_page(page: &AuthPage<'_>, form: &AuthForm<'_>) -> String {
    let disabled = if form.disabled { " disabled" } else { "" };
    let mut body = String::new();

    let _ = write!(
        body,
        "<div class=\"card narrow\">\n<h1>{title}</h1>\n<p class=\"muted\">{subtitle}</p>\n\
         <form method=\"post\" action=\"{action}\">\n\
         <label>Email<input name=\"email\" type=\"email\" autocomplete=\"email\" \
         placeholder=\"you@example.com\" value=\"{email}\" required{disabled}></label>\n\
         <label>Password<input name=\"password\" type=\"password\" \
         autocomplete=\"{autocomplete}\" required{disabled}></label>\n",
        title = escape(page.title),
        subtitle = escape(page.subtitle),
        action = page.action,
        email = escape(form.email),
        autocomplete = page.password_autocomplete,
    );

    if let Some(hint) = page.password_hint {
        let _ = writeln!(body, "<p class=\"muted\">{}</p>", escape(hint));
    }
    if let Some(error) = form.error {
        body.push_str(&banner("error", error));
    }
    if let Some(notice) = form.notice {
        body.push_str(&banner("success", notice));
    }

    let _ = write!(
        body,
        "<p><button class=\"primary\" type=\"submit\" data-busy=\"{busy}\"{disabled}>{submit}</button></p>\n\
         </form>\n<p class=\"muted\">{footer}</p>\n</div>",
        busy = escape(page.busy),
        submit = escape(page.submit),
        footer = page.footer,
    );

    layout(page.title, &body)
}

#[must_use]
pub fn login_page(form: &AuthForm<'_>) -> String {
    auth_page(
        &AuthPage {
            title: "Sign in",
            subtitle: "Enter your credentials to continue",
            action: LOGIN_PATH,
            submit: "Sign in",
            busy: "Signing in...",
            password_autocomplete: "current-password",
            password_hint: None,
            footer: &format!("No account? <a href=\"{SIGNUP_PATH}\">Sign up</a>"),
        },
        form,
    )
}

#[must_use]
pub fn signup_page(form: &AuthForm<'_>) -> String {
    auth_page(
        &AuthPage {
            title: "Create account",
            subtitle: "Sign up to get started",
            action: SIGNUP_PATH,
            submit: "Sign up",
            busy: "Signing up...",
            password_autocomplete: "new-password",
            password_hint: Some("Use at least 8 characters."),
            footer: &format!("Already have an account? <a href=\"{LOGIN_PATH}\">Sign in</a>"),
        },
        form,
    )
}

fn row_form(row: &Row) -> String {
    format!(
        "<form method=\"post\" action=\"{USERS_PATH}\" class=\"card row\">\n\
         <input type=\"hidden\" name=\"id\" value=\"{id}\">\n\
         <label>Name<input name=\"name\" value=\"{name}\" required></label>\n\
         <label>Email<input name=\"email\" type=\"email\" value=\"{email}\" required></label>\n\
         <button type=\"submit\" name=\"intent\" value=\"update\" data-busy=\"Saving...\">Save</button>\n\
         <button class=\"danger\" type=\"submit\" name=\"intent\" value=\"delete\" \
         data-busy=\"Deleting...\">Delete</button>\n</form>",
        id = escape(&row.id),
        name = escape(&row.name),
        email = escape(&row.email),
    )
}

#[must_use]
pub fn users_page(page: &UsersPage, flash: Option<&Flash>) -> String {
    let is_admin = page.role.is_admin();
    let mut body = String::new();

    let _ = write!(
        body,
        "<header>\n<div>\n<h1>User Management</h1>\n<p class=\"muted\">{view}</p>\n\
         <p class=\"muted\">Signed in as {who} ({role})</p>\n</div>\n\
         <form method=\"post\" action=\"{LOGOUT_PATH}\">\
         <button type=\"submit\" data-busy=\"Logging out...\">Logout</button></form>\n</header>\n",
        view = if is_admin {
            "Admin view: you can see and manage all users."
        } else {
            "User view: you can only see and manage your own users."
        },
        who = escape(page.identity.email.as_deref().unwrap_or(&page.identity.id)),
        role = page.role,
    );

    if let Some(flash) = flash {
        let kind = match flash.kind {
            FlashKind::Success => "success",
            FlashKind::Error => "error",
        };
        body.push_str(&banner(kind, &flash.message));
    }

    let _ = write!(
        body,
        "<section class=\"card\">\n<h2>Add a user row</h2>\n\
         <form method=\"post\" action=\"{USERS_PATH}\" class=\"row\">\n\
         <input type=\"hidden\" name=\"intent\" value=\"add\">\n\
         <label>Name<input name=\"name\" placeholder=\"Jane Doe\" required></label>\n\
         <label>Email<input name=\"email\" type=\"email\" placeholder=\"jane@example.com\" required></label>\n\
         <button class=\"primary\" type=\"submit\" data-busy=\"Adding...\">Add</button>\n\
         </form>\n</section>\n"
    );

    let _ = write!(
        body,
        "<section>\n<header><h2>{heading}</h2><span class=\"muted\">{count} total</span></header>\n",
        heading = if is_admin { "All People" } else { "Your People" },
        count = page.rows.len(),
    );

    if page.rows.is_empty() {
        body.push_str("<p class=\"muted\">No rows yet. Add your first user above.</p>\n");
    } else {
        for row in &page.rows {
            body.push_str(&row_form(row));
            body.push('\n');
        }
    }
    body.push_str("</section>");

    layout("User Management", &body)
}

#[must_use]
pub fn error_page(status: StatusCode, message: &str) -> String {
    let body = format!(
        "<div class=\"card narrow\">\n<h1>{code} {reason}</h1>\n<p>{message}</p>\n\
         <p><a href=\"{USERS_PATH}\">Try again</a></p>\n</div>",
        code = status.as_u16(),
        reason = escape(status.canonical_reason().unwrap_or("Error")),
        message = escape(message),
    );
    layout("Error", &body)
}
