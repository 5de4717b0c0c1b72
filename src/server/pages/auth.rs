use axum::{
    Form,
    http::StatusCode,
    response::{Html, Redirect, Response},
};

use crate::auth::{CookieBridge, RequestSession};
use crate::error::Error;
use crate::server::dto::CredentialsForm;
use crate::server::response::with_cookies;
use crate::server::validation::validate_password;
use crate::server::views::{self, AuthForm};
use crate::server::{LOGIN_PATH, USERS_PATH};
use crate::types::SignUp;

const CHECK_EMAIL: &str =
    "Account created. Please check your email to confirm your account, then come back and sign in.";
const UNAVAILABLE: &str = "Sign-in is unavailable right now. Please try again.";

fn render(status: StatusCode, html: String, cookies: &CookieBridge) -> Response {
    with_cookies((status, Html(html)), cookies)
}

/// True when the request already carries a usable session. Verification
/// failures count as signed out so the form still renders.
async fn signed_in(session: &RequestSession) -> bool {
    match session.client.get_user().await {
        Ok(identity) => identity.is_some(),
        Err(e) => {
            tracing::warn!("Could not verify existing session: {e}");
            false
        }
    }
}

pub async fn login_form(session: RequestSession) -> Response {
    if signed_in(&session).await {
        return with_cookies(Redirect::to(USERS_PATH), &session.cookies);
    }
    render(
        StatusCode::OK,
        views::login_page(&AuthForm::default()),
        &session.cookies,
    )
}

pub async fn login(session: RequestSession, Form(form): Form<CredentialsForm>) -> Response {
    let email = form.email.trim();

    match session.client.sign_in_with_password(email, &form.password).await {
        Ok(identity) => {
            tracing::info!("Signed in {}", identity.id);
            with_cookies(Redirect::to(USERS_PATH), &session.cookies)
        }
        Err(Error::Auth(message)) => render(
            StatusCode::UNAUTHORIZED,
            views::login_page(&AuthForm {
                email,
                error: Some(&message),
                ..AuthForm::default()
            }),
            &session.cookies,
        ),
        Err(e) => {
            tracing::error!("Sign-in failed: {e}");
            render(
                StatusCode::INTERNAL_SERVER_ERROR,
                views::login_page(&AuthForm {
                    email,
                    error: Some(UNAVAILABLE),
                    ..AuthForm::default()
                }),
                &session.cookies,
            )
        }
    }
}

pub async fn signup_form(session: RequestSession) -> Response {
    if signed_in(&session).await {
        return with_cookies(Redirect::to(USERS_PATH), &session.cookies);
    }
    render(
        StatusCode::OK,
        views::signup_page(&AuthForm::default()),
        &session.cookies,
    )
}

pub async fn signup(session: RequestSession, Form(form): Form<CredentialsForm>) -> Response {
    let email = form.email.trim();

    if let Err(message) = validate_password(&form.password) {
        return render(
            StatusCode::BAD_REQUEST,
            views::signup_page(&AuthForm {
                email,
                error: Some(&message),
                ..AuthForm::default()
            }),
            &session.cookies,
        );
    }

    match session.client.sign_up(email, &form.password).await {
        Ok(SignUp::SignedIn(created)) => {
            tracing::info!("Signed up {}", created.user.id);
            with_cookies(Redirect::to(USERS_PATH), &session.cookies)
        }
        Ok(SignUp::ConfirmationRequired) => render(
            StatusCode::OK,
            views::signup_page(&AuthForm {
                email,
                notice: Some(CHECK_EMAIL),
                disabled: true,
                ..AuthForm::default()
            }),
            &session.cookies,
        ),
        Err(Error::Auth(message)) => render(
            StatusCode::BAD_REQUEST,
            views::signup_page(&AuthForm {
                email,
                error: Some(&message),
                ..AuthForm::default()
            }),
            &session.cookies,
        ),
        Err(e) => {
            tracing::error!("Sign-up failed: {e}");
            render(
                StatusCode::INTERNAL_SERVER_ERROR,
                views::signup_page(&AuthForm {
                    email,
                    error: Some(UNAVAILABLE),
                    ..AuthForm::default()
                }),
                &session.cookies,
            )
        }
    }
}

pub async fn logout(session: RequestSession) -> Response {
    if let Err(e) = session.client.sign_out().await {
        tracing::warn!("Sign-out failed: {e}");
    }
    with_cookies(Redirect::to(LOGIN_PATH), &session.cookies)
}
