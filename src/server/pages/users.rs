use std::sync::Arc;

use axum::{
    Form,
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::Utc;

use crate::auth::RequireIdentity;
use crate::error::Error;
use crate::server::{AppState, USERS_PATH};
use crate::server::dto::{Intent, RowForm, UsersPage};
use crate::server::flash::{Flash, set_flash, take_flash};
use crate::server::response::{PageResultExt, with_cookies};
use crate::server::validation::{validate_email, validate_row_id, validate_row_name};
use crate::server::views;
use crate::types::{NewRow, RowChanges};

const NO_MATCH: &str = "No matching row was changed.";
const ACTION_FAILED: &str = "Something went wrong saving your change. Please try again.";

pub async fn load(State(state): State<Arc<AppState>>, auth: RequireIdentity) -> Response {
    let rows = match auth.client.list_rows(&auth.scope()).await.page_err("Could not load rows") {
        Ok(rows) => rows,
        Err(e) => return e.with_cookies(&auth.cookies).into_response(),
    };

    let flash = take_flash(&auth.cookies, state.session_cookie.secure);
    let page = UsersPage {
        identity: auth.identity,
        role: auth.role,
        rows,
    };

    with_cookies(Html(views::users_page(&page, flash.as_ref())), &auth.cookies)
}

enum ActionError {
    Invalid(String),
    NoMatch,
    Provider(Error),
}

impl From<Error> for ActionError {
    fn from(e: Error) -> Self {
        ActionError::Provider(e)
    }
}

impl From<String> for ActionError {
    fn from(message: String) -> Self {
        ActionError::Invalid(message)
    }
}

fn require_changed(affected: u64) -> Result<(), ActionError> {
    if affected == 0 {
        Err(ActionError::NoMatch)
    } else {
        Ok(())
    }
}

async fn perform(auth: &RequireIdentity, form: &RowForm) -> Result<&'static str, ActionError> {
    let intent =
        Intent::parse(&form.intent).ok_or_else(|| ActionError::Invalid("Unknown action.".into()))?;
    let name = form.name.trim();
    let email = form.email.trim();
    let scope = auth.scope();

    match intent {
        Intent::Add => {
            validate_row_name(name)?;
            validate_email(email)?;
            let row = NewRow {
                name: name.to_string(),
                email: email.to_string(),
                user_id: auth.identity.id.clone(),
            };
            let created = auth.client.insert_row(&row).await?;
            tracing::info!("Row {} added by {}", created.id, auth.identity.id);
            Ok("Row added.")
        }
        Intent::Update => {
            let id = validate_row_id(form.id.as_deref())?;
            validate_row_name(name)?;
            validate_email(email)?;
            let changes = RowChanges {
                name: name.to_string(),
                email: email.to_string(),
                updated_at: Utc::now(),
            };
            require_changed(auth.client.update_row(id, &changes, &scope).await?)?;
            tracing::info!("Row {id} updated by {}", auth.identity.id);
            Ok("Row updated.")
        }
        Intent::Delete => {
            let id = validate_row_id(form.id.as_deref())?;
            require_changed(auth.client.delete_row(id, &scope).await?)?;
            tracing::info!("Row {id} deleted by {}", auth.identity.id);
            Ok("Row deleted.")
        }
    }
}

/// Applies one add/update/delete and redirects back to the list. The outcome
/// travels in a flash cookie.
pub async fn act(
    State(state): State<Arc<AppState>>,
    auth: RequireIdentity,
    Form(form): Form<RowForm>,
) -> Response {
    let flash = match perform(&auth, &form).await {
        Ok(message) => Flash::success(message),
        Err(ActionError::Invalid(message)) => Flash::error(message),
        Err(ActionError::NoMatch) => {
            tracing::info!(
                "{} on row {:?} by {} matched nothing",
                form.intent,
                form.id,
                auth.identity.id
            );
            Flash::error(NO_MATCH)
        }
        Err(ActionError::Provider(e)) => {
            tracing::error!("Row {} failed for {}: {e}", form.intent, auth.identity.id);
            Flash::error(ACTION_FAILED)
        }
    };

    set_flash(&auth.cookies, &flash, state.session_cookie.secure);
    with_cookies(Redirect::to(USERS_PATH), &auth.cookies)
}
