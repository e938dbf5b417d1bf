use askama::Template;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;

use crate::auth::{password, session};
use crate::db::users::{self, RegisterError};
use crate::error::{AppError, AppResult};
use crate::extractors::{cookie_value, MaybeUser};
use crate::state::AppState;
use crate::views::Html;

// -- Templates --

#[derive(Template)]
#[template(path = "pages/register.html")]
pub struct RegisterTemplate {
    pub user: Option<String>,
    pub error: Option<String>,
    pub username: String,
}

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub user: Option<String>,
    pub error: Option<String>,
    pub username: String,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CredentialsForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl CredentialsForm {
    fn missing_field(&self) -> Option<&'static str> {
        if self.username.is_empty() {
            Some("Username is required.")
        } else if self.password.is_empty() {
            Some("Password is required.")
        } else {
            None
        }
    }
}

// -- Register --

/// GET /auth/register
pub async fn register_page(MaybeUser(user): MaybeUser) -> Html<RegisterTemplate> {
    Html(RegisterTemplate {
        user: user.map(|u| u.username),
        error: None,
        username: String::new(),
    })
}

/// POST /auth/register: create the account, then send the user to log in.
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    let rerender = |error: String, username: String| {
        Html(RegisterTemplate {
            user: None,
            error: Some(error),
            username,
        })
        .into_response()
    };

    if let Some(error) = form.missing_field() {
        return Ok(rerender(error.to_string(), form.username));
    }

    let cost = state.config.auth.bcrypt_cost;
    let plain = form.password;
    let hash = tokio::task::spawn_blocking(move || password::hash_password(&plain, cost))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))??;

    let conn = state.db.get()?;
    match users::create_user(&conn, &form.username, &hash) {
        Ok(id) => {
            tracing::info!("Registered user {} ({})", form.username, id);
            Ok(Redirect::to("/auth/login").into_response())
        }
        Err(e @ RegisterError::UsernameTaken(_)) => Ok(rerender(e.to_string(), form.username)),
        Err(RegisterError::Database(e)) => Err(e.into()),
    }
}

// -- Login --

/// GET /auth/login
pub async fn login_page(MaybeUser(user): MaybeUser) -> Html<LoginTemplate> {
    Html(LoginTemplate {
        user: user.map(|u| u.username),
        error: None,
        username: String::new(),
    })
}

/// POST /auth/login: check credentials and start a session.
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    let rerender = |error: &str, username: String| {
        Html(LoginTemplate {
            user: None,
            error: Some(error.to_string()),
            username,
        })
        .into_response()
    };

    let user = {
        let conn = state.db.get()?;
        users::find_by_username(&conn, &form.username)?
    };

    let Some(user) = user else {
        return Ok(rerender("Incorrect username.", form.username));
    };

    let plain = form.password;
    let stored = user.password.clone();
    let valid = tokio::task::spawn_blocking(move || password::verify_password(&plain, &stored))
        .await
        .map_err(|e| AppError::Internal(format!("verify task failed: {e}")))?;

    if !valid {
        return Ok(rerender("Incorrect password.", form.username));
    }

    let auth = &state.config.auth;
    let token = {
        let conn = state.db.get()?;
        session::create_session(&conn, user.id, auth.session_hours)?
    };
    tracing::info!("User {} logged in", user.username);

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/".to_string()),
            (
                header::SET_COOKIE,
                session::session_cookie(&auth.cookie_name, &token, auth.session_hours),
            ),
        ],
    )
        .into_response())
}

// -- Logout --

/// GET /auth/logout: delete session and redirect
pub async fn logout(State(state): State<AppState>, request: Request) -> AppResult<Response> {
    let (parts, _body) = request.into_parts();
    let cookie_name = &state.config.auth.cookie_name;

    if let Some(token) = cookie_value(&parts, cookie_name) {
        let conn = state.db.get()?;
        session::delete_session(&conn, token)?;
    }

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/".to_string()),
            (header::SET_COOKIE, session::clear_session_cookie(cookie_name)),
        ],
    )
        .into_response())
}
