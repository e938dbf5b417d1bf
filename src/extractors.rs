use std::collections::HashMap;

use axum::extract::{FromRequestParts, Path};
use axum::http::header;
use axum::http::request::Parts;

use crate::auth::session;
use crate::db::models::Viewer;
use crate::error::AppError;
use crate::state::AppState;

/// Represents the currently authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
}

impl CurrentUser {
    pub fn viewer(&self) -> Viewer {
        Viewer::User(self.id)
    }
}

/// Extractor that requires authentication.
/// Anonymous requests are redirected to the login page.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = cookie_value(parts, &state.config.auth.cookie_name)
            .ok_or(AppError::LoginRequired)?;

        let conn = state.db.get()?;
        match session::session_user(&conn, token)? {
            Some((id, username)) => Ok(CurrentUser { id, username }),
            None => Err(AppError::LoginRequired),
        }
    }
}

/// Optional user extractor: `None` instead of a redirect when not signed in.
pub struct MaybeUser(pub Option<CurrentUser>);

impl MaybeUser {
    pub fn viewer(&self) -> Viewer {
        self.0.as_ref().map_or(Viewer::Anonymous, CurrentUser::viewer)
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(AppError::LoginRequired) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}

/// The `{id}` path segment as a post id. Anything that isn't an integer is a
/// 404, like an unknown route.
#[derive(Debug, Clone, Copy)]
pub struct PostId(pub i64);

impl<S: Send + Sync> FromRequestParts<S> for PostId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let params = path_params(parts, state).await?;
        Ok(PostId(int_param(&params, "id")?))
    }
}

/// `/{id}/delete/{comment_id}/`
#[derive(Debug, Clone, Copy)]
pub struct CommentPath {
    pub post_id: i64,
    pub comment_id: i64,
}

impl<S: Send + Sync> FromRequestParts<S> for CommentPath {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let params = path_params(parts, state).await?;
        Ok(CommentPath {
            post_id: int_param(&params, "id")?,
            comment_id: int_param(&params, "comment_id")?,
        })
    }
}

async fn path_params<S: Send + Sync>(
    parts: &mut Parts,
    state: &S,
) -> Result<HashMap<String, String>, AppError> {
    Path::<HashMap<String, String>>::from_request_parts(parts, state)
        .await
        .map(|Path(params)| params)
        .map_err(|_| not_found_page())
}

fn int_param(params: &HashMap<String, String>, key: &str) -> Result<i64, AppError> {
    params
        .get(key)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(not_found_page)
}

fn not_found_page() -> AppError {
    AppError::NotFound("The page you were looking for doesn't exist.".to_string())
}

pub fn cookie_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name && !val.is_empty() {
                Some(val)
            } else {
                None
            }
        })
}
