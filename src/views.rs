use askama::Template;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{NaiveDateTime, Utc};

use crate::auth::session;
use crate::error::AppResult;
use crate::extractors::cookie_value;
use crate::state::AppState;

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

#[derive(Template)]
#[template(path = "pages/not_found.html")]
pub struct NotFoundTemplate {
    pub user: Option<String>,
    pub message: String,
}

/// Response extension carrying the message of a rendered not-found page.
#[derive(Debug, Clone)]
pub struct NotFoundPage(pub String);

/// 404 page as an anonymous visitor sees it. `personalize_not_found` fills in
/// the user on the way out.
pub fn not_found_response(message: String) -> Response {
    let mut response = (
        StatusCode::NOT_FOUND,
        Html(NotFoundTemplate {
            user: None,
            message: message.clone(),
        }),
    )
        .into_response();
    response.extensions_mut().insert(NotFoundPage(message));
    response
}

/// Fallback for unmatched routes.
pub async fn not_found() -> Response {
    not_found_response("The page you were looking for doesn't exist.".to_string())
}

/// Middleware that re-renders not-found pages with the signed-in user in the
/// header. Other responses pass through untouched.
pub async fn personalize_not_found(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let (parts, body) = req.into_parts();
    let token = cookie_value(&parts, &state.config.auth.cookie_name).map(str::to_string);
    let response = next.run(Request::from_parts(parts, body)).await;

    let (Some(token), Some(NotFoundPage(message))) =
        (token, response.extensions().get::<NotFoundPage>().cloned())
    else {
        return response;
    };

    match session_username(&state, &token) {
        Ok(Some(username)) => (
            StatusCode::NOT_FOUND,
            Html(NotFoundTemplate {
                user: Some(username),
                message,
            }),
        )
            .into_response(),
        Ok(None) => response,
        Err(e) => {
            tracing::warn!("Couldn't look up session for not-found page: {}", e);
            response
        }
    }
}

fn session_username(state: &AppState, token: &str) -> AppResult<Option<String>> {
    let conn = state.db.get()?;
    Ok(session::session_user(&conn, token)?.map(|(_, username)| username))
}

/// Percent-encode a value for use in a URL path segment or query string.
pub fn url_escape(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

// --- Time formatting ---

/// Render a `YYYY-MM-DD HH:MM:SS` database timestamp relative to now.
pub fn parse_and_format_time(db_time: &str) -> String {
    NaiveDateTime::parse_from_str(db_time, "%Y-%m-%d %H:%M:%S")
        .map(|dt| format_relative_time(&dt))
        .unwrap_or_else(|_| db_time.to_string())
}

pub fn format_relative_time(dt: &NaiveDateTime) -> String {
    let now = Utc::now().naive_utc();
    let diff = now.signed_duration_since(*dt);

    let seconds = diff.num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }

    let minutes = diff.num_minutes();
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }

    let hours = diff.num_hours();
    if hours < 24 {
        return format!("{}h ago", hours);
    }

    let days = diff.num_days();
    if days < 7 {
        return format!("{}d ago", days);
    }

    dt.format("%b %-d, %Y").to_string()
}
