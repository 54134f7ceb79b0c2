use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};
use warden_dns_infrastructure::sessions::SessionCheck;

pub const SESSION_COOKIE: &str = "agh_session";

/// Delay tacked onto failed logins.
const BAD_CREDS_PENALTY: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub name: String,
    pub password: String,
}

/// Username of the authenticated session, inserted by the middleware.
#[derive(Debug, Clone)]
pub struct AuthedUser(pub String);

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let users = {
        let config = state.core.config.read().await;
        config.users.clone()
    };

    match state.core.sessions.login(&users, &body.name, &body.password) {
        Ok((id, session)) => {
            let expires = Utc
                .timestamp_opt(session.expire as i64, 0)
                .single()
                .unwrap_or_else(Utc::now)
                .format("%a, %d %b %Y %H:%M:%S GMT");
            let cookie =
                format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; Expires={expires}");
            info!(user = %body.name, "Login succeeded");
            Ok((
                StatusCode::OK,
                [(header::SET_COOKIE, cookie)],
                Json(serde_json::json!({})),
            )
                .into_response())
        }
        Err(e) => {
            warn!(user = %body.name, "Login failed");
            tokio::time::sleep(BAD_CREDS_PENALTY).await;
            Err(e.into())
        }
    }
}

pub async fn logout(State(state): State<AppState>, request: Request) -> Response {
    if let Some(id) = session_id_from_headers(request.headers()) {
        state.core.sessions.logout(&id);
    }
    let clear = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0");
    (
        [(header::SET_COOKIE, clear)],
        Redirect::to("/login.html"),
    )
        .into_response()
}

/// Session gate for everything under `/control` except login itself.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(id) = session_id_from_headers(request.headers()) else {
        return Err(ApiError::unauthorized());
    };

    match state.core.sessions.check(&id) {
        SessionCheck::Ok { username } => {
            request.extensions_mut().insert(AuthedUser(username));
            Ok(next.run(request).await)
        }
        SessionCheck::Expired | SessionCheck::NotFound => Err(ApiError::unauthorized()),
    }
}

fn session_id_from_headers(headers: &axum::http::HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in cookies.split(';') {
        let pair = pair.trim();
        if let Some(value) = pair.strip_prefix(&format!("{SESSION_COOKIE}=")) {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}
