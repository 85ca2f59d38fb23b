mod auth;
mod flashcards;
mod health;
mod lectures;
mod notes;
mod quizzes;
mod subjects;
mod tutor;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::auth::AuthUser;
use crate::db::operations::subjects as subject_ops;
use crate::middleware::auth::require_auth;
use crate::response::{json_error, AppError};
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let protected = |routes: Router<AppState>| {
        routes.route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
    };

    Router::new()
        .nest("/api/auth", auth::router(state.clone()))
        .nest("/api/subjects", protected(subjects::router()))
        .nest("/api/lectures", protected(lectures::router()))
        .nest("/api/notes", protected(notes::router()))
        .nest("/api/flashcards", protected(flashcards::router()))
        .nest("/api/quizzes", protected(quizzes::router()))
        .nest("/api/tutor", protected(tutor::router()))
        .nest("/api/health", health::router())
        .nest("/health", health::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "Endpoint not found").into_response()
}

/// Deserializes a JSON request body. An empty body reads as `{}`.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) { b"{}" } else { body };
    serde_json::from_slice(raw).map_err(|err| {
        tracing::debug!(error = %err, "rejected request body");
        AppError::bad_request("Invalid request body")
    })
}

/// Trimmed, non-empty field or a validation error naming it.
pub(crate) fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::validation(format!("{field} is required")))
}

pub(crate) fn not_found(entity: &str) -> AppError {
    AppError::not_found(format!("{entity} not found"))
}

/// Name of the caller's subject, 404 when it is missing or someone else's.
pub(crate) async fn ensure_subject(state: &AppState, user: &AuthUser, subject_id: &str) -> Result<String, AppError> {
    subject_ops::subject_name(state.db(), &user.id, subject_id)
        .await?
        .ok_or_else(|| not_found("Subject"))
}
