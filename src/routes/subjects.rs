use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};
use bytes::Bytes;
use serde::Deserialize;

use super::{not_found, parse_json, required};
use crate::auth::AuthUser;
use crate::db::operations::non_blank;
use crate::db::operations::subjects::{self, SubjectPatch};
use crate::response::{created, message, ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_subjects).post(create_subject))
        .route("/:id", get(get_subject).put(update_subject).delete(delete_subject))
}

#[derive(Debug, Deserialize)]
struct SubjectRequest {
    name: Option<String>,
    description: Option<String>,
    color: Option<String>,
}

async fn list_subjects(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> Result<impl IntoResponse, AppError> {
    Ok(ok(subjects::list_subjects(state.db(), &user.id).await?))
}

async fn get_subject(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let subject = subjects::get_subject(state.db(), &user.id, &id)
        .await?
        .ok_or_else(|| not_found("Subject"))?;
    Ok(ok(subject))
}

async fn create_subject(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: SubjectRequest = parse_json(&body)?;

    let name = required(payload.name, "Subject name")?;
    let color = validated_color(payload.color)?;
    let description = non_blank(payload.description);

    let subject = subjects::insert_subject(state.db(), &user.id, &name, description.as_deref(), color.as_deref()).await?;
    tracing::info!(user_id = %user.id, subject_id = %subject.id, "subject created");
    Ok(created(subject))
}

async fn update_subject(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: SubjectRequest = parse_json(&body)?;

    let name = match payload.name {
        Some(name) => Some(required(Some(name), "Subject name")?),
        None => None,
    };
    let patch = SubjectPatch {
        name,
        description: payload.description.map(|d| d.trim().to_string()),
        color: validated_color(payload.color)?,
    };

    let subject = subjects::update_subject(state.db(), &user.id, &id, patch)
        .await?
        .ok_or_else(|| not_found("Subject"))?;
    Ok(ok(subject))
}

async fn delete_subject(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !subjects::delete_subject(state.db(), &user.id, &id).await? {
        return Err(not_found("Subject"));
    }
    Ok(message("Subject deleted successfully"))
}

fn validated_color(color: Option<String>) -> Result<Option<String>, AppError> {
    match non_blank(color) {
        Some(color) if is_hex_color(&color) => Ok(Some(color.to_ascii_uppercase())),
        Some(_) => Err(AppError::validation("Color must be a hex value like #3B82F6")),
        None => Ok(None),
    }
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_color() {
        assert!(is_hex_color("#3B82F6"));
        assert!(is_hex_color("#abcdef"));
        assert!(!is_hex_color("3B82F6"));
        assert!(!is_hex_color("#3B82F"));
        assert!(!is_hex_color("#GGGGGG"));
    }

    #[test]
    fn test_validated_color_normalizes_case() {
        assert_eq!(validated_color(Some("#abcdef".into())).unwrap().as_deref(), Some("#ABCDEF"));
        assert_eq!(validated_color(Some(" ".into())).unwrap(), None);
        assert!(validated_color(Some("blue".into())).is_err());
    }
}
