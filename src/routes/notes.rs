use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Router};
use bytes::Bytes;
use serde::Deserialize;

use super::{ensure_subject, not_found, parse_json, required};
use crate::auth::AuthUser;
use crate::db::operations::notes::{self, split_tags, NewNote, NotePatch};
use crate::db::operations::{lectures, non_blank};
use crate::response::{created, message, ok, AppError};
use crate::state::AppState;

const SUMMARY_WORDS: usize = 200;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notes).post(create_note))
        .route("/from-lecture/:lecture_id", post(create_from_lecture))
        .route("/:id", get(get_note).put(update_note).delete(delete_note))
        .route("/:id/summarize", post(summarize_note))
}

/// Tags arrive either as a JSON list or as one comma separated string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TagsInput {
    List(Vec<String>),
    Joined(String),
}

impl TagsInput {
    fn into_vec(self) -> Vec<String> {
        match self {
            TagsInput::List(tags) => tags
                .into_iter()
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
            TagsInput::Joined(raw) => split_tags(Some(&raw)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    subject_id: Option<String>,
    lecture_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateNoteRequest {
    title: Option<String>,
    content: Option<String>,
    subject_id: Option<String>,
    lecture_id: Option<String>,
    tags: Option<TagsInput>,
}

#[derive(Debug, Deserialize)]
struct FromLectureRequest {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateNoteRequest {
    title: Option<String>,
    content: Option<String>,
    summary: Option<String>,
    tags: Option<TagsInput>,
}

async fn list_notes(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let subject_id = non_blank(query.subject_id);
    let lecture_id = non_blank(query.lecture_id);
    let notes = notes::list_notes(state.db(), &user.id, subject_id.as_deref(), lecture_id.as_deref()).await?;
    Ok(ok(notes))
}

async fn get_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let note = notes::get_note(state.db(), &user.id, &id)
        .await?
        .ok_or_else(|| not_found("Note"))?;
    Ok(ok(note))
}

async fn create_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: CreateNoteRequest = parse_json(&body)?;

    let title = required(payload.title, "Title")?;
    let content = required(payload.content, "Content")?;
    let subject_id = required(payload.subject_id, "Subject ID")?;
    ensure_subject(&state, &user, &subject_id).await?;

    let lecture_id = non_blank(payload.lecture_id);
    if let Some(lecture_id) = lecture_id.as_deref() {
        if lectures::get_lecture(state.db(), &user.id, lecture_id).await?.is_none() {
            return Err(not_found("Lecture"));
        }
    }

    let note = notes::insert_note(
        state.db(),
        &user.id,
        NewNote {
            subject_id,
            lecture_id,
            title,
            content,
            summary: None,
            tags: payload.tags.map(TagsInput::into_vec).unwrap_or_default(),
        },
    )
    .await?;
    Ok(created(note))
}

async fn create_from_lecture(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(lecture_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: FromLectureRequest = parse_json(&body)?;

    let lecture = lectures::get_lecture(state.db(), &user.id, &lecture_id)
        .await?
        .ok_or_else(|| not_found("Lecture"))?;
    let Some(transcription) = lecture.transcription.as_deref().filter(|t| !t.trim().is_empty()) else {
        return Err(AppError::bad_request("No transcription available"));
    };

    let content = state.assistant().notes_from_transcription(transcription).await?;
    let title = non_blank(payload.title).unwrap_or_else(|| format!("Notes: {}", lecture.title));

    let note = notes::insert_note(
        state.db(),
        &user.id,
        NewNote {
            subject_id: lecture.subject_id.clone(),
            lecture_id: Some(lecture.id.clone()),
            title,
            content,
            summary: lecture.summary.clone(),
            tags: Vec::new(),
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, note_id = %note.id, lecture_id = %lecture.id, "notes generated from lecture");
    Ok(created(note))
}

async fn summarize_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let note = notes::get_note(state.db(), &user.id, &id)
        .await?
        .ok_or_else(|| not_found("Note"))?;
    if note.content.trim().is_empty() {
        return Err(AppError::bad_request("Note has no content to summarize"));
    }

    let summary = state.assistant().summarize(&note.content, SUMMARY_WORDS).await?;
    let patch = NotePatch {
        summary: Some(summary),
        ..Default::default()
    };
    let updated = notes::update_note(state.db(), &user.id, &id, patch)
        .await?
        .ok_or_else(|| not_found("Note"))?;
    Ok(ok(updated))
}

async fn update_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: UpdateNoteRequest = parse_json(&body)?;

    let patch = NotePatch {
        title: non_blank(payload.title),
        content: payload.content,
        summary: payload.summary,
        tags: payload.tags.map(TagsInput::into_vec),
    };
    let note = notes::update_note(state.db(), &user.id, &id, patch)
        .await?
        .ok_or_else(|| not_found("Note"))?;
    Ok(ok(note))
}

async fn delete_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !notes::delete_note(state.db(), &user.id, &id).await? {
        return Err(not_found("Note"));
    }
    Ok(message("Note deleted successfully"))
}
