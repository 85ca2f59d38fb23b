use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Router};
use bytes::Bytes;
use serde::Deserialize;

use super::{ensure_subject, not_found, parse_json, required};
use crate::auth::AuthUser;
use crate::db::operations::lectures::{self, LecturePatch, NewLecture, SOURCE_TYPES};
use crate::db::operations::non_blank;
use crate::response::{created, message, ok, AppError};
use crate::services::generation::GenerationError;
use crate::services::youtube::{extract_video_id, TranscriptError};
use crate::state::AppState;

const SUMMARY_WORDS: usize = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_lectures).post(create_lecture))
        .route("/youtube", post(create_from_youtube))
        .route("/:id", get(get_lecture).put(update_lecture).delete(delete_lecture))
        .route("/:id/summarize", post(summarize_lecture))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    subject_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateLectureRequest {
    title: Option<String>,
    subject_id: Option<String>,
    source_type: Option<String>,
    source_url: Option<String>,
    transcription: Option<String>,
    summary: Option<String>,
    duration_seconds: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct YouTubeRequest {
    url: Option<String>,
    subject_id: Option<String>,
    title: Option<String>,
    generate_summary: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct UpdateLectureRequest {
    title: Option<String>,
    transcription: Option<String>,
    summary: Option<String>,
}

async fn list_lectures(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let subject_id = non_blank(query.subject_id);
    Ok(ok(lectures::list_lectures(state.db(), &user.id, subject_id.as_deref()).await?))
}

async fn get_lecture(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let lecture = lectures::get_lecture(state.db(), &user.id, &id)
        .await?
        .ok_or_else(|| not_found("Lecture"))?;
    Ok(ok(lecture))
}

async fn create_lecture(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: CreateLectureRequest = parse_json(&body)?;

    let title = required(payload.title, "Title")?;
    let subject_id = required(payload.subject_id, "Subject ID")?;
    let source_type = non_blank(payload.source_type).unwrap_or_else(|| "manual".to_string());
    if !SOURCE_TYPES.contains(&source_type.as_str()) {
        return Err(AppError::validation(format!(
            "source_type must be one of: {}",
            SOURCE_TYPES.join(", ")
        )));
    }
    if payload.duration_seconds.is_some_and(|d| d < 0) {
        return Err(AppError::validation("duration_seconds must not be negative"));
    }

    ensure_subject(&state, &user, &subject_id).await?;

    let lecture = lectures::insert_lecture(
        state.db(),
        &user.id,
        NewLecture {
            subject_id,
            title,
            source_type,
            source_url: non_blank(payload.source_url),
            transcription: non_blank(payload.transcription),
            summary: non_blank(payload.summary),
            duration_seconds: payload.duration_seconds,
        },
    )
    .await?;
    Ok(created(lecture))
}

async fn create_from_youtube(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: YouTubeRequest = parse_json(&body)?;

    let url = required(payload.url, "YouTube URL")?;
    let subject_id = required(payload.subject_id, "Subject ID")?;
    ensure_subject(&state, &user, &subject_id).await?;

    let video_id = extract_video_id(&url).ok_or(TranscriptError::InvalidUrl)?;
    let transcript = state.transcripts().fetch(&video_id).await?;
    if transcript.text.trim().is_empty() {
        return Err(TranscriptError::NotAvailable(video_id).into());
    }

    let summary = if payload.generate_summary.unwrap_or(true) {
        match state.assistant().summarize(&transcript.text, SUMMARY_WORDS).await {
            Ok(summary) => Some(summary),
            Err(GenerationError::Unavailable) => None,
            Err(err) => {
                tracing::warn!(error = %err, %video_id, "lecture summary skipped");
                None
            }
        }
    } else {
        None
    };

    let title = non_blank(payload.title).unwrap_or_else(|| format!("YouTube Lecture - {video_id}"));
    let lecture = lectures::insert_lecture(
        state.db(),
        &user.id,
        NewLecture {
            subject_id,
            title,
            source_type: "youtube".to_string(),
            source_url: Some(url),
            transcription: Some(transcript.text),
            summary,
            duration_seconds: Some(transcript.duration_seconds as i64),
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, lecture_id = %lecture.id, %video_id, "lecture imported from YouTube");
    Ok(created(lecture))
}

async fn summarize_lecture(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let lecture = lectures::get_lecture(state.db(), &user.id, &id)
        .await?
        .ok_or_else(|| not_found("Lecture"))?;

    let Some(transcription) = lecture.transcription.filter(|t| !t.trim().is_empty()) else {
        return Err(AppError::bad_request("No transcription available to summarize"));
    };

    let summary = state.assistant().summarize(&transcription, SUMMARY_WORDS).await?;
    let patch = LecturePatch {
        summary: Some(summary),
        ..Default::default()
    };
    let updated = lectures::update_lecture(state.db(), &user.id, &id, patch)
        .await?
        .ok_or_else(|| not_found("Lecture"))?;
    Ok(ok(updated))
}

async fn update_lecture(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: UpdateLectureRequest = parse_json(&body)?;

    let patch = LecturePatch {
        title: non_blank(payload.title),
        transcription: payload.transcription,
        summary: payload.summary,
    };
    let lecture = lectures::update_lecture(state.db(), &user.id, &id, patch)
        .await?
        .ok_or_else(|| not_found("Lecture"))?;
    Ok(ok(lecture))
}

async fn delete_lecture(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !lectures::delete_lecture(state.db(), &user.id, &id).await? {
        return Err(not_found("Lecture"));
    }
    Ok(message("Lecture deleted successfully"))
}
