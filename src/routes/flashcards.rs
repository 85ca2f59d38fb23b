use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Router};
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;

use super::{ensure_subject, not_found, parse_json, required};
use crate::auth::AuthUser;
use crate::db::operations::flashcards::{self, Flashcard, NewCard};
use crate::db::operations::{lectures, non_blank, notes};
use crate::response::{created, message, ok, AppError};
use crate::services::generation::clamp_count;
use crate::services::scheduler::{normalize_limit, record_review, select_due, ReviewOutcome};
use crate::state::AppState;

const DEFAULT_NUM_CARDS: usize = 10;
const REVIEW_ATTEMPTS: usize = 3;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_card))
        .route("/due", get(due_cards))
        .route("/sets", get(list_sets).post(create_set))
        .route("/sets/generate", post(generate_set))
        .route("/sets/:id", get(get_set).put(update_set).delete(delete_set))
        .route("/:id", get(get_card).put(update_card).delete(delete_card))
        .route("/:id/review", post(review_card))
}

#[derive(Debug, Deserialize)]
struct SubjectQuery {
    subject_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateSetRequest {
    title: Option<String>,
    description: Option<String>,
    subject_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateSetRequest {
    subject_id: Option<String>,
    note_id: Option<String>,
    lecture_id: Option<String>,
    content: Option<String>,
    num_cards: Option<i64>,
    title: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateSetRequest {
    title: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateCardRequest {
    front: Option<String>,
    back: Option<String>,
    flashcard_set_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateCardRequest {
    front: Option<String>,
    back: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReviewRequest {
    correct: Option<serde_json::Value>,
}

async fn list_sets(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<SubjectQuery>,
) -> Result<impl IntoResponse, AppError> {
    let subject_id = non_blank(query.subject_id);
    Ok(ok(flashcards::list_sets(state.db(), &user.id, subject_id.as_deref()).await?))
}

async fn get_set(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let detail = flashcards::get_set_detail(state.db(), &user.id, &id)
        .await?
        .ok_or_else(|| not_found("Flashcard set"))?;
    Ok(ok(detail))
}

async fn create_set(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: CreateSetRequest = parse_json(&body)?;

    let title = required(payload.title, "Title")?;
    let subject_id = required(payload.subject_id, "Subject ID")?;
    ensure_subject(&state, &user, &subject_id).await?;

    let description = non_blank(payload.description);
    let set = flashcards::insert_set_with_cards(state.db(), &user.id, &subject_id, &title, description.as_deref(), &[]).await?;
    Ok(created(set))
}

async fn generate_set(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: GenerateSetRequest = parse_json(&body)?;

    let subject_id = required(payload.subject_id, "Subject ID")?;
    let subject_name = ensure_subject(&state, &user, &subject_id).await?;

    let content = source_content(
        &state,
        &user,
        non_blank(payload.note_id),
        non_blank(payload.lecture_id),
        payload.content,
    )
    .await?;

    let num_cards = clamp_count(payload.num_cards, DEFAULT_NUM_CARDS);
    let generated = state.assistant().generate_flashcards(&content, num_cards).await?;
    let cards: Vec<NewCard> = generated
        .into_iter()
        .map(|card| NewCard {
            front: card.front,
            back: card.back,
        })
        .collect();

    let title = non_blank(payload.title).unwrap_or_else(|| format!("{subject_name} Flashcards"));
    let description = non_blank(payload.description);
    let set = flashcards::insert_set_with_cards(state.db(), &user.id, &subject_id, &title, description.as_deref(), &cards).await?;
    tracing::info!(user_id = %user.id, set_id = %set.id, cards = cards.len(), "flashcard set generated");

    let detail = flashcards::get_set_detail(state.db(), &user.id, &set.id)
        .await?
        .ok_or_else(|| not_found("Flashcard set"))?;
    Ok(created(detail))
}

/// Study material for generation: a note, a lecture (transcription, else
/// summary) or raw request content, in that order.
pub(crate) async fn source_content(
    state: &AppState,
    user: &AuthUser,
    note_id: Option<String>,
    lecture_id: Option<String>,
    content: Option<String>,
) -> Result<String, AppError> {
    let text = if let Some(note_id) = note_id {
        let note = notes::get_note(state.db(), &user.id, &note_id)
            .await?
            .ok_or_else(|| not_found("Note"))?;
        note.content
    } else if let Some(lecture_id) = lecture_id {
        let lecture = lectures::get_lecture(state.db(), &user.id, &lecture_id)
            .await?
            .ok_or_else(|| not_found("Lecture"))?;
        non_blank(lecture.transcription)
            .or_else(|| non_blank(lecture.summary))
            .unwrap_or_default()
    } else if let Some(content) = content {
        content
    } else {
        return Err(AppError::bad_request("Provide note_id, lecture_id, or content"));
    };

    if text.trim().is_empty() {
        return Err(AppError::bad_request("No content available to generate from"));
    }
    Ok(text)
}

async fn update_set(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: UpdateSetRequest = parse_json(&body)?;

    let title = non_blank(payload.title);
    let set = flashcards::update_set(state.db(), &user.id, &id, title.as_deref(), payload.description.as_deref())
        .await?
        .ok_or_else(|| not_found("Flashcard set"))?;
    Ok(ok(set))
}

async fn delete_set(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !flashcards::delete_set(state.db(), &user.id, &id).await? {
        return Err(not_found("Flashcard set"));
    }
    Ok(message("Flashcard set deleted successfully"))
}

async fn create_card(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: CreateCardRequest = parse_json(&body)?;

    let front = required(payload.front, "Front")?;
    let back = required(payload.back, "Back")?;
    let set_id = required(payload.flashcard_set_id, "Flashcard set ID")?;

    let card = flashcards::insert_card(state.db(), &user.id, &set_id, &front, &back)
        .await?
        .ok_or_else(|| not_found("Flashcard set"))?;
    Ok(created(Flashcard::from(card)))
}

async fn get_card(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let card = flashcards::get_card(state.db(), &user.id, &id)
        .await?
        .ok_or_else(|| not_found("Flashcard"))?;
    Ok(ok(Flashcard::from(card)))
}

async fn update_card(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: UpdateCardRequest = parse_json(&body)?;

    let front = non_blank(payload.front);
    let back = non_blank(payload.back);
    let card = flashcards::update_card(state.db(), &user.id, &id, front.as_deref(), back.as_deref())
        .await?
        .ok_or_else(|| not_found("Flashcard"))?;
    Ok(ok(Flashcard::from(card)))
}

async fn delete_card(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !flashcards::delete_card(state.db(), &user.id, &id).await? {
        return Err(not_found("Flashcard"));
    }
    Ok(message("Flashcard deleted successfully"))
}

async fn review_card(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    // A body that is not even an object still counts as an incorrect review.
    let outcome = match parse_json::<ReviewRequest>(&body) {
        Ok(payload) => ReviewOutcome::from_json(payload.correct.as_ref()),
        Err(_) => ReviewOutcome::Incorrect,
    };

    for _ in 0..REVIEW_ATTEMPTS {
        let mut card = flashcards::get_card(state.db(), &user.id, &id)
            .await?
            .ok_or_else(|| not_found("Flashcard"))?;

        let next = record_review(&card.review, outcome, Utc::now());
        if flashcards::save_review(state.db(), &card.id, card.review.times_reviewed, &next).await? {
            tracing::debug!(card_id = %card.id, difficulty = next.difficulty, correct = outcome.is_correct(), "flashcard reviewed");
            card.review = next;
            return Ok(ok(Flashcard::from(card)));
        }
        tracing::debug!(card_id = %card.id, "concurrent review detected, retrying");
    }

    Err(AppError::conflict("Flashcard was modified concurrently, please retry"))
}

async fn due_cards(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let subject_id = non_blank(query.get("subject_id").cloned());
    let limit = normalize_limit(query.get("limit").map(String::as_str));
    let as_of = Utc::now();

    let candidates = flashcards::due_candidates(state.db(), &user.id, subject_id.as_deref(), as_of, limit).await?;
    let due: Vec<Flashcard> = select_due(candidates, as_of, subject_id.as_deref(), limit)
        .into_iter()
        .map(Flashcard::from)
        .collect();
    Ok(ok(due))
}
