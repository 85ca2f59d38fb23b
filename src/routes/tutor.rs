use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{ensure_subject, not_found, parse_json, required};
use crate::auth::AuthUser;
use crate::db::operations::chat::{self, TutorMessage, ROLE_ASSISTANT};
use crate::db::operations::{new_id, non_blank};
use crate::response::{message, ok, AppError};
use crate::services::llm_provider::ChatMessage;
use crate::state::AppState;

const HISTORY_LIMIT: i64 = 20;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat))
        .route("/ask", post(ask))
        .route("/sessions", get(list_sessions))
        .route("/sessions/:session_id", get(get_session).delete(delete_session))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: Option<String>,
    session_id: Option<String>,
    subject_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    question: Option<String>,
    subject_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatReply {
    session_id: String,
    user_message: TutorMessage,
    assistant_message: TutorMessage,
}

#[derive(Debug, Serialize)]
struct AskReply {
    question: String,
    answer: String,
}

#[derive(Debug, Serialize)]
struct SessionDetail {
    session_id: String,
    messages: Vec<TutorMessage>,
}

async fn chat(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: ChatRequest = parse_json(&body)?;

    let text = required(payload.message, "Message")?;
    let session_id = non_blank(payload.session_id).unwrap_or_else(new_id);
    let subject_id = non_blank(payload.subject_id);
    let subject_name = match subject_id.as_deref() {
        Some(id) => Some(ensure_subject(&state, &user, id).await?),
        None => None,
    };

    let history: Vec<ChatMessage> = chat::recent_history(state.db(), &user.id, &session_id, HISTORY_LIMIT)
        .await?
        .into_iter()
        .map(|m| {
            if m.role == ROLE_ASSISTANT {
                ChatMessage::assistant(m.content)
            } else {
                ChatMessage::user(m.content)
            }
        })
        .collect();

    let reply = state
        .assistant()
        .tutor_reply(&text, &history, subject_name.as_deref())
        .await?;

    let (user_message, assistant_message) =
        chat::append_exchange(state.db(), &user.id, &session_id, subject_id.as_deref(), &text, &reply).await?;

    Ok(ok(ChatReply {
        session_id,
        user_message,
        assistant_message,
    }))
}

async fn ask(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: AskRequest = parse_json(&body)?;

    let question = required(payload.question, "Question")?;
    let subject_name = match non_blank(payload.subject_id) {
        Some(id) => Some(ensure_subject(&state, &user, &id).await?),
        None => None,
    };

    let answer = state
        .assistant()
        .tutor_reply(&question, &[], subject_name.as_deref())
        .await?;
    Ok(ok(AskReply { question, answer }))
}

async fn list_sessions(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> Result<impl IntoResponse, AppError> {
    Ok(ok(chat::list_sessions(state.db(), &user.id).await?))
}

async fn get_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let messages = chat::session_messages(state.db(), &user.id, &session_id).await?;
    if messages.is_empty() {
        return Err(not_found("Chat session"));
    }
    Ok(ok(SessionDetail { session_id, messages }))
}

async fn delete_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let removed = chat::delete_session(state.db(), &user.id, &session_id).await?;
    if removed == 0 {
        return Err(not_found("Chat session"));
    }
    tracing::debug!(user_id = %user.id, %session_id, removed, "chat session deleted");
    Ok(message("Chat session deleted successfully"))
}
