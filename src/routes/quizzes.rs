use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Extension, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::flashcards::source_content;
use super::{ensure_subject, not_found, parse_json, required};
use crate::auth::AuthUser;
use crate::db::operations::non_blank;
use crate::db::operations::quizzes::{self, NewAttempt, NewQuestion, QuestionPatch, QuizAttempt, QuizDetail};
use crate::response::{created, message, ok, AppError};
use crate::services::generation::clamp_count;
use crate::services::quiz::{grade, normalize_answers, QuestionResult, QuestionType};
use crate::state::AppState;

const DEFAULT_NUM_QUESTIONS: usize = 5;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_quizzes).post(create_quiz))
        .route("/generate", post(generate_quiz))
        .route("/questions/:question_id", put(update_question).delete(delete_question))
        .route("/:id", get(get_quiz).put(update_quiz).delete(delete_quiz))
        .route("/:id/questions", post(add_question))
        .route("/:id/submit", post(submit_quiz))
        .route("/:id/attempts", get(list_attempts))
}

#[derive(Debug, Deserialize)]
struct SubjectQuery {
    subject_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailQuery {
    include_answers: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuestionRequest {
    question: Option<String>,
    question_type: Option<String>,
    options: Option<Vec<String>>,
    correct_answer: Option<String>,
    explanation: Option<String>,
    points: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CreateQuizRequest {
    title: Option<String>,
    description: Option<String>,
    subject_id: Option<String>,
    #[serde(default)]
    questions: Vec<QuestionRequest>,
}

#[derive(Debug, Deserialize)]
struct GenerateQuizRequest {
    subject_id: Option<String>,
    note_id: Option<String>,
    lecture_id: Option<String>,
    content: Option<String>,
    num_questions: Option<i64>,
    question_types: Option<Vec<String>>,
    title: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateQuizRequest {
    title: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    #[serde(default)]
    answers: serde_json::Map<String, serde_json::Value>,
    time_taken_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    attempt: QuizAttempt,
    results: Vec<QuestionResult>,
}

async fn list_quizzes(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<SubjectQuery>,
) -> Result<impl IntoResponse, AppError> {
    let subject_id = non_blank(query.subject_id);
    Ok(ok(quizzes::list_quizzes(state.db(), &user.id, subject_id.as_deref()).await?))
}

async fn get_quiz(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Query(query): Query<DetailQuery>,
) -> Result<impl IntoResponse, AppError> {
    let include_answers = query
        .include_answers
        .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1"));

    let quiz = quizzes::get_quiz(state.db(), &user.id, &id)
        .await?
        .ok_or_else(|| not_found("Quiz"))?;
    let mut questions = quizzes::list_questions(state.db(), &user.id, &id).await?;
    if !include_answers {
        questions = questions.into_iter().map(|q| q.without_answers()).collect();
    }
    Ok(ok(QuizDetail { quiz, questions }))
}

async fn create_quiz(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: CreateQuizRequest = parse_json(&body)?;

    let title = required(payload.title, "Title")?;
    let subject_id = required(payload.subject_id, "Subject ID")?;
    let questions = payload
        .questions
        .into_iter()
        .map(validate_question)
        .collect::<Result<Vec<_>, _>>()?;
    ensure_subject(&state, &user, &subject_id).await?;

    let description = non_blank(payload.description);
    let quiz = quizzes::insert_quiz_with_questions(state.db(), &user.id, &subject_id, &title, description.as_deref(), &questions).await?;
    Ok(created(quiz))
}

async fn generate_quiz(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: GenerateQuizRequest = parse_json(&body)?;

    let subject_id = required(payload.subject_id, "Subject ID")?;
    let subject_name = ensure_subject(&state, &user, &subject_id).await?;

    let mut question_types = Vec::new();
    for raw in payload.question_types.unwrap_or_default() {
        let parsed = QuestionType::parse(&raw)
            .ok_or_else(|| AppError::validation(format!("Unknown question type: {raw}")))?;
        if !question_types.contains(&parsed) {
            question_types.push(parsed);
        }
    }

    let content = source_content(
        &state,
        &user,
        non_blank(payload.note_id),
        non_blank(payload.lecture_id),
        payload.content,
    )
    .await?;

    let num_questions = clamp_count(payload.num_questions, DEFAULT_NUM_QUESTIONS);
    let generated = state
        .assistant()
        .generate_quiz_questions(&content, num_questions, &question_types)
        .await?;
    let questions: Vec<NewQuestion> = generated
        .into_iter()
        .map(|q| NewQuestion {
            question: q.question,
            question_type: q.question_type.as_str().to_string(),
            options: q.options,
            correct_answer: q.correct_answer,
            explanation: q.explanation,
            points: q.points,
        })
        .collect();

    let title = non_blank(payload.title).unwrap_or_else(|| format!("{subject_name} Quiz"));
    let description = non_blank(payload.description);
    let quiz = quizzes::insert_quiz_with_questions(state.db(), &user.id, &subject_id, &title, description.as_deref(), &questions).await?;
    tracing::info!(user_id = %user.id, quiz_id = %quiz.id, questions = questions.len(), "quiz generated");

    let questions = quizzes::list_questions(state.db(), &user.id, &quiz.id).await?;
    Ok(created(QuizDetail { quiz, questions }))
}

async fn add_question(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: QuestionRequest = parse_json(&body)?;
    let question = validate_question(payload)?;

    let stored = quizzes::add_question(state.db(), &user.id, &id, &question)
        .await?
        .ok_or_else(|| not_found("Quiz"))?;
    Ok(created(stored))
}

async fn update_question(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(question_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: QuestionRequest = parse_json(&body)?;

    let existing = quizzes::get_question(state.db(), &user.id, &question_id)
        .await?
        .ok_or_else(|| not_found("Question"))?;

    // Validate the question as it will look after the patch.
    let merged = QuestionRequest {
        question: payload.question.clone().or(Some(existing.question)),
        question_type: payload.question_type.clone().or(Some(existing.question_type)),
        options: payload.options.clone().or(existing.options),
        correct_answer: payload.correct_answer.clone().or(existing.correct_answer),
        explanation: None,
        points: payload.points.or(Some(existing.points)),
    };
    let validated = validate_question(merged)?;

    let patch = QuestionPatch {
        question: payload.question.map(|_| validated.question),
        question_type: payload.question_type.map(|_| validated.question_type),
        options: payload.options.map(|_| validated.options.unwrap_or_default()),
        correct_answer: payload.correct_answer.map(|_| validated.correct_answer),
        explanation: payload.explanation.map(|e| e.trim().to_string()),
        points: payload.points.map(|_| validated.points),
    };
    let question = quizzes::update_question(state.db(), &user.id, &question_id, patch)
        .await?
        .ok_or_else(|| not_found("Question"))?;
    Ok(ok(question))
}

async fn delete_question(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(question_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !quizzes::delete_question(state.db(), &user.id, &question_id).await? {
        return Err(not_found("Question"));
    }
    Ok(message("Question deleted successfully"))
}

async fn submit_quiz(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: SubmitRequest = parse_json(&body)?;
    if payload.time_taken_seconds.is_some_and(|t| t < 0) {
        return Err(AppError::validation("time_taken_seconds must not be negative"));
    }

    quizzes::get_quiz(state.db(), &user.id, &id)
        .await?
        .ok_or_else(|| not_found("Quiz"))?;
    let questions = quizzes::list_questions(state.db(), &user.id, &id).await?;
    if questions.is_empty() {
        return Err(AppError::bad_request("Quiz has no questions"));
    }

    let answers = normalize_answers(&payload.answers);
    let report = grade(&questions, &answers);

    let attempt = quizzes::insert_attempt(
        state.db(),
        &user.id,
        &id,
        NewAttempt {
            score: report.score,
            total_points: report.total_points,
            time_taken_seconds: payload.time_taken_seconds,
            answers: &answers,
        },
    )
    .await?;
    tracing::info!(user_id = %user.id, quiz_id = %id, score = attempt.score, total = attempt.total_points, "quiz submitted");

    Ok(created(SubmitResponse {
        attempt,
        results: report.results,
    }))
}

async fn list_attempts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    quizzes::get_quiz(state.db(), &user.id, &id)
        .await?
        .ok_or_else(|| not_found("Quiz"))?;
    Ok(ok(quizzes::list_attempts(state.db(), &user.id, &id).await?))
}

async fn update_quiz(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: UpdateQuizRequest = parse_json(&body)?;

    let title = non_blank(payload.title);
    let quiz = quizzes::update_quiz(state.db(), &user.id, &id, title.as_deref(), payload.description.as_deref())
        .await?
        .ok_or_else(|| not_found("Quiz"))?;
    Ok(ok(quiz))
}

async fn delete_quiz(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !quizzes::delete_quiz(state.db(), &user.id, &id).await? {
        return Err(not_found("Quiz"));
    }
    Ok(message("Quiz deleted successfully"))
}

fn validate_question(payload: QuestionRequest) -> Result<NewQuestion, AppError> {
    let question = required(payload.question, "Question")?;
    let question_type = match non_blank(payload.question_type) {
        Some(raw) => QuestionType::parse(&raw).ok_or_else(|| {
            let allowed = QuestionType::ALL.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ");
            AppError::validation(format!("question_type must be one of: {allowed}"))
        })?,
        None => QuestionType::MultipleChoice,
    };
    let mut correct_answer = required(payload.correct_answer, "Correct answer")?;

    let options = payload.options.map(|options| {
        options
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect::<Vec<_>>()
    });

    let options = match question_type {
        QuestionType::MultipleChoice => {
            let options = options.unwrap_or_default();
            if options.len() < 2 {
                return Err(AppError::validation("Multiple choice questions need at least 2 options"));
            }
            Some(options)
        }
        QuestionType::TrueFalse => {
            correct_answer = match correct_answer.to_ascii_lowercase().as_str() {
                "true" => "True".to_string(),
                "false" => "False".to_string(),
                _ => return Err(AppError::validation("True/false answers must be true or false")),
            };
            Some(vec!["True".to_string(), "False".to_string()])
        }
        QuestionType::ShortAnswer => None,
    };

    let points = payload.points.unwrap_or(1);
    if points < 0 {
        return Err(AppError::validation("points must not be negative"));
    }

    Ok(NewQuestion {
        question,
        question_type: question_type.as_str().to_string(),
        options,
        correct_answer,
        explanation: non_blank(payload.explanation),
        points,
    })
}
