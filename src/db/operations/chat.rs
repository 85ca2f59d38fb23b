use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{format_ms, new_id, now_ms};
use crate::db::Database;

pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

#[derive(Debug, Clone, Serialize)]
pub struct TutorMessage {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub subject_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TutorSession {
    pub session_id: String,
    pub started_at: String,
    pub last_message_at: String,
    pub message_count: i64,
}

/// The newest `limit` messages of a session, oldest first.
pub async fn recent_history(
    db: &Database,
    user_id: &str,
    session_id: &str,
    limit: i64,
) -> Result<Vec<TutorMessage>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "id", "session_id", "role", "content", "subject_id", "created_at"
        FROM "chat_messages"
        WHERE "user_id" = ? AND "session_id" = ?
        ORDER BY "seq" DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(session_id)
    .bind(limit)
    .fetch_all(db.pool())
    .await?;

    let mut messages: Vec<TutorMessage> = rows.iter().map(map_message).collect();
    messages.reverse();
    Ok(messages)
}

pub async fn session_messages(db: &Database, user_id: &str, session_id: &str) -> Result<Vec<TutorMessage>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "id", "session_id", "role", "content", "subject_id", "created_at"
        FROM "chat_messages"
        WHERE "user_id" = ? AND "session_id" = ?
        ORDER BY "seq" ASC
        "#,
    )
    .bind(user_id)
    .bind(session_id)
    .fetch_all(db.pool())
    .await?;
    Ok(rows.iter().map(map_message).collect())
}

/// Stores a user message and the assistant reply as consecutive entries.
pub async fn append_exchange(
    db: &Database,
    user_id: &str,
    session_id: &str,
    subject_id: Option<&str>,
    question: &str,
    reply: &str,
) -> Result<(TutorMessage, TutorMessage), sqlx::Error> {
    let mut tx = db.pool().begin().await?;

    let next_seq: i64 = sqlx::query_scalar(
        r#"SELECT COALESCE(MAX("seq"), 0) + 1 FROM "chat_messages" WHERE "user_id" = ? AND "session_id" = ?"#,
    )
    .bind(user_id)
    .bind(session_id)
    .fetch_one(&mut *tx)
    .await?;

    let now = now_ms();
    let user_message =
        insert_message(&mut tx, user_id, session_id, subject_id, ROLE_USER, question, next_seq, now).await?;
    let assistant_message =
        insert_message(&mut tx, user_id, session_id, subject_id, ROLE_ASSISTANT, reply, next_seq + 1, now).await?;
    tx.commit().await?;

    Ok((user_message, assistant_message))
}

pub async fn list_sessions(db: &Database, user_id: &str) -> Result<Vec<TutorSession>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "session_id",
               MIN("created_at") AS "started_at",
               MAX("created_at") AS "last_message_at",
               COUNT(*) AS "message_count"
        FROM "chat_messages"
        WHERE "user_id" = ?
        GROUP BY "session_id"
        ORDER BY "last_message_at" DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db.pool())
    .await?;

    Ok(rows
        .iter()
        .map(|row| TutorSession {
            session_id: row.try_get("session_id").unwrap_or_default(),
            started_at: format_ms(row.try_get("started_at").unwrap_or_default()),
            last_message_at: format_ms(row.try_get("last_message_at").unwrap_or_default()),
            message_count: row.try_get("message_count").unwrap_or(0),
        })
        .collect())
}

pub async fn delete_session(db: &Database, user_id: &str, session_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "chat_messages" WHERE "user_id" = ? AND "session_id" = ?"#)
        .bind(user_id)
        .bind(session_id)
        .execute(db.pool())
        .await?;
    Ok(result.rows_affected())
}

#[allow(clippy::too_many_arguments)]
async fn insert_message(
    conn: &mut SqliteConnection,
    user_id: &str,
    session_id: &str,
    subject_id: Option<&str>,
    role: &str,
    content: &str,
    seq: i64,
    now: i64,
) -> Result<TutorMessage, sqlx::Error> {
    let id = new_id();
    sqlx::query(
        r#"
        INSERT INTO "chat_messages" ("id", "user_id", "session_id", "role", "content", "subject_id", "seq", "created_at")
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(session_id)
    .bind(role)
    .bind(content)
    .bind(subject_id)
    .bind(seq)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(TutorMessage {
        id,
        session_id: session_id.to_string(),
        role: role.to_string(),
        content: content.to_string(),
        subject_id: subject_id.map(str::to_string),
        created_at: format_ms(now),
    })
}

fn map_message(row: &SqliteRow) -> TutorMessage {
    TutorMessage {
        id: row.try_get("id").unwrap_or_default(),
        session_id: row.try_get("session_id").unwrap_or_default(),
        role: row.try_get("role").unwrap_or_default(),
        content: row.try_get("content").unwrap_or_default(),
        subject_id: row.try_get::<Option<String>, _>("subject_id").ok().flatten(),
        created_at: format_ms(row.try_get("created_at").unwrap_or_default()),
    }
}
