use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{format_ms, new_id, now_ms};
use crate::db::Database;

pub const DEFAULT_COLOR: &str = "#3B82F6";

#[derive(Debug, Clone, Serialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub created_at: String,
    pub updated_at: String,
    pub lecture_count: i64,
    pub note_count: i64,
    pub flashcard_set_count: i64,
    pub quiz_count: i64,
}

#[derive(Debug, Default)]
pub struct SubjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

const SUBJECT_SELECT: &str = r#"
    SELECT
      s."id", s."name", s."description", s."color", s."created_at", s."updated_at",
      (SELECT COUNT(*) FROM "lectures" l WHERE l."subject_id" = s."id") AS "lecture_count",
      (SELECT COUNT(*) FROM "notes" n WHERE n."subject_id" = s."id") AS "note_count",
      (SELECT COUNT(*) FROM "flashcard_sets" f WHERE f."subject_id" = s."id") AS "flashcard_set_count",
      (SELECT COUNT(*) FROM "quizzes" q WHERE q."subject_id" = s."id") AS "quiz_count"
    FROM "subjects" s
"#;

pub async fn list_subjects(db: &Database, user_id: &str) -> Result<Vec<Subject>, sqlx::Error> {
    let sql = format!(r#"{SUBJECT_SELECT} WHERE s."user_id" = ? ORDER BY s."name" COLLATE NOCASE ASC"#);
    let rows = sqlx::query(&sql).bind(user_id).fetch_all(db.pool()).await?;
    Ok(rows.iter().map(map_subject).collect())
}

pub async fn get_subject(db: &Database, user_id: &str, subject_id: &str) -> Result<Option<Subject>, sqlx::Error> {
    let sql = format!(r#"{SUBJECT_SELECT} WHERE s."user_id" = ? AND s."id" = ?"#);
    let row = sqlx::query(&sql)
        .bind(user_id)
        .bind(subject_id)
        .fetch_optional(db.pool())
        .await?;
    Ok(row.as_ref().map(map_subject))
}

/// Name of an owned subject, `None` when it does not exist for this user.
pub async fn subject_name(db: &Database, user_id: &str, subject_id: &str) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT "name" FROM "subjects" WHERE "user_id" = ? AND "id" = ?"#)
        .bind(user_id)
        .bind(subject_id)
        .fetch_optional(db.pool())
        .await
}

pub async fn insert_subject(
    db: &Database,
    user_id: &str,
    name: &str,
    description: Option<&str>,
    color: Option<&str>,
) -> Result<Subject, sqlx::Error> {
    let id = new_id();
    let now = now_ms();

    sqlx::query(
        r#"
        INSERT INTO "subjects" ("id", "user_id", "name", "description", "color", "created_at", "updated_at")
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(name)
    .bind(description)
    .bind(color.unwrap_or(DEFAULT_COLOR))
    .bind(now)
    .bind(now)
    .execute(db.pool())
    .await?;

    Ok(Subject {
        id,
        name: name.to_string(),
        description: description.map(str::to_string),
        color: color.unwrap_or(DEFAULT_COLOR).to_string(),
        created_at: format_ms(now),
        updated_at: format_ms(now),
        lecture_count: 0,
        note_count: 0,
        flashcard_set_count: 0,
        quiz_count: 0,
    })
}

pub async fn update_subject(
    db: &Database,
    user_id: &str,
    subject_id: &str,
    patch: SubjectPatch,
) -> Result<Option<Subject>, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "subjects"
        SET "name" = COALESCE(?, "name"),
            "description" = COALESCE(?, "description"),
            "color" = COALESCE(?, "color"),
            "updated_at" = ?
        WHERE "user_id" = ? AND "id" = ?
        "#,
    )
    .bind(patch.name)
    .bind(patch.description)
    .bind(patch.color)
    .bind(now_ms())
    .bind(user_id)
    .bind(subject_id)
    .execute(db.pool())
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_subject(db, user_id, subject_id).await
}

pub async fn delete_subject(db: &Database, user_id: &str, subject_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "subjects" WHERE "user_id" = ? AND "id" = ?"#)
        .bind(user_id)
        .bind(subject_id)
        .execute(db.pool())
        .await?;
    Ok(result.rows_affected() > 0)
}

fn map_subject(row: &SqliteRow) -> Subject {
    Subject {
        id: row.try_get("id").unwrap_or_default(),
        name: row.try_get("name").unwrap_or_default(),
        description: row.try_get::<Option<String>, _>("description").ok().flatten(),
        color: row.try_get("color").unwrap_or_else(|_| DEFAULT_COLOR.to_string()),
        created_at: format_ms(row.try_get("created_at").unwrap_or_default()),
        updated_at: format_ms(row.try_get("updated_at").unwrap_or_default()),
        lecture_count: row.try_get("lecture_count").unwrap_or(0),
        note_count: row.try_get("note_count").unwrap_or(0),
        flashcard_set_count: row.try_get("flashcard_set_count").unwrap_or(0),
        quiz_count: row.try_get("quiz_count").unwrap_or(0),
    }
}
