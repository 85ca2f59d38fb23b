use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{format_ms, new_id, now_ms};
use crate::db::Database;

pub const SOURCE_TYPES: [&str; 4] = ["manual", "youtube", "live", "upload"];

#[derive(Debug, Clone, Serialize)]
pub struct Lecture {
    pub id: String,
    pub title: String,
    pub source_type: String,
    pub source_url: Option<String>,
    pub transcription: Option<String>,
    pub summary: Option<String>,
    pub duration_seconds: Option<i64>,
    pub subject_id: String,
    pub subject_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub note_count: i64,
}

#[derive(Debug)]
pub struct NewLecture {
    pub subject_id: String,
    pub title: String,
    pub source_type: String,
    pub source_url: Option<String>,
    pub transcription: Option<String>,
    pub summary: Option<String>,
    pub duration_seconds: Option<i64>,
}

#[derive(Debug, Default)]
pub struct LecturePatch {
    pub title: Option<String>,
    pub transcription: Option<String>,
    pub summary: Option<String>,
}

const LECTURE_SELECT: &str = r#"
    SELECT
      l."id", l."title", l."source_type", l."source_url", l."transcription", l."summary",
      l."duration_seconds", l."subject_id", l."created_at", l."updated_at",
      s."name" AS "subject_name",
      (SELECT COUNT(*) FROM "notes" n WHERE n."lecture_id" = l."id") AS "note_count"
    FROM "lectures" l
    LEFT JOIN "subjects" s ON s."id" = l."subject_id"
"#;

pub async fn list_lectures(db: &Database, user_id: &str, subject_id: Option<&str>) -> Result<Vec<Lecture>, sqlx::Error> {
    let sql = format!(
        r#"{LECTURE_SELECT} WHERE l."user_id" = ? AND (? IS NULL OR l."subject_id" = ?) ORDER BY l."created_at" DESC"#
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(subject_id)
        .bind(subject_id)
        .fetch_all(db.pool())
        .await?;
    Ok(rows.iter().map(map_lecture).collect())
}

pub async fn get_lecture(db: &Database, user_id: &str, lecture_id: &str) -> Result<Option<Lecture>, sqlx::Error> {
    let sql = format!(r#"{LECTURE_SELECT} WHERE l."user_id" = ? AND l."id" = ?"#);
    let row = sqlx::query(&sql)
        .bind(user_id)
        .bind(lecture_id)
        .fetch_optional(db.pool())
        .await?;
    Ok(row.as_ref().map(map_lecture))
}

pub async fn insert_lecture(db: &Database, user_id: &str, lecture: NewLecture) -> Result<Lecture, sqlx::Error> {
    let id = new_id();
    let now = now_ms();

    sqlx::query(
        r#"
        INSERT INTO "lectures" (
            "id", "user_id", "subject_id", "title", "source_type", "source_url",
            "transcription", "summary", "duration_seconds", "created_at", "updated_at"
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(&lecture.subject_id)
    .bind(&lecture.title)
    .bind(&lecture.source_type)
    .bind(&lecture.source_url)
    .bind(&lecture.transcription)
    .bind(&lecture.summary)
    .bind(lecture.duration_seconds)
    .bind(now)
    .bind(now)
    .execute(db.pool())
    .await?;

    get_lecture(db, user_id, &id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

pub async fn update_lecture(
    db: &Database,
    user_id: &str,
    lecture_id: &str,
    patch: LecturePatch,
) -> Result<Option<Lecture>, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "lectures"
        SET "title" = COALESCE(?, "title"),
            "transcription" = COALESCE(?, "transcription"),
            "summary" = COALESCE(?, "summary"),
            "updated_at" = ?
        WHERE "user_id" = ? AND "id" = ?
        "#,
    )
    .bind(patch.title)
    .bind(patch.transcription)
    .bind(patch.summary)
    .bind(now_ms())
    .bind(user_id)
    .bind(lecture_id)
    .execute(db.pool())
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_lecture(db, user_id, lecture_id).await
}

pub async fn delete_lecture(db: &Database, user_id: &str, lecture_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "lectures" WHERE "user_id" = ? AND "id" = ?"#)
        .bind(user_id)
        .bind(lecture_id)
        .execute(db.pool())
        .await?;
    Ok(result.rows_affected() > 0)
}

fn map_lecture(row: &SqliteRow) -> Lecture {
    Lecture {
        id: row.try_get("id").unwrap_or_default(),
        title: row.try_get("title").unwrap_or_default(),
        source_type: row.try_get("source_type").unwrap_or_else(|_| "manual".to_string()),
        source_url: row.try_get::<Option<String>, _>("source_url").ok().flatten(),
        transcription: row.try_get::<Option<String>, _>("transcription").ok().flatten(),
        summary: row.try_get::<Option<String>, _>("summary").ok().flatten(),
        duration_seconds: row.try_get::<Option<i64>, _>("duration_seconds").ok().flatten(),
        subject_id: row.try_get("subject_id").unwrap_or_default(),
        subject_name: row.try_get::<Option<String>, _>("subject_name").ok().flatten(),
        created_at: format_ms(row.try_get("created_at").unwrap_or_default()),
        updated_at: format_ms(row.try_get("updated_at").unwrap_or_default()),
        note_count: row.try_get("note_count").unwrap_or(0),
    }
}
