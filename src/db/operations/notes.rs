use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{format_ms, new_id, now_ms};
use crate::db::Database;

#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub subject_id: String,
    pub subject_name: Option<String>,
    pub lecture_id: Option<String>,
    pub lecture_title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug)]
pub struct NewNote {
    pub subject_id: String,
    pub lecture_id: Option<String>,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Default)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
}

const NOTE_SELECT: &str = r#"
    SELECT
      n."id", n."title", n."content", n."summary", n."tags", n."subject_id", n."lecture_id",
      n."created_at", n."updated_at",
      s."name" AS "subject_name",
      l."title" AS "lecture_title"
    FROM "notes" n
    LEFT JOIN "subjects" s ON s."id" = n."subject_id"
    LEFT JOIN "lectures" l ON l."id" = n."lecture_id"
"#;

pub fn join_tags(tags: &[String]) -> Option<String> {
    let joined = tags
        .iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .collect::<Vec<_>>()
        .join(",");
    (!joined.is_empty()).then_some(joined)
}

pub fn split_tags(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn list_notes(
    db: &Database,
    user_id: &str,
    subject_id: Option<&str>,
    lecture_id: Option<&str>,
) -> Result<Vec<Note>, sqlx::Error> {
    let sql = format!(
        r#"{NOTE_SELECT}
        WHERE n."user_id" = ?
          AND (? IS NULL OR n."subject_id" = ?)
          AND (? IS NULL OR n."lecture_id" = ?)
        ORDER BY n."updated_at" DESC"#
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(subject_id)
        .bind(subject_id)
        .bind(lecture_id)
        .bind(lecture_id)
        .fetch_all(db.pool())
        .await?;
    Ok(rows.iter().map(map_note).collect())
}

pub async fn get_note(db: &Database, user_id: &str, note_id: &str) -> Result<Option<Note>, sqlx::Error> {
    let sql = format!(r#"{NOTE_SELECT} WHERE n."user_id" = ? AND n."id" = ?"#);
    let row = sqlx::query(&sql)
        .bind(user_id)
        .bind(note_id)
        .fetch_optional(db.pool())
        .await?;
    Ok(row.as_ref().map(map_note))
}

pub async fn insert_note(db: &Database, user_id: &str, note: NewNote) -> Result<Note, sqlx::Error> {
    let id = new_id();
    let now = now_ms();

    sqlx::query(
        r#"
        INSERT INTO "notes" ("id", "user_id", "subject_id", "lecture_id", "title", "content", "summary", "tags", "created_at", "updated_at")
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(&note.subject_id)
    .bind(&note.lecture_id)
    .bind(&note.title)
    .bind(&note.content)
    .bind(&note.summary)
    .bind(join_tags(&note.tags))
    .bind(now)
    .bind(now)
    .execute(db.pool())
    .await?;

    get_note(db, user_id, &id).await?.ok_or(sqlx::Error::RowNotFound)
}

pub async fn update_note(db: &Database, user_id: &str, note_id: &str, patch: NotePatch) -> Result<Option<Note>, sqlx::Error> {
    // An explicit empty tag list clears the column, absence keeps it.
    let tags_given = patch.tags.is_some();
    let tags = patch.tags.as_deref().and_then(join_tags);

    let result = sqlx::query(
        r#"
        UPDATE "notes"
        SET "title" = COALESCE(?, "title"),
            "content" = COALESCE(?, "content"),
            "summary" = COALESCE(?, "summary"),
            "tags" = CASE WHEN ? THEN ? ELSE "tags" END,
            "updated_at" = ?
        WHERE "user_id" = ? AND "id" = ?
        "#,
    )
    .bind(patch.title)
    .bind(patch.content)
    .bind(patch.summary)
    .bind(tags_given)
    .bind(tags)
    .bind(now_ms())
    .bind(user_id)
    .bind(note_id)
    .execute(db.pool())
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_note(db, user_id, note_id).await
}

pub async fn delete_note(db: &Database, user_id: &str, note_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "notes" WHERE "user_id" = ? AND "id" = ?"#)
        .bind(user_id)
        .bind(note_id)
        .execute(db.pool())
        .await?;
    Ok(result.rows_affected() > 0)
}

fn map_note(row: &SqliteRow) -> Note {
    let tags_raw = row.try_get::<Option<String>, _>("tags").ok().flatten();
    Note {
        id: row.try_get("id").unwrap_or_default(),
        title: row.try_get("title").unwrap_or_default(),
        content: row.try_get("content").unwrap_or_default(),
        summary: row.try_get::<Option<String>, _>("summary").ok().flatten(),
        tags: split_tags(tags_raw.as_deref()),
        subject_id: row.try_get("subject_id").unwrap_or_default(),
        subject_name: row.try_get::<Option<String>, _>("subject_name").ok().flatten(),
        lecture_id: row.try_get::<Option<String>, _>("lecture_id").ok().flatten(),
        lecture_title: row.try_get::<Option<String>, _>("lecture_title").ok().flatten(),
        created_at: format_ms(row.try_get("created_at").unwrap_or_default()),
        updated_at: format_ms(row.try_get("updated_at").unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_round_trip_through_column() {
        let tags = vec![" rust ".to_string(), "".to_string(), "async".to_string()];
        let joined = join_tags(&tags);
        assert_eq!(joined.as_deref(), Some("rust,async"));
        assert_eq!(split_tags(joined.as_deref()), vec!["rust", "async"]);
        assert!(split_tags(None).is_empty());
        assert_eq!(join_tags(&[]), None);
    }
}
