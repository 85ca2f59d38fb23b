use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{datetime_to_ms, format_ms, format_opt_ms, ms_to_datetime, new_id, now_ms};
use crate::db::Database;
use crate::services::scheduler::{DueCandidate, ReviewState};

#[derive(Debug, Clone, Serialize)]
pub struct FlashcardSet {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub subject_id: String,
    pub subject_name: Option<String>,
    pub card_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlashcardSetDetail {
    #[serde(flatten)]
    pub set: FlashcardSet,
    pub flashcards: Vec<Flashcard>,
}

/// Stored card with its review state in domain form.
#[derive(Debug, Clone)]
pub struct FlashcardRecord {
    pub id: String,
    pub flashcard_set_id: String,
    pub subject_id: String,
    pub front: String,
    pub back: String,
    pub review: ReviewState,
    pub created_at_ms: i64,
}

/// Card as returned over HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct Flashcard {
    pub id: String,
    pub front: String,
    pub back: String,
    pub difficulty: i32,
    pub times_reviewed: i32,
    pub times_correct: i32,
    pub accuracy: Option<f64>,
    pub last_reviewed: Option<String>,
    pub next_review: Option<String>,
    pub flashcard_set_id: String,
    pub created_at: String,
}

impl From<&FlashcardRecord> for Flashcard {
    fn from(record: &FlashcardRecord) -> Self {
        Self {
            id: record.id.clone(),
            front: record.front.clone(),
            back: record.back.clone(),
            difficulty: record.review.difficulty,
            times_reviewed: record.review.times_reviewed,
            times_correct: record.review.times_correct,
            accuracy: record.review.accuracy(),
            last_reviewed: format_opt_ms(record.review.last_reviewed.map(datetime_to_ms)),
            next_review: format_opt_ms(record.review.next_review.map(datetime_to_ms)),
            flashcard_set_id: record.flashcard_set_id.clone(),
            created_at: format_ms(record.created_at_ms),
        }
    }
}

impl From<FlashcardRecord> for Flashcard {
    fn from(record: FlashcardRecord) -> Self {
        Self::from(&record)
    }
}

impl DueCandidate for FlashcardRecord {
    fn next_review(&self) -> Option<DateTime<Utc>> {
        self.review.next_review
    }

    fn subject_id(&self) -> &str {
        &self.subject_id
    }
}

#[derive(Debug, Clone)]
pub struct NewCard {
    pub front: String,
    pub back: String,
}

const SET_SELECT: &str = r#"
    SELECT
      fs."id", fs."title", fs."description", fs."subject_id", fs."created_at", fs."updated_at",
      s."name" AS "subject_name",
      (SELECT COUNT(*) FROM "flashcards" f WHERE f."flashcard_set_id" = fs."id") AS "card_count"
    FROM "flashcard_sets" fs
    LEFT JOIN "subjects" s ON s."id" = fs."subject_id"
"#;

const CARD_SELECT: &str = r#"
    SELECT
      f."id", f."flashcard_set_id", f."front", f."back", f."difficulty", f."times_reviewed",
      f."times_correct", f."last_reviewed", f."next_review", f."created_at",
      fs."subject_id"
    FROM "flashcards" f
    JOIN "flashcard_sets" fs ON fs."id" = f."flashcard_set_id"
"#;

pub async fn list_sets(db: &Database, user_id: &str, subject_id: Option<&str>) -> Result<Vec<FlashcardSet>, sqlx::Error> {
    let sql = format!(
        r#"{SET_SELECT} WHERE fs."user_id" = ? AND (? IS NULL OR fs."subject_id" = ?) ORDER BY fs."updated_at" DESC"#
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(subject_id)
        .bind(subject_id)
        .fetch_all(db.pool())
        .await?;
    Ok(rows.iter().map(map_set).collect())
}

pub async fn get_set(db: &Database, user_id: &str, set_id: &str) -> Result<Option<FlashcardSet>, sqlx::Error> {
    let sql = format!(r#"{SET_SELECT} WHERE fs."user_id" = ? AND fs."id" = ?"#);
    let row = sqlx::query(&sql)
        .bind(user_id)
        .bind(set_id)
        .fetch_optional(db.pool())
        .await?;
    Ok(row.as_ref().map(map_set))
}

pub async fn get_set_detail(db: &Database, user_id: &str, set_id: &str) -> Result<Option<FlashcardSetDetail>, sqlx::Error> {
    let Some(set) = get_set(db, user_id, set_id).await? else {
        return Ok(None);
    };

    let sql = format!(r#"{CARD_SELECT} WHERE f."flashcard_set_id" = ? ORDER BY f."created_at" ASC, f."rowid" ASC"#);
    let rows = sqlx::query(&sql).bind(set_id).fetch_all(db.pool()).await?;
    let flashcards = rows.iter().map(map_card).map(Flashcard::from).collect();

    Ok(Some(FlashcardSetDetail { set, flashcards }))
}

/// Creates a set together with its cards in one transaction.
pub async fn insert_set_with_cards(
    db: &Database,
    user_id: &str,
    subject_id: &str,
    title: &str,
    description: Option<&str>,
    cards: &[NewCard],
) -> Result<FlashcardSet, sqlx::Error> {
    let set_id = new_id();
    let now = now_ms();

    let mut tx = db.pool().begin().await?;
    sqlx::query(
        r#"
        INSERT INTO "flashcard_sets" ("id", "user_id", "subject_id", "title", "description", "created_at", "updated_at")
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&set_id)
    .bind(user_id)
    .bind(subject_id)
    .bind(title)
    .bind(description)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for card in cards {
        insert_card_row(&mut tx, &set_id, &card.front, &card.back, now).await?;
    }
    tx.commit().await?;

    get_set(db, user_id, &set_id).await?.ok_or(sqlx::Error::RowNotFound)
}

pub async fn update_set(
    db: &Database,
    user_id: &str,
    set_id: &str,
    title: Option<&str>,
    description: Option<&str>,
) -> Result<Option<FlashcardSet>, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "flashcard_sets"
        SET "title" = COALESCE(?, "title"),
            "description" = COALESCE(?, "description"),
            "updated_at" = ?
        WHERE "user_id" = ? AND "id" = ?
        "#,
    )
    .bind(title)
    .bind(description)
    .bind(now_ms())
    .bind(user_id)
    .bind(set_id)
    .execute(db.pool())
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_set(db, user_id, set_id).await
}

pub async fn delete_set(db: &Database, user_id: &str, set_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "flashcard_sets" WHERE "user_id" = ? AND "id" = ?"#)
        .bind(user_id)
        .bind(set_id)
        .execute(db.pool())
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_card(db: &Database, user_id: &str, card_id: &str) -> Result<Option<FlashcardRecord>, sqlx::Error> {
    let sql = format!(r#"{CARD_SELECT} WHERE fs."user_id" = ? AND f."id" = ?"#);
    let row = sqlx::query(&sql)
        .bind(user_id)
        .bind(card_id)
        .fetch_optional(db.pool())
        .await?;
    Ok(row.as_ref().map(map_card))
}

/// Adds a card to an owned set. `None` when the set is not the user's.
pub async fn insert_card(
    db: &Database,
    user_id: &str,
    set_id: &str,
    front: &str,
    back: &str,
) -> Result<Option<FlashcardRecord>, sqlx::Error> {
    let now = now_ms();
    let mut tx = db.pool().begin().await?;

    let touched = sqlx::query(r#"UPDATE "flashcard_sets" SET "updated_at" = ? WHERE "user_id" = ? AND "id" = ?"#)
        .bind(now)
        .bind(user_id)
        .bind(set_id)
        .execute(&mut *tx)
        .await?;
    if touched.rows_affected() == 0 {
        return Ok(None);
    }

    let card_id = insert_card_row(&mut tx, set_id, front, back, now).await?;
    tx.commit().await?;

    get_card(db, user_id, &card_id).await
}

pub async fn update_card(
    db: &Database,
    user_id: &str,
    card_id: &str,
    front: Option<&str>,
    back: Option<&str>,
) -> Result<Option<FlashcardRecord>, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "flashcards"
        SET "front" = COALESCE(?, "front"),
            "back" = COALESCE(?, "back")
        WHERE "id" = ?
          AND "flashcard_set_id" IN (SELECT "id" FROM "flashcard_sets" WHERE "user_id" = ?)
        "#,
    )
    .bind(front)
    .bind(back)
    .bind(card_id)
    .bind(user_id)
    .execute(db.pool())
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_card(db, user_id, card_id).await
}

pub async fn delete_card(db: &Database, user_id: &str, card_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM "flashcards"
        WHERE "id" = ?
          AND "flashcard_set_id" IN (SELECT "id" FROM "flashcard_sets" WHERE "user_id" = ?)
        "#,
    )
    .bind(card_id)
    .bind(user_id)
    .execute(db.pool())
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Writes a new review state only if nobody reviewed the card since
/// `expected_times_reviewed` was read. Returns whether the row was updated.
pub async fn save_review(
    db: &Database,
    card_id: &str,
    expected_times_reviewed: i32,
    state: &ReviewState,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "flashcards"
        SET "difficulty" = ?,
            "times_reviewed" = ?,
            "times_correct" = ?,
            "last_reviewed" = ?,
            "next_review" = ?
        WHERE "id" = ? AND "times_reviewed" = ?
        "#,
    )
    .bind(state.difficulty)
    .bind(state.times_reviewed)
    .bind(state.times_correct)
    .bind(state.last_reviewed.map(datetime_to_ms))
    .bind(state.next_review.map(datetime_to_ms))
    .bind(card_id)
    .bind(expected_times_reviewed)
    .execute(db.pool())
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Cards of the user that are due at `as_of`, optionally within one subject.
/// Never-reviewed cards come first, then the most overdue, at most `limit`.
pub async fn due_candidates(
    db: &Database,
    user_id: &str,
    subject_id: Option<&str>,
    as_of: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<FlashcardRecord>, sqlx::Error> {
    let sql = format!(
        r#"{CARD_SELECT}
        WHERE fs."user_id" = ?
          AND (? IS NULL OR fs."subject_id" = ?)
          AND (f."next_review" IS NULL OR f."next_review" <= ?)
        ORDER BY f."next_review" IS NOT NULL, f."next_review" ASC, f."created_at" ASC
        LIMIT ?"#
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(subject_id)
        .bind(subject_id)
        .bind(datetime_to_ms(as_of))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(db.pool())
        .await?;
    Ok(rows.iter().map(map_card).collect())
}

async fn insert_card_row(
    conn: &mut SqliteConnection,
    set_id: &str,
    front: &str,
    back: &str,
    now: i64,
) -> Result<String, sqlx::Error> {
    let id = new_id();
    sqlx::query(
        r#"
        INSERT INTO "flashcards" ("id", "flashcard_set_id", "front", "back", "difficulty", "times_reviewed", "times_correct", "created_at")
        VALUES (?, ?, ?, ?, 0, 0, 0, ?)
        "#,
    )
    .bind(&id)
    .bind(set_id)
    .bind(front)
    .bind(back)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(id)
}

fn map_set(row: &SqliteRow) -> FlashcardSet {
    FlashcardSet {
        id: row.try_get("id").unwrap_or_default(),
        title: row.try_get("title").unwrap_or_default(),
        description: row.try_get::<Option<String>, _>("description").ok().flatten(),
        subject_id: row.try_get("subject_id").unwrap_or_default(),
        subject_name: row.try_get::<Option<String>, _>("subject_name").ok().flatten(),
        card_count: row.try_get("card_count").unwrap_or(0),
        created_at: format_ms(row.try_get("created_at").unwrap_or_default()),
        updated_at: format_ms(row.try_get("updated_at").unwrap_or_default()),
    }
}

fn map_card(row: &SqliteRow) -> FlashcardRecord {
    let last_reviewed = row.try_get::<Option<i64>, _>("last_reviewed").ok().flatten();
    let next_review = row.try_get::<Option<i64>, _>("next_review").ok().flatten();

    FlashcardRecord {
        id: row.try_get("id").unwrap_or_default(),
        flashcard_set_id: row.try_get("flashcard_set_id").unwrap_or_default(),
        subject_id: row.try_get("subject_id").unwrap_or_default(),
        front: row.try_get("front").unwrap_or_default(),
        back: row.try_get("back").unwrap_or_default(),
        review: ReviewState {
            difficulty: row.try_get("difficulty").unwrap_or(0),
            times_reviewed: row.try_get("times_reviewed").unwrap_or(0),
            times_correct: row.try_get("times_correct").unwrap_or(0),
            last_reviewed: last_reviewed.and_then(ms_to_datetime),
            next_review: next_review.and_then(ms_to_datetime),
        },
        created_at_ms: row.try_get("created_at").unwrap_or_default(),
    }
}
