use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{format_ms, new_id, now_ms};
use crate::db::Database;

#[derive(Debug, Clone, Serialize)]
pub struct Quiz {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub subject_id: String,
    pub subject_name: Option<String>,
    pub question_count: i64,
    pub attempt_count: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizQuestion {
    pub id: String,
    pub question: String,
    pub question_type: String,
    pub options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub points: i64,
    pub quiz_id: String,
}

impl QuizQuestion {
    /// Drops the answer key for quiz takers.
    pub fn without_answers(mut self) -> Self {
        self.correct_answer = None;
        self.explanation = None;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizDetail {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizAttempt {
    pub id: String,
    pub quiz_id: String,
    pub quiz_title: Option<String>,
    pub score: i64,
    pub total_points: i64,
    pub percentage: f64,
    pub time_taken_seconds: Option<i64>,
    pub answers: BTreeMap<String, String>,
    pub completed_at: String,
}

#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub question: String,
    pub question_type: String,
    pub options: Option<Vec<String>>,
    pub correct_answer: String,
    pub explanation: Option<String>,
    pub points: i64,
}

#[derive(Debug, Default)]
pub struct QuestionPatch {
    pub question: Option<String>,
    pub question_type: Option<String>,
    pub options: Option<Vec<String>>,
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
    pub points: Option<i64>,
}

pub struct NewAttempt<'a> {
    pub score: i64,
    pub total_points: i64,
    pub time_taken_seconds: Option<i64>,
    pub answers: &'a BTreeMap<String, String>,
}

const QUIZ_SELECT: &str = r#"
    SELECT
      q."id", q."title", q."description", q."subject_id", q."created_at",
      s."name" AS "subject_name",
      (SELECT COUNT(*) FROM "quiz_questions" qq WHERE qq."quiz_id" = q."id") AS "question_count",
      (SELECT COUNT(*) FROM "quiz_attempts" qa WHERE qa."quiz_id" = q."id") AS "attempt_count"
    FROM "quizzes" q
    LEFT JOIN "subjects" s ON s."id" = q."subject_id"
"#;

const QUESTION_SELECT: &str = r#"
    SELECT qq."id", qq."quiz_id", qq."question", qq."question_type", qq."options",
           qq."correct_answer", qq."explanation", qq."points"
    FROM "quiz_questions" qq
    JOIN "quizzes" q ON q."id" = qq."quiz_id"
"#;

pub fn percentage(score: i64, total_points: i64) -> f64 {
    if total_points <= 0 {
        return 0.0;
    }
    let pct = score as f64 / total_points as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}

pub async fn list_quizzes(db: &Database, user_id: &str, subject_id: Option<&str>) -> Result<Vec<Quiz>, sqlx::Error> {
    let sql = format!(
        r#"{QUIZ_SELECT} WHERE q."user_id" = ? AND (? IS NULL OR q."subject_id" = ?) ORDER BY q."created_at" DESC"#
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(subject_id)
        .bind(subject_id)
        .fetch_all(db.pool())
        .await?;
    Ok(rows.iter().map(map_quiz).collect())
}

pub async fn get_quiz(db: &Database, user_id: &str, quiz_id: &str) -> Result<Option<Quiz>, sqlx::Error> {
    let sql = format!(r#"{QUIZ_SELECT} WHERE q."user_id" = ? AND q."id" = ?"#);
    let row = sqlx::query(&sql)
        .bind(user_id)
        .bind(quiz_id)
        .fetch_optional(db.pool())
        .await?;
    Ok(row.as_ref().map(map_quiz))
}

pub async fn list_questions(db: &Database, user_id: &str, quiz_id: &str) -> Result<Vec<QuizQuestion>, sqlx::Error> {
    let sql = format!(r#"{QUESTION_SELECT} WHERE q."user_id" = ? AND qq."quiz_id" = ? ORDER BY qq."position" ASC"#);
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(quiz_id)
        .fetch_all(db.pool())
        .await?;
    Ok(rows.iter().map(map_question).collect())
}

pub async fn get_question(db: &Database, user_id: &str, question_id: &str) -> Result<Option<QuizQuestion>, sqlx::Error> {
    let sql = format!(r#"{QUESTION_SELECT} WHERE q."user_id" = ? AND qq."id" = ?"#);
    let row = sqlx::query(&sql)
        .bind(user_id)
        .bind(question_id)
        .fetch_optional(db.pool())
        .await?;
    Ok(row.as_ref().map(map_question))
}

/// Creates a quiz and its questions in one transaction.
pub async fn insert_quiz_with_questions(
    db: &Database,
    user_id: &str,
    subject_id: &str,
    title: &str,
    description: Option<&str>,
    questions: &[NewQuestion],
) -> Result<Quiz, sqlx::Error> {
    let quiz_id = new_id();

    let mut tx = db.pool().begin().await?;
    sqlx::query(
        r#"
        INSERT INTO "quizzes" ("id", "user_id", "subject_id", "title", "description", "created_at")
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&quiz_id)
    .bind(user_id)
    .bind(subject_id)
    .bind(title)
    .bind(description)
    .bind(now_ms())
    .execute(&mut *tx)
    .await?;

    for (position, question) in questions.iter().enumerate() {
        insert_question_row(&mut tx, &quiz_id, position as i64, question).await?;
    }
    tx.commit().await?;

    get_quiz(db, user_id, &quiz_id).await?.ok_or(sqlx::Error::RowNotFound)
}

/// Appends a question to an owned quiz. `None` when the quiz is not the user's.
pub async fn add_question(
    db: &Database,
    user_id: &str,
    quiz_id: &str,
    question: &NewQuestion,
) -> Result<Option<QuizQuestion>, sqlx::Error> {
    let mut tx = db.pool().begin().await?;

    let owned: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT COALESCE((SELECT MAX("position") + 1 FROM "quiz_questions" WHERE "quiz_id" = q."id"), 0)
        FROM "quizzes" q
        WHERE q."user_id" = ? AND q."id" = ?
        "#,
    )
    .bind(user_id)
    .bind(quiz_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(position) = owned else {
        return Ok(None);
    };

    let question_id = insert_question_row(&mut tx, quiz_id, position, question).await?;
    tx.commit().await?;

    get_question(db, user_id, &question_id).await
}

pub async fn update_question(
    db: &Database,
    user_id: &str,
    question_id: &str,
    patch: QuestionPatch,
) -> Result<Option<QuizQuestion>, sqlx::Error> {
    let options_json = match patch.options {
        Some(options) => Some(json_column(&options)?),
        None => None,
    };

    let result = sqlx::query(
        r#"
        UPDATE "quiz_questions"
        SET "question" = COALESCE(?, "question"),
            "question_type" = COALESCE(?, "question_type"),
            "options" = COALESCE(?, "options"),
            "correct_answer" = COALESCE(?, "correct_answer"),
            "explanation" = COALESCE(?, "explanation"),
            "points" = COALESCE(?, "points")
        WHERE "id" = ?
          AND "quiz_id" IN (SELECT "id" FROM "quizzes" WHERE "user_id" = ?)
        "#,
    )
    .bind(patch.question)
    .bind(patch.question_type)
    .bind(options_json)
    .bind(patch.correct_answer)
    .bind(patch.explanation)
    .bind(patch.points)
    .bind(question_id)
    .bind(user_id)
    .execute(db.pool())
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_question(db, user_id, question_id).await
}

pub async fn delete_question(db: &Database, user_id: &str, question_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM "quiz_questions"
        WHERE "id" = ?
          AND "quiz_id" IN (SELECT "id" FROM "quizzes" WHERE "user_id" = ?)
        "#,
    )
    .bind(question_id)
    .bind(user_id)
    .execute(db.pool())
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn update_quiz(
    db: &Database,
    user_id: &str,
    quiz_id: &str,
    title: Option<&str>,
    description: Option<&str>,
) -> Result<Option<Quiz>, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "quizzes"
        SET "title" = COALESCE(?, "title"),
            "description" = COALESCE(?, "description")
        WHERE "user_id" = ? AND "id" = ?
        "#,
    )
    .bind(title)
    .bind(description)
    .bind(user_id)
    .bind(quiz_id)
    .execute(db.pool())
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_quiz(db, user_id, quiz_id).await
}

pub async fn delete_quiz(db: &Database, user_id: &str, quiz_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "quizzes" WHERE "user_id" = ? AND "id" = ?"#)
        .bind(user_id)
        .bind(quiz_id)
        .execute(db.pool())
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn insert_attempt(
    db: &Database,
    user_id: &str,
    quiz_id: &str,
    attempt: NewAttempt<'_>,
) -> Result<QuizAttempt, sqlx::Error> {
    let id = new_id();
    let answers_json = json_column(attempt.answers)?;

    sqlx::query(
        r#"
        INSERT INTO "quiz_attempts" ("id", "quiz_id", "score", "total_points", "time_taken_seconds", "answers", "completed_at")
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(quiz_id)
    .bind(attempt.score)
    .bind(attempt.total_points)
    .bind(attempt.time_taken_seconds)
    .bind(answers_json)
    .bind(now_ms())
    .execute(db.pool())
    .await?;

    let attempts = list_attempts(db, user_id, quiz_id).await?;
    attempts
        .into_iter()
        .find(|stored| stored.id == id)
        .ok_or(sqlx::Error::RowNotFound)
}

pub async fn list_attempts(db: &Database, user_id: &str, quiz_id: &str) -> Result<Vec<QuizAttempt>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT qa."id", qa."quiz_id", qa."score", qa."total_points", qa."time_taken_seconds",
               qa."answers", qa."completed_at", q."title" AS "quiz_title"
        FROM "quiz_attempts" qa
        JOIN "quizzes" q ON q."id" = qa."quiz_id"
        WHERE q."user_id" = ? AND qa."quiz_id" = ?
        ORDER BY qa."completed_at" DESC, qa."rowid" DESC
        "#,
    )
    .bind(user_id)
    .bind(quiz_id)
    .fetch_all(db.pool())
    .await?;
    Ok(rows.iter().map(map_attempt).collect())
}

async fn insert_question_row(
    conn: &mut SqliteConnection,
    quiz_id: &str,
    position: i64,
    question: &NewQuestion,
) -> Result<String, sqlx::Error> {
    let id = new_id();
    let options_json = match &question.options {
        Some(options) => Some(json_column(options)?),
        None => None,
    };

    sqlx::query(
        r#"
        INSERT INTO "quiz_questions" ("id", "quiz_id", "position", "question", "question_type", "options", "correct_answer", "explanation", "points")
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(quiz_id)
    .bind(position)
    .bind(&question.question)
    .bind(&question.question_type)
    .bind(options_json)
    .bind(&question.correct_answer)
    .bind(&question.explanation)
    .bind(question.points)
    .execute(conn)
    .await?;
    Ok(id)
}

fn json_column<T: Serialize + ?Sized>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(value).map_err(|e| sqlx::Error::Protocol(format!("failed to encode JSON column: {e}")))
}

fn map_quiz(row: &SqliteRow) -> Quiz {
    Quiz {
        id: row.try_get("id").unwrap_or_default(),
        title: row.try_get("title").unwrap_or_default(),
        description: row.try_get::<Option<String>, _>("description").ok().flatten(),
        subject_id: row.try_get("subject_id").unwrap_or_default(),
        subject_name: row.try_get::<Option<String>, _>("subject_name").ok().flatten(),
        question_count: row.try_get("question_count").unwrap_or(0),
        attempt_count: row.try_get("attempt_count").unwrap_or(0),
        created_at: format_ms(row.try_get("created_at").unwrap_or_default()),
    }
}

fn map_question(row: &SqliteRow) -> QuizQuestion {
    let options = row
        .try_get::<Option<String>, _>("options")
        .ok()
        .flatten()
        .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok());

    QuizQuestion {
        id: row.try_get("id").unwrap_or_default(),
        question: row.try_get("question").unwrap_or_default(),
        question_type: row.try_get("question_type").unwrap_or_default(),
        options,
        correct_answer: row.try_get::<Option<String>, _>("correct_answer").ok().flatten(),
        explanation: row.try_get::<Option<String>, _>("explanation").ok().flatten(),
        points: row.try_get("points").unwrap_or(1),
        quiz_id: row.try_get("quiz_id").unwrap_or_default(),
    }
}

fn map_attempt(row: &SqliteRow) -> QuizAttempt {
    let score: i64 = row.try_get("score").unwrap_or(0);
    let total_points: i64 = row.try_get("total_points").unwrap_or(0);
    let answers = row
        .try_get::<Option<String>, _>("answers")
        .ok()
        .flatten()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();

    QuizAttempt {
        id: row.try_get("id").unwrap_or_default(),
        quiz_id: row.try_get("quiz_id").unwrap_or_default(),
        quiz_title: row.try_get::<Option<String>, _>("quiz_title").ok().flatten(),
        score,
        total_points,
        percentage: percentage(score, total_points),
        time_taken_seconds: row.try_get::<Option<i64>, _>("time_taken_seconds").ok().flatten(),
        answers,
        completed_at: format_ms(row.try_get("completed_at").unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_rounds_to_one_decimal() {
        assert_eq!(percentage(2, 3), 66.7);
        assert_eq!(percentage(3, 3), 100.0);
        assert_eq!(percentage(0, 0), 0.0);
    }

    #[test]
    fn test_json_column_encodes_options_and_answers() {
        let options = vec!["True".to_string(), "False".to_string()];
        assert_eq!(json_column(&options).unwrap(), r#"["True","False"]"#);

        let mut answers = BTreeMap::new();
        answers.insert("q2".to_string(), "B".to_string());
        answers.insert("q1".to_string(), "A".to_string());
        assert_eq!(json_column(&answers).unwrap(), r#"{"q1":"A","q2":"B"}"#);
    }
}
