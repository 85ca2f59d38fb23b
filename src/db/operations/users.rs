use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{format_ms, new_id, now_ms};
use crate::db::Database;

#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Account row plus the stored bcrypt hash, only used for credential checks.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: UserRecord,
    pub password_hash: String,
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub full_name: Option<&'a str>,
}

const USER_COLUMNS: &str = r#""id", "username", "email", "full_name", "is_active", "created_at", "updated_at", "password_hash""#;

pub async fn username_or_email_taken(db: &Database, username: &str, email: &str) -> Result<Option<&'static str>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT "username", "email" FROM "users" WHERE "username" = ? OR "email" = ? LIMIT 1"#)
        .bind(username)
        .bind(email)
        .fetch_optional(db.pool())
        .await?;

    Ok(row.map(|row| {
        let existing: String = row.try_get("username").unwrap_or_default();
        if existing == username {
            "username"
        } else {
            "email"
        }
    }))
}

pub async fn insert_user(db: &Database, new_user: NewUser<'_>) -> Result<UserRecord, sqlx::Error> {
    let id = new_id();
    let now = now_ms();

    sqlx::query(
        r#"
        INSERT INTO "users" ("id", "username", "email", "password_hash", "full_name", "is_active", "created_at", "updated_at")
        VALUES (?, ?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(new_user.username)
    .bind(new_user.email)
    .bind(new_user.password_hash)
    .bind(new_user.full_name)
    .bind(now)
    .bind(now)
    .execute(db.pool())
    .await?;

    Ok(UserRecord {
        id,
        username: new_user.username.to_string(),
        email: new_user.email.to_string(),
        full_name: new_user.full_name.map(str::to_string),
        is_active: true,
        created_at: format_ms(now),
        updated_at: format_ms(now),
    })
}

/// Looks an account up by username or (case-insensitively) by email.
pub async fn find_credentials(db: &Database, login: &str) -> Result<Option<UserCredentials>, sqlx::Error> {
    let sql = format!(r#"SELECT {USER_COLUMNS} FROM "users" WHERE "username" = ? OR "email" = ? LIMIT 1"#);
    let row = sqlx::query(&sql)
        .bind(login)
        .bind(login.to_lowercase())
        .fetch_optional(db.pool())
        .await?;
    Ok(row.as_ref().map(map_credentials))
}

pub async fn find_credentials_by_id(db: &Database, user_id: &str) -> Result<Option<UserCredentials>, sqlx::Error> {
    let sql = format!(r#"SELECT {USER_COLUMNS} FROM "users" WHERE "id" = ?"#);
    let row = sqlx::query(&sql).bind(user_id).fetch_optional(db.pool()).await?;
    Ok(row.as_ref().map(map_credentials))
}

pub async fn email_taken_by_other(db: &Database, email: &str, user_id: &str) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "users" WHERE "email" = ? AND "id" <> ?"#)
        .bind(email)
        .bind(user_id)
        .fetch_one(db.pool())
        .await?;
    Ok(count > 0)
}

pub async fn update_password(db: &Database, user_id: &str, password_hash: &str) -> Result<(), sqlx::Error> {
    sqlx::query(r#"UPDATE "users" SET "password_hash" = ?, "updated_at" = ? WHERE "id" = ?"#)
        .bind(password_hash)
        .bind(now_ms())
        .bind(user_id)
        .execute(db.pool())
        .await?;
    Ok(())
}

/// Drops every session except the one identified by `keep_token_hash`.
pub async fn revoke_other_sessions(db: &Database, user_id: &str, keep_token_hash: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "sessions" WHERE "user_id" = ? AND "token_hash" <> ?"#)
        .bind(user_id)
        .bind(keep_token_hash)
        .execute(db.pool())
        .await?;
    Ok(result.rows_affected())
}

pub async fn update_profile(
    db: &Database,
    user_id: &str,
    email: Option<&str>,
    full_name: Option<&str>,
) -> Result<Option<UserRecord>, sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE "users"
        SET "email" = COALESCE(?, "email"),
            "full_name" = COALESCE(?, "full_name"),
            "updated_at" = ?
        WHERE "id" = ?
        "#,
    )
    .bind(email)
    .bind(full_name)
    .bind(now_ms())
    .bind(user_id)
    .execute(db.pool())
    .await?;

    Ok(find_credentials_by_id(db, user_id).await?.map(|c| c.user))
}

fn map_credentials(row: &SqliteRow) -> UserCredentials {
    UserCredentials {
        user: UserRecord {
            id: row.try_get("id").unwrap_or_default(),
            username: row.try_get("username").unwrap_or_default(),
            email: row.try_get("email").unwrap_or_default(),
            full_name: row.try_get::<Option<String>, _>("full_name").ok().flatten(),
            is_active: row.try_get("is_active").unwrap_or(true),
            created_at: format_ms(row.try_get("created_at").unwrap_or_default()),
            updated_at: format_ms(row.try_get("updated_at").unwrap_or_default()),
        },
        password_hash: row.try_get("password_hash").unwrap_or_default(),
    }
}
