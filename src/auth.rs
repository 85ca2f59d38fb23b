use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::Row;
use thiserror::Error;

use crate::config::AuthConfig;
use crate::db::operations::format_ms;
use crate::db::Database;

pub const AUTH_COOKIE_NAME: &str = "auth_token";
const BCRYPT_COST: u32 = 10;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    Expired,
    #[error("account inactive")]
    Inactive,
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at_ms: i64,
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = get_cookie(headers, AUTH_COOKIE_NAME) {
        return Some(token);
    }

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?;

    auth_header
        .strip_prefix("Bearer ")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    Ok(bcrypt::hash(password, BCRYPT_COST)?)
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    bcrypt::verify(password, password_hash).unwrap_or(false)
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn sign_jwt_for_user(config: &AuthConfig, user_id: &str) -> Result<IssuedToken, AuthError> {
    let issued_at = Utc::now().timestamp_millis();
    let expires_at_ms = issued_at + config.token_ttl_ms;

    let header_json = serde_json::json!({ "alg": "HS256", "typ": "JWT" });
    let payload_json = serde_json::json!({
        "userId": user_id,
        "iat": issued_at / 1000,
        "exp": expires_at_ms / 1000,
        // Distinguishes tokens issued for the same user within one second.
        "jti": uuid::Uuid::new_v4().to_string(),
    });

    let header_b64 = URL_SAFE_NO_PAD.encode(header_json.to_string());
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload_json.to_string());
    let signing_input = format!("{header_b64}.{payload_b64}");

    let mut mac = HmacSha256::new_from_slice(config.jwt_secret.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    mac.update(signing_input.as_bytes());
    let sig_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(IssuedToken {
        token: format!("{signing_input}.{sig_b64}"),
        expires_at_ms,
    })
}

/// Checks signature and registered claims, returning the `userId` claim.
pub fn verify_jwt(config: &AuthConfig, token: &str) -> Result<String, AuthError> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    let payload_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    let sig_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    if parts.next().is_some() {
        return Err(AuthError::InvalidToken);
    }

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    let header_json: serde_json::Value =
        serde_json::from_slice(&header_bytes).map_err(|_| AuthError::InvalidToken)?;
    if header_json.get("alg").and_then(|value| value.as_str()) != Some("HS256") {
        return Err(AuthError::InvalidToken);
    }

    let sig_bytes = URL_SAFE_NO_PAD
        .decode(sig_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    let mut mac = HmacSha256::new_from_slice(config.jwt_secret.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    mac.update(format!("{header_b64}.{payload_b64}").as_bytes());
    mac.verify_slice(&sig_bytes).map_err(|_| AuthError::InvalidToken)?;

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    let payload: serde_json::Value =
        serde_json::from_slice(&payload_bytes).map_err(|_| AuthError::InvalidToken)?;

    let now = Utc::now().timestamp();
    if let Some(exp) = payload.get("exp").and_then(|value| value.as_i64()) {
        if now >= exp {
            return Err(AuthError::Expired);
        }
    }
    if let Some(nbf) = payload.get("nbf").and_then(|value| value.as_i64()) {
        if now < nbf {
            return Err(AuthError::InvalidToken);
        }
    }

    payload
        .get("userId")
        .and_then(|value| value.as_str())
        .map(|value| value.to_string())
        .ok_or(AuthError::InvalidToken)
}

/// Issues a token and records its session row.
pub async fn start_session(db: &Database, config: &AuthConfig, user_id: &str) -> Result<IssuedToken, AuthError> {
    let issued = sign_jwt_for_user(config, user_id)?;

    sqlx::query(
        r#"
        INSERT INTO "sessions" ("id", "user_id", "token_hash", "expires_at", "created_at")
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(hash_token(&issued.token))
    .bind(issued.expires_at_ms)
    .bind(Utc::now().timestamp_millis())
    .execute(db.pool())
    .await?;

    Ok(issued)
}

pub async fn end_session(db: &Database, token: &str) -> Result<(), AuthError> {
    sqlx::query(r#"DELETE FROM "sessions" WHERE "token_hash" = ?"#)
        .bind(hash_token(token))
        .execute(db.pool())
        .await?;
    Ok(())
}

pub async fn verify_request_token(db: &Database, config: &AuthConfig, token: &str) -> Result<AuthUser, AuthError> {
    let claimed_user_id = verify_jwt(config, token)?;

    let row = sqlx::query(
        r#"
        SELECT
          s."user_id" AS "session_user_id",
          s."expires_at",
          u."id",
          u."username",
          u."email",
          u."full_name",
          u."is_active",
          u."created_at",
          u."updated_at"
        FROM "sessions" s
        JOIN "users" u ON u."id" = s."user_id"
        WHERE s."token_hash" = ?
        "#,
    )
    .bind(hash_token(token))
    .fetch_optional(db.pool())
    .await?;

    let Some(row) = row else {
        return Err(AuthError::InvalidToken);
    };

    let session_user_id: String = row.try_get("session_user_id")?;
    if session_user_id != claimed_user_id {
        return Err(AuthError::InvalidToken);
    }

    let expires_at: i64 = row.try_get("expires_at")?;
    if expires_at < Utc::now().timestamp_millis() {
        return Err(AuthError::Expired);
    }

    let is_active: bool = row.try_get("is_active")?;
    if !is_active {
        return Err(AuthError::Inactive);
    }

    Ok(AuthUser {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        full_name: row.try_get("full_name")?,
        created_at: format_ms(row.try_get("created_at")?),
        updated_at: format_ms(row.try_get("updated_at")?),
    })
}

pub fn auth_cookie_value(token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!("{AUTH_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}
