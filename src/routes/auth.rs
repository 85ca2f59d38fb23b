use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{parse_json, required};
use crate::auth::{self as tokens, AuthError, AuthUser, IssuedToken};
use crate::config::env_bool;
use crate::db::operations::users::{self, NewUser, UserRecord};
use crate::db::operations::{format_ms, non_blank, now_ms};
use crate::middleware::auth::{require_auth, SessionToken};
use crate::response::{created, message, ok, AppError};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 6;

pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/logout", post(logout))
        .route("/refresh", post(refresh))
        .route("/me", get(me))
        .route("/change-password", post(change_password))
        .route("/profile", put(update_profile))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/reset-password-request", post(reset_password_request))
        .merge(protected)
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
    full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResetRequest {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangePasswordRequest {
    current_password: Option<String>,
    new_password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileRequest {
    email: Option<String>,
    full_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct SessionPayload<U> {
    user: U,
    access_token: String,
    expires_at: String,
}

#[derive(Debug, Serialize)]
struct RefreshPayload {
    access_token: String,
    expires_at: String,
}

async fn register(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let payload: RegisterRequest = parse_json(&body)?;

    let username = required(payload.username, "Username")?;
    let email = required(payload.email, "Email")?.to_lowercase();
    let password = payload.password.unwrap_or_default();
    if password.is_empty() {
        return Err(AppError::validation("Password is required"));
    }
    validate_password(&password)?;
    if !is_valid_email(&email) {
        return Err(AppError::validation("Invalid email address"));
    }

    match users::username_or_email_taken(state.db(), &username, &email).await? {
        Some("username") => return Err(AppError::conflict("Username already exists")),
        Some(_) => return Err(AppError::conflict("Email already registered")),
        None => {}
    }

    let password_hash = tokens::hash_password(&password).map_err(auth_failure)?;
    let full_name = non_blank(payload.full_name);
    let user = users::insert_user(
        state.db(),
        NewUser {
            username: &username,
            email: &email,
            password_hash: &password_hash,
            full_name: full_name.as_deref(),
        },
    )
    .await?;

    let issued = tokens::start_session(state.db(), state.auth_config(), &user.id)
        .await
        .map_err(auth_failure)?;
    tracing::info!(user_id = %user.id, "user registered");

    Ok(session_response(StatusCode::CREATED, user, issued))
}

async fn login(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let payload: LoginRequest = parse_json(&body)?;

    let login = non_blank(payload.username);
    let password = payload.password.filter(|p| !p.is_empty());
    let (Some(login), Some(password)) = (login, password) else {
        return Err(AppError::validation("Username/email and password are required"));
    };

    let Some(credentials) = users::find_credentials(state.db(), &login).await? else {
        return Err(AppError::unauthorized("Invalid username/email or password"));
    };
    if !tokens::verify_password(&password, &credentials.password_hash) {
        return Err(AppError::unauthorized("Invalid username/email or password"));
    }
    if !credentials.user.is_active {
        return Err(AppError::forbidden("Account is inactive"));
    }

    let issued = tokens::start_session(state.db(), state.auth_config(), &credentials.user.id)
        .await
        .map_err(auth_failure)?;

    Ok(session_response(StatusCode::OK, credentials.user, issued))
}

/// Answers identically whether or not the address belongs to an account.
/// No mail is sent; the request is only logged.
async fn reset_password_request(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let payload: ResetRequest = parse_json(&body)?;

    let email = required(payload.email, "Email")?.to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::validation("Invalid email address"));
    }

    let account = users::find_credentials(state.db(), &email)
        .await?
        .filter(|credentials| credentials.user.email == email);
    if let Some(credentials) = account {
        tracing::info!(user_id = %credentials.user.id, "password reset requested");
    }

    Ok(message("If the email is registered, a reset link will be sent").into_response())
}

async fn logout(State(state): State<AppState>, Extension(token): Extension<SessionToken>) -> Result<Response, AppError> {
    tokens::end_session(state.db(), &token.0).await.map_err(auth_failure)?;

    let cookie = tokens::auth_cookie_value("", 0, secure_cookies());
    Ok(([(header::SET_COOKIE, cookie)], message("Logged out successfully")).into_response())
}

async fn refresh(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> Result<Response, AppError> {
    let issued = tokens::start_session(state.db(), state.auth_config(), &user.id)
        .await
        .map_err(auth_failure)?;

    let cookie = session_cookie(&issued);
    let payload = RefreshPayload {
        access_token: issued.token,
        expires_at: format_ms(issued.expires_at_ms),
    };
    Ok(([(header::SET_COOKIE, cookie)], ok(payload)).into_response())
}

async fn me(Extension(user): Extension<AuthUser>) -> impl IntoResponse {
    ok(user)
}

async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(token): Extension<SessionToken>,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload: ChangePasswordRequest = parse_json(&body)?;

    let current = payload.current_password.filter(|p| !p.is_empty());
    let Some(current) = current else {
        return Err(AppError::validation("Current password is required"));
    };
    let new_password = payload.new_password.unwrap_or_default();
    if new_password.is_empty() {
        return Err(AppError::validation("New password is required"));
    }
    validate_password(&new_password)?;

    let Some(credentials) = users::find_credentials_by_id(state.db(), &user.id).await? else {
        return Err(AppError::not_found("User not found"));
    };
    if !tokens::verify_password(&current, &credentials.password_hash) {
        return Err(AppError::unauthorized("Current password is incorrect"));
    }

    let password_hash = tokens::hash_password(&new_password).map_err(auth_failure)?;
    users::update_password(state.db(), &user.id, &password_hash).await?;
    let revoked = users::revoke_other_sessions(state.db(), &user.id, &tokens::hash_token(&token.0)).await?;
    tracing::info!(user_id = %user.id, revoked, "password changed");

    Ok(message("Password changed successfully").into_response())
}

async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload: ProfileRequest = parse_json(&body)?;

    let email = non_blank(payload.email).map(|e| e.to_lowercase());
    if let Some(email) = email.as_deref() {
        if !is_valid_email(email) {
            return Err(AppError::validation("Invalid email address"));
        }
        if users::email_taken_by_other(state.db(), email, &user.id).await? {
            return Err(AppError::conflict("Email already in use"));
        }
    }
    let full_name = payload.full_name.map(|name| name.trim().to_string());

    let updated = users::update_profile(state.db(), &user.id, email.as_deref(), full_name.as_deref())
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(ok(updated).into_response())
}

fn session_response(status: StatusCode, user: UserRecord, issued: IssuedToken) -> Response {
    let cookie = session_cookie(&issued);
    let payload = SessionPayload {
        user,
        access_token: issued.token,
        expires_at: format_ms(issued.expires_at_ms),
    };

    if status == StatusCode::CREATED {
        ([(header::SET_COOKIE, cookie)], created(payload)).into_response()
    } else {
        ([(header::SET_COOKIE, cookie)], ok(payload)).into_response()
    }
}

fn session_cookie(issued: &IssuedToken) -> String {
    let max_age_secs = ((issued.expires_at_ms - now_ms()) / 1000).max(0);
    tokens::auth_cookie_value(&issued.token, max_age_secs, secure_cookies())
}

fn secure_cookies() -> bool {
    env_bool("COOKIE_SECURE").unwrap_or(false)
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    Ok(())
}

fn auth_failure(err: AuthError) -> AppError {
    match err {
        AuthError::Database(err) => AppError::from(err),
        other => AppError::internal(other.to_string()),
    }
}

fn is_valid_email(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || value.contains(' ') {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}
