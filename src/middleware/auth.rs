use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::{extract_token, verify_request_token, AuthError};
use crate::response::AppError;
use crate::state::AppState;

/// Token presented with the request, kept so logout and password changes
/// can address the current session.
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

pub async fn require_auth(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    let Some(token) = extract_token(req.headers()) else {
        return AppError::unauthorized("Authentication required").into_response();
    };

    match verify_request_token(state.db(), state.auth_config(), &token).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            req.extensions_mut().insert(SessionToken(token));
            next.run(req).await
        }
        Err(AuthError::Inactive) => AppError::forbidden("Account is deactivated").into_response(),
        Err(AuthError::Database(err)) => AppError::from(err).into_response(),
        Err(err) => {
            tracing::debug!(error = %err, "rejected token");
            AppError::unauthorized("Invalid or expired token").into_response()
        }
    }
}
