use std::time::{Duration, SystemTime};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::db::DbHealth;
use crate::state::AppState;

const DB_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(root)).route("/live", get(live))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
    database: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    database_latency_ms: Option<u64>,
    ai_available: bool,
    timestamp: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LivenessResponse {
    status: &'static str,
    timestamp: String,
    started_at: String,
    uptime: u64,
}

async fn root(State(state): State<AppState>) -> Response {
    let health = state.db().check_health(DB_CHECK_TIMEOUT).await;

    let (status_code, response) = match health {
        DbHealth::Connected { latency_ms } => (
            StatusCode::OK,
            HealthResponse {
                status: "healthy",
                message: "Study companion API is running",
                database: "connected",
                database_latency_ms: Some(latency_ms),
                ai_available: state.assistant().is_available(),
                timestamp: now_iso(),
            },
        ),
        DbHealth::Disconnected { error } => {
            tracing::warn!(%error, "health check: database unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                HealthResponse {
                    status: "degraded",
                    message: "Database unavailable",
                    database: "disconnected",
                    database_latency_ms: None,
                    ai_available: state.assistant().is_available(),
                    timestamp: now_iso(),
                },
            )
        }
    };

    (status_code, Json(response)).into_response()
}

async fn live(State(state): State<AppState>) -> Response {
    Json(LivenessResponse {
        status: "alive",
        timestamp: now_iso(),
        started_at: system_time_iso(state.started_at_system()),
        uptime: state.uptime_seconds(),
    })
    .into_response()
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn system_time_iso(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Millis, true)
}
