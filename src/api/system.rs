//! Health probe.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::AppState;

const DB_PING_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub database: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub checks: HealthChecks,
}

/// `GET /api/health`
///
/// Reports whether the database answers within two seconds. Responds with
/// `503` when it does not.
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let database = matches!(
        tokio::time::timeout(DB_PING_TIMEOUT, state.store().ping()).await,
        Ok(Ok(()))
    );

    let (status, label) = if database {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    (
        status,
        Json(HealthResponse {
            status: label,
            version: env!("CARGO_PKG_VERSION"),
            uptime_seconds: state.start_time.elapsed().as_secs(),
            checks: HealthChecks { database },
        }),
    )
        .into_response()
}
