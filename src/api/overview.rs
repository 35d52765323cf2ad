use axum::{Json, extract::State};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, ApiQuery, AppState};
use crate::services::Overview;

#[derive(Deserialize)]
pub struct OverviewQuery {
    pub recent: Option<u64>,
}

/// GET /admin/overview/stats
pub async fn get_overview(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<OverviewQuery>,
) -> Result<Json<Overview>, ApiError> {
    Ok(Json(state.shared.stats.overview(query.recent).await?))
}
