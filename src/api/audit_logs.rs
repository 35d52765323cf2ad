use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use super::validation::validate_id;
use super::{ApiError, ApiPath, ApiQuery, AppState, Paginated};
use crate::domain::{AuditEntry, AuditFilter, PageRequest};

#[derive(Deserialize)]
pub struct AuditLogQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub user_id: Option<i64>,
    pub action: Option<String>,
    pub resource: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

/// GET /admin/auditlogs
pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<AuditLogQuery>,
) -> Result<Json<Paginated<AuditEntry>>, ApiError> {
    let filter = AuditFilter {
        user_id: query.user_id,
        action: non_empty(query.action),
        resource: non_empty(query.resource),
        status: non_empty(query.status),
        start_date: query.start_date,
        end_date: query.end_date,
    };
    let page = state
        .shared
        .audit_logs
        .list(&filter, PageRequest::new(query.page, query.per_page))
        .await?;
    Ok(Json(page.into()))
}

/// GET /admin/auditlogs/{id}
pub async fn get_audit_log(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<AuditEntry>, ApiError> {
    let id = validate_id(id)?;
    Ok(Json(state.shared.audit_logs.get(id).await?))
}
