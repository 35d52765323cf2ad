use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use std::sync::Arc;

use super::validation::{validate_id, validate_required, validate_text};
use super::{ApiError, ApiJson, ApiPath, ApiQuery, AppState, MessageResponse, Paginated};
use crate::domain::{ClientInfo, PageRequest, Permission, Principal};

#[derive(Deserialize)]
pub struct ListPermissionsQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub resource: Option<String>,
}

#[derive(Deserialize)]
pub struct CreatePermissionRequest {
    pub code: String,
    #[serde(default)]
    pub description: String,
}

/// GET /admin/permissions
pub async fn list_permissions(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ListPermissionsQuery>,
) -> Result<Json<Paginated<Permission>>, ApiError> {
    let resource = query.resource.as_deref().map(str::trim).filter(|r| !r.is_empty());
    let page = state
        .shared
        .role_service
        .list_permissions(resource, PageRequest::new(query.page, query.per_page))
        .await?;
    Ok(Json(page.into()))
}

/// POST /admin/permissions
pub async fn create_permission(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiJson(body): ApiJson<CreatePermissionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let code = validate_required("code", &body.code)?;
    validate_text("description", &body.description)?;
    let permission = state
        .shared
        .role_service
        .create_permission(&principal, code, &body.description, &client)
        .await?;
    Ok((StatusCode::CREATED, Json(permission)))
}

/// DELETE /admin/permissions/{id}
pub async fn delete_permission(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = validate_id(id)?;
    state
        .shared
        .role_service
        .delete_permission(&principal, id, &client)
        .await?;
    Ok(Json(MessageResponse::new("Permission deleted")))
}
