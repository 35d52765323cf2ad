use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use std::sync::Arc;

use super::validation::{validate_id, validate_ids, validate_role_name, validate_text};
use super::{ApiError, ApiJson, ApiPath, ApiQuery, AppState, MessageResponse, Paginated};
use crate::domain::{ClientInfo, NewRole, PageRequest, Principal, Role, RoleChanges};
use crate::services::RoleDetail;

#[derive(Deserialize)]
pub struct ListRolesQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub keyword: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permission_ids: Vec<i64>,
}

#[derive(Deserialize)]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct SetPermissionsRequest {
    pub permission_ids: Vec<i64>,
}

/// GET /admin/roles
pub async fn list_roles(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ListRolesQuery>,
) -> Result<Json<Paginated<Role>>, ApiError> {
    let keyword = query.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty());
    let page = state
        .shared
        .role_service
        .list(keyword, PageRequest::new(query.page, query.per_page))
        .await?;
    Ok(Json(page.into()))
}

/// GET /admin/roles/{id}
pub async fn get_role(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<RoleDetail>, ApiError> {
    let id = validate_id(id)?;
    Ok(Json(state.shared.role_service.get(id).await?))
}

/// POST /admin/roles
pub async fn create_role(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiJson(body): ApiJson<CreateRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validate_role_name(&body.name)?;
    validate_text("description", &body.description)?;
    validate_ids("permission_ids", &body.permission_ids)?;

    let display_name = body
        .display_name
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| name.clone());

    let role = state
        .shared
        .role_service
        .create(
            &principal,
            NewRole {
                name,
                display_name,
                description: body.description.trim().to_string(),
            },
            body.permission_ids,
            &client,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(role)))
}

/// PUT /admin/roles/{id}
pub async fn update_role(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateRoleRequest>,
) -> Result<Json<RoleDetail>, ApiError> {
    let id = validate_id(id)?;
    let name = body.name.as_deref().map(validate_role_name).transpose()?;
    if let Some(description) = &body.description {
        validate_text("description", description)?;
    }

    let role = state
        .shared
        .role_service
        .update(
            &principal,
            id,
            RoleChanges {
                name,
                display_name: body.display_name.map(|d| d.trim().to_string()),
                description: body.description.map(|d| d.trim().to_string()),
            },
            &client,
        )
        .await?;
    Ok(Json(role))
}

/// DELETE /admin/roles/{id}
pub async fn delete_role(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = validate_id(id)?;
    state
        .shared
        .role_service
        .delete(&principal, id, &client)
        .await?;
    Ok(Json(MessageResponse::new("Role deleted")))
}

/// PUT /admin/roles/{id}/permissions
pub async fn set_permissions(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<SetPermissionsRequest>,
) -> Result<Json<RoleDetail>, ApiError> {
    let id = validate_id(id)?;
    validate_ids("permission_ids", &body.permission_ids)?;
    let role = state
        .shared
        .role_service
        .set_permissions(&principal, id, body.permission_ids, &client)
        .await?;
    Ok(Json(role))
}
