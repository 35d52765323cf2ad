use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use std::sync::Arc;

use super::validation::{validate_id, validate_required, validate_text};
use super::{ApiError, ApiJson, ApiPath, AppState, MessageResponse};
use crate::domain::{ClientInfo, Menu, MenuChanges, MenuNode, MenuOrder, NewMenu, Principal};

#[derive(Deserialize)]
pub struct CreateMenuRequest {
    pub title: String,
    pub path: String,
    pub icon: Option<String>,
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

const fn default_visible() -> bool {
    true
}

#[derive(Deserialize)]
pub struct UpdateMenuRequest {
    pub title: Option<String>,
    pub path: Option<String>,
    #[serde(default, deserialize_with = "super::double_option")]
    pub icon: Option<Option<String>>,
    /// `null` moves the menu to the top level.
    #[serde(default, deserialize_with = "super::double_option")]
    pub parent_id: Option<Option<i64>>,
    pub sort_order: Option<i32>,
    pub visible: Option<bool>,
}

#[derive(Deserialize)]
pub struct ReorderRequest {
    pub items: Vec<MenuOrder>,
}

/// GET /admin/menus
pub async fn list_menus(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MenuNode>>, ApiError> {
    Ok(Json(state.shared.menu_service.tree().await?))
}

/// GET /admin/menus/{id}
pub async fn get_menu(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Menu>, ApiError> {
    let id = validate_id(id)?;
    Ok(Json(state.shared.menu_service.get(id).await?))
}

/// POST /admin/menus
pub async fn create_menu(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiJson(body): ApiJson<CreateMenuRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = validate_required("title", &body.title)?.to_string();
    let path = validate_required("path", &body.path)?.to_string();
    validate_text("title", &title)?;
    validate_text("path", &path)?;
    if let Some(parent_id) = body.parent_id {
        validate_id(parent_id)?;
    }

    let menu = state
        .shared
        .menu_service
        .create(
            &principal,
            NewMenu {
                title,
                path,
                icon: body.icon.filter(|i| !i.trim().is_empty()),
                parent_id: body.parent_id,
                sort_order: body.sort_order,
                visible: body.visible,
            },
            &client,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(menu)))
}

/// PUT /admin/menus/{id}
pub async fn update_menu(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateMenuRequest>,
) -> Result<Json<Menu>, ApiError> {
    let id = validate_id(id)?;
    if let Some(title) = &body.title {
        validate_text("title", title)?;
    }
    if let Some(path) = &body.path {
        validate_text("path", path)?;
    }

    let menu = state
        .shared
        .menu_service
        .update(
            &principal,
            id,
            MenuChanges {
                title: body.title,
                path: body.path,
                icon: body.icon,
                parent_id: body.parent_id,
                sort_order: body.sort_order,
                visible: body.visible,
            },
            &client,
        )
        .await?;
    Ok(Json(menu))
}

/// DELETE /admin/menus/{id}
pub async fn delete_menu(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = validate_id(id)?;
    state
        .shared
        .menu_service
        .delete(&principal, id, &client)
        .await?;
    Ok(Json(MessageResponse::new("Menu deleted")))
}

/// POST /admin/menus/reorder
pub async fn reorder_menus(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiJson(body): ApiJson<ReorderRequest>,
) -> Result<Json<Vec<MenuNode>>, ApiError> {
    let tree = state
        .shared
        .menu_service
        .reorder(&principal, body.items, &client)
        .await?;
    Ok(Json(tree))
}
