use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::validation::{validate_required, validate_text};
use super::{ApiError, ApiJson, ApiPath, ApiQuery, AppState, MessageResponse};
use crate::domain::{ClientInfo, NewSetting, Principal, Setting, SettingCategory, SettingValueType};

#[derive(Deserialize)]
pub struct ListSettingsQuery {
    pub category: Option<SettingCategory>,
}

#[derive(Deserialize)]
pub struct CreateSettingRequest {
    pub key: String,
    pub value: String,
    pub category: SettingCategory,
    pub value_type: SettingValueType,
    #[serde(default)]
    pub label: String,
}

#[derive(Deserialize)]
pub struct UpdateSettingRequest {
    pub value: Option<String>,
    pub label: Option<String>,
}

/// `{ "settings": { "<key>": "<value>", ... } }`
#[derive(Deserialize)]
pub struct BatchUpdateRequest {
    pub settings: BTreeMap<String, String>,
}

/// GET /admin/settings
pub async fn list_settings(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ListSettingsQuery>,
) -> Result<Json<Vec<Setting>>, ApiError> {
    Ok(Json(state.shared.setting_service.list(query.category).await?))
}

/// GET /admin/settings/{key}
pub async fn get_setting(
    State(state): State<Arc<AppState>>,
    ApiPath(key): ApiPath<String>,
) -> Result<Json<Setting>, ApiError> {
    Ok(Json(state.shared.setting_service.get(&key).await?))
}

/// POST /admin/settings
pub async fn create_setting(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiJson(body): ApiJson<CreateSettingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key = validate_required("key", &body.key)?.to_string();
    validate_text("label", &body.label)?;

    let setting = state
        .shared
        .setting_service
        .create(
            &principal,
            NewSetting {
                label: if body.label.trim().is_empty() {
                    key.clone()
                } else {
                    body.label.trim().to_string()
                },
                key,
                value: body.value,
                category: body.category,
                value_type: body.value_type,
            },
            &client,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(setting)))
}

/// PUT /admin/settings/{key}
pub async fn update_setting(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiPath(key): ApiPath<String>,
    ApiJson(body): ApiJson<UpdateSettingRequest>,
) -> Result<Json<Setting>, ApiError> {
    if let Some(label) = &body.label {
        validate_text("label", label)?;
    }
    let setting = state
        .shared
        .setting_service
        .update(&principal, &key, body.value, body.label, &client)
        .await?;
    Ok(Json(setting))
}

/// PUT /admin/settings
pub async fn batch_update_settings(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiJson(body): ApiJson<BatchUpdateRequest>,
) -> Result<Json<Vec<Setting>>, ApiError> {
    let settings = state
        .shared
        .setting_service
        .batch_update(&principal, body.settings.into_iter().collect(), &client)
        .await?;
    Ok(Json(settings))
}

/// DELETE /admin/settings/{key}
pub async fn delete_setting(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiPath(key): ApiPath<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .shared
        .setting_service
        .delete(&principal, &key, &client)
        .await?;
    Ok(Json(MessageResponse::new("Setting deleted")))
}
