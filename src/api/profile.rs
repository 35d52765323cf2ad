use axum::{Json, extract::State};
use serde::Deserialize;
use std::sync::Arc;

use super::validation::{validate_email, validate_password, validate_required, validate_text};
use super::{ApiError, ApiJson, AppState, MessageResponse, UserDto};
use crate::domain::{ClientInfo, Principal};
use crate::services::ProfileChanges;

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub full_name: Option<String>,
    /// `null` clears the avatar.
    #[serde(default, deserialize_with = "super::double_option")]
    pub avatar: Option<Option<String>>,
    #[serde(default, deserialize_with = "super::double_option")]
    pub bio: Option<Option<String>>,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// GET /user/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<UserDto>, ApiError> {
    let user = state.shared.user_service.profile(&principal).await?;
    Ok(Json(user.into()))
}

/// PUT /user/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiJson(body): ApiJson<UpdateProfileRequest>,
) -> Result<Json<UserDto>, ApiError> {
    if let Some(email) = &body.email {
        validate_email(email)?;
    }
    if let Some(full_name) = &body.full_name {
        validate_required("full_name", full_name)?;
        validate_text("full_name", full_name)?;
    }
    if let Some(Some(bio)) = &body.bio {
        validate_text("bio", bio)?;
    }

    let user = state
        .shared
        .user_service
        .update_profile(
            &principal,
            ProfileChanges {
                email: body.email,
                full_name: body.full_name,
                avatar: body.avatar,
                bio: body.bio,
            },
            &client,
        )
        .await?;

    Ok(Json(user.into()))
}

/// PUT /user/password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiJson(body): ApiJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_required("current_password", &body.current_password)?;
    validate_password(&body.new_password)?;

    state
        .shared
        .auth_service
        .change_password(&principal, &body.current_password, &body.new_password, &client)
        .await?;

    Ok(Json(MessageResponse::new("Password updated")))
}

/// DELETE /user/account
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .shared
        .user_service
        .delete_account(&principal, &client)
        .await?;
    Ok(Json(MessageResponse::new("Account deleted")))
}
