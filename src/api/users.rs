use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use std::sync::Arc;

use super::validation::{
    validate_email, validate_id, validate_ids, validate_password, validate_required, validate_text,
    validate_username,
};
use super::{ApiError, ApiJson, ApiPath, ApiQuery, AppState, MessageResponse, Paginated, UserDto};
use crate::domain::{ClientInfo, PageRequest, Principal, UserChanges, UserFilter, UserStatus};
use crate::services::{BatchCreateResult, CreateUser};

const MAX_BATCH_SIZE: usize = 100;

#[derive(Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub keyword: Option<String>,
    pub status: Option<UserStatus>,
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub status: Option<UserStatus>,
    #[serde(default)]
    pub role_ids: Vec<i64>,
}

#[derive(Deserialize)]
pub struct BatchCreateRequest {
    pub users: Vec<CreateUserRequest>,
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "super::double_option")]
    pub avatar: Option<Option<String>>,
    #[serde(default, deserialize_with = "super::double_option")]
    pub bio: Option<Option<String>>,
    pub status: Option<UserStatus>,
}

#[derive(Deserialize)]
pub struct AssignRolesRequest {
    pub role_ids: Vec<i64>,
}

impl CreateUserRequest {
    fn validate(self) -> Result<CreateUser, ApiError> {
        let username = validate_username(&self.username)?.to_string();
        let email = validate_email(&self.email)?.to_string();
        validate_password(&self.password)?;
        if let Some(full_name) = &self.full_name {
            validate_text("full_name", full_name)?;
        }
        validate_ids("role_ids", &self.role_ids)?;

        Ok(CreateUser {
            username,
            email,
            password: self.password,
            full_name: self.full_name,
            status: self.status.unwrap_or(UserStatus::Active),
            role_ids: self.role_ids,
        })
    }
}

/// GET /admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ListUsersQuery>,
) -> Result<Json<Paginated<UserDto>>, ApiError> {
    let filter = UserFilter {
        keyword: query
            .keyword
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty()),
        status: query.status,
    };
    let page = state
        .shared
        .user_service
        .list(&filter, PageRequest::new(query.page, query.per_page))
        .await?;
    Ok(Json(page.map(UserDto::from).into()))
}

/// GET /admin/users/{id}
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<UserDto>, ApiError> {
    let id = validate_id(id)?;
    Ok(Json(state.shared.user_service.get(id).await?.into()))
}

/// POST /admin/users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiJson(body): ApiJson<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body.validate()?;
    let user = state
        .shared
        .user_service
        .create(&principal, req, &client)
        .await?;
    Ok((StatusCode::CREATED, Json(UserDto::from(user))))
}

/// POST /admin/users/batch
///
/// Entries that fail validation are reported in place; the rest are
/// created independently.
pub async fn batch_create_users(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiJson(body): ApiJson<BatchCreateRequest>,
) -> Result<Json<Vec<BatchCreateResult>>, ApiError> {
    if body.users.is_empty() || body.users.len() > MAX_BATCH_SIZE {
        return Err(ApiError::validation(format!(
            "users must contain between 1 and {MAX_BATCH_SIZE} entries"
        )));
    }

    let mut rejected = Vec::new();
    let mut valid = Vec::new();
    let mut positions = Vec::new();
    for (index, item) in body.users.into_iter().enumerate() {
        let username = item.username.clone();
        match item.validate() {
            Ok(req) => {
                positions.push(index);
                valid.push(req);
            }
            Err(e) => rejected.push(BatchCreateResult {
                index,
                username,
                success: false,
                user_id: None,
                error: Some(e.to_string()),
            }),
        }
    }

    let created = state
        .shared
        .user_service
        .batch_create(&principal, valid, &client)
        .await?;

    let mut results: Vec<BatchCreateResult> = created
        .into_iter()
        .map(|mut r| {
            if let Some(&original) = positions.get(r.index) {
                r.index = original;
            }
            r
        })
        .chain(rejected)
        .collect();
    results.sort_by_key(|r| r.index);

    Ok(Json(results))
}

/// PUT /admin/users/{id}
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateUserRequest>,
) -> Result<Json<UserDto>, ApiError> {
    let id = validate_id(id)?;
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
        .update(
            &principal,
            id,
            UserChanges {
                email: body.email,
                full_name: body.full_name,
                avatar: body.avatar,
                bio: body.bio,
                status: body.status,
            },
            &client,
        )
        .await?;
    Ok(Json(user.into()))
}

/// DELETE /admin/users/{id}
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = validate_id(id)?;
    state
        .shared
        .user_service
        .delete(&principal, id, &client)
        .await?;
    Ok(Json(MessageResponse::new("User deleted")))
}

/// PUT /admin/users/{id}/roles
pub async fn assign_roles(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<AssignRolesRequest>,
) -> Result<Json<UserDto>, ApiError> {
    let id = validate_id(id)?;
    validate_ids("role_ids", &body.role_ids)?;
    let user = state
        .shared
        .user_service
        .assign_roles(&principal, id, body.role_ids, &client)
        .await?;
    Ok(Json(user.into()))
}
