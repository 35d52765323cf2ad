use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::validation::validate_id;
use super::{ApiError, ApiJson, ApiPath, AppState, MessageResponse, PatDto};
use crate::domain::{ClientInfo, Principal};
use crate::services::CreatePat;

const MAX_EXPIRES_IN_DAYS: i64 = 3650;

#[derive(Deserialize)]
pub struct CreateTokenRequest {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub expires_in_days: Option<i64>,
}

#[derive(Serialize)]
pub struct CreatedTokenResponse {
    #[serde(flatten)]
    pub metadata: PatDto,
    /// Shown once; only its hash is stored.
    pub token: String,
}

fn resolve_expiry(req: &CreateTokenRequest) -> Result<Option<DateTime<Utc>>, ApiError> {
    match (req.expires_at, req.expires_in_days) {
        (Some(_), Some(_)) => Err(ApiError::validation(
            "Specify either expires_at or expires_in_days, not both",
        )),
        (Some(at), None) => Ok(Some(at)),
        (None, Some(days)) if (1..=MAX_EXPIRES_IN_DAYS).contains(&days) => {
            Ok(Some(Utc::now() + Duration::days(days)))
        }
        (None, Some(_)) => Err(ApiError::validation(format!(
            "expires_in_days must be between 1 and {MAX_EXPIRES_IN_DAYS}"
        ))),
        (None, None) => Ok(None),
    }
}

/// POST /user/tokens
pub async fn create_token(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiJson(body): ApiJson<CreateTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let expires_at = resolve_expiry(&body)?;

    let created = state
        .shared
        .pat_service
        .create(
            &principal,
            CreatePat {
                name: body.name,
                permissions: body.permissions,
                expires_at,
            },
            &client,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedTokenResponse {
            metadata: created.token.into(),
            token: created.plaintext,
        }),
    ))
}

/// GET /user/tokens
pub async fn list_tokens(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Vec<PatDto>>, ApiError> {
    let tokens = state.shared.pat_service.list(&principal).await?;
    Ok(Json(tokens.into_iter().map(PatDto::from).collect()))
}

/// GET /user/tokens/{id}
pub async fn get_token(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<PatDto>, ApiError> {
    let id = validate_id(id)?;
    Ok(Json(state.shared.pat_service.get(&principal, id).await?.into()))
}

/// PATCH /user/tokens/{id}/enable
pub async fn enable_token(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<PatDto>, ApiError> {
    let id = validate_id(id)?;
    let token = state
        .shared
        .pat_service
        .set_enabled(&principal, id, true, &client)
        .await?;
    Ok(Json(token.into()))
}

/// PATCH /user/tokens/{id}/disable
pub async fn disable_token(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<PatDto>, ApiError> {
    let id = validate_id(id)?;
    let token = state
        .shared
        .pat_service
        .set_enabled(&principal, id, false, &client)
        .await?;
    Ok(Json(token.into()))
}

/// DELETE /user/tokens/{id}
pub async fn delete_token(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = validate_id(id)?;
    state
        .shared
        .pat_service
        .delete(&principal, id, &client)
        .await?;
    Ok(Json(MessageResponse::new("Token deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(expires_at: Option<DateTime<Utc>>, expires_in_days: Option<i64>) -> CreateTokenRequest {
        CreateTokenRequest {
            name: "ci".to_string(),
            permissions: Vec::new(),
            expires_at,
            expires_in_days,
        }
    }

    #[test]
    fn expiry_resolution() {
        assert!(resolve_expiry(&req(None, None)).unwrap().is_none());

        let in_a_week = resolve_expiry(&req(None, Some(7))).unwrap().unwrap();
        assert!(in_a_week > Utc::now() + Duration::days(6));

        assert!(resolve_expiry(&req(None, Some(0))).is_err());
        assert!(resolve_expiry(&req(Some(Utc::now()), Some(7))).is_err());
    }
}
