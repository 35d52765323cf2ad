use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::validation::validate_required;
use super::{ApiError, ApiJson, AppState, MessageResponse};
use crate::domain::{ClientInfo, Principal};
use crate::services::{TwoFactorSetup, TwoFactorStatus};

#[derive(Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Serialize)]
pub struct RecoveryCodesResponse {
    pub recovery_codes: Vec<String>,
}

/// POST /auth/2fa/setup
pub async fn setup(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
) -> Result<Json<TwoFactorSetup>, ApiError> {
    Ok(Json(state.shared.two_factor.setup(&principal, &client).await?))
}

/// POST /auth/2fa/verify
pub async fn verify(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiJson(body): ApiJson<CodeRequest>,
) -> Result<Json<RecoveryCodesResponse>, ApiError> {
    let code = validate_required("code", &body.code)?;
    let recovery_codes = state
        .shared
        .two_factor
        .verify(&principal, code, &client)
        .await?;
    Ok(Json(RecoveryCodesResponse { recovery_codes }))
}

/// POST /auth/2fa/disable
pub async fn disable(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    client: ClientInfo,
    ApiJson(body): ApiJson<CodeRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let code = validate_required("code", &body.code)?;
    state
        .shared
        .two_factor
        .disable(&principal, code, &client)
        .await?;
    Ok(Json(MessageResponse::new("Two-factor authentication disabled")))
}

/// GET /auth/2fa/status
pub async fn status(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<TwoFactorStatus>, ApiError> {
    Ok(Json(state.shared.two_factor.status(&principal).await?))
}
