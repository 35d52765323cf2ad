use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;

use super::validation::{validate_email, validate_password, validate_required, validate_username};
use super::{ApiError, ApiJson, ApiQuery, AppState, MessageResponse, TokenResponse};
use crate::domain::{ClientInfo, Principal};
use crate::services::{CaptchaChallenge, LoginRequest, RegisterRequest, SecondFactorRequest};

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
pub struct CaptchaQuery {
    pub code: Option<String>,
    pub secret: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginBody {
    pub account: String,
    pub password: String,
    pub captcha_id: String,
    pub captcha: String,
    pub totp_code: Option<String>,
    pub recovery_code: Option<String>,
}

#[derive(Deserialize)]
pub struct SecondFactorBody {
    pub session_token: String,
    #[serde(alias = "two_factor_code")]
    pub totp_code: Option<String>,
    pub recovery_code: Option<String>,
}

#[derive(Deserialize)]
pub struct RegisterBody {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub captcha_id: String,
    pub captcha: String,
}

#[derive(Deserialize)]
pub struct RefreshBody {
    pub refresh_token: String,
}

// ============================================================================
// Middleware
// ============================================================================

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves `Authorization: Bearer` to a [`Principal`] and stores it in the
/// request extensions. Every failure is the same 401.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = bearer_token(request.headers()) else {
        return Err(ApiError::unauthorized());
    };

    let principal = state
        .shared
        .auth_service
        .authenticate(token, &client)
        .await?;

    tracing::Span::current().record("user_id", principal.user_id);
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Route guard: the authenticated principal must hold `scope`.
pub async fn require_scope(
    State(scope): State<&'static str>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(principal) = request.extensions().get::<Principal>() else {
        return Err(ApiError::unauthorized());
    };

    if !principal.has(scope) {
        tracing::debug!(
            event = "scope_denied",
            user_id = principal.user_id,
            scope,
            "Missing permission"
        );
        return Err(ApiError::forbidden(format!("missing permission {scope}")));
    }

    Ok(next.run(request).await)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /auth/captcha
pub async fn get_captcha(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<CaptchaQuery>,
) -> Result<Json<CaptchaChallenge>, ApiError> {
    let challenge = state
        .shared
        .captcha
        .generate(query.code.as_deref(), query.secret.as_deref())
        .await
        .map_err(|e| ApiError::ServiceUnavailable(e.to_string()))?;
    Ok(Json(challenge))
}

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    ApiJson(body): ApiJson<LoginBody>,
) -> Result<Json<TokenResponse>, ApiError> {
    let account = validate_required("account", &body.account)?.to_string();
    validate_required("password", &body.password)?;
    validate_required("captcha_id", &body.captcha_id)?;
    validate_required("captcha", &body.captcha)?;

    let session = state
        .shared
        .auth_service
        .login(
            LoginRequest {
                account,
                password: body.password,
                captcha_id: body.captcha_id,
                captcha: body.captcha,
                totp_code: body.totp_code.filter(|c| !c.trim().is_empty()),
                recovery_code: body.recovery_code.filter(|c| !c.trim().is_empty()),
            },
            &client,
        )
        .await?;

    Ok(Json(session.into()))
}

/// POST /auth/login/2fa
pub async fn login_second_factor(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    ApiJson(body): ApiJson<SecondFactorBody>,
) -> Result<Json<TokenResponse>, ApiError> {
    let session_token = validate_required("session_token", &body.session_token)?.to_string();
    let totp_code = body.totp_code.filter(|c| !c.trim().is_empty());
    let recovery_code = body.recovery_code.filter(|c| !c.trim().is_empty());
    if totp_code.is_none() && recovery_code.is_none() {
        return Err(ApiError::validation("totp_code or recovery_code is required"));
    }

    let session = state
        .shared
        .auth_service
        .login_second_factor(
            SecondFactorRequest {
                session_token,
                totp_code,
                recovery_code,
            },
            &client,
        )
        .await?;

    Ok(Json(session.into()))
}

/// POST /auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    ApiJson(body): ApiJson<RegisterBody>,
) -> Result<impl IntoResponse, ApiError> {
    let username = validate_username(&body.username)?.to_string();
    let email = validate_email(&body.email)?.to_string();
    validate_password(&body.password)?;
    validate_required("captcha_id", &body.captcha_id)?;
    validate_required("captcha", &body.captcha)?;

    let session = state
        .shared
        .auth_service
        .register(
            RegisterRequest {
                username,
                email,
                password: body.password,
                full_name: body.full_name,
                captcha_id: body.captcha_id,
                captcha: body.captcha,
            },
            &client,
        )
        .await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(TokenResponse::from(session)),
    ))
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    ApiJson(body): ApiJson<RefreshBody>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = validate_required("refresh_token", &body.refresh_token)?;
    let session = state.shared.auth_service.refresh(token, &client).await?;
    Ok(Json(session.into()))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    ApiJson(body): ApiJson<RefreshBody>,
) -> Result<Json<MessageResponse>, ApiError> {
    let token = validate_required("refresh_token", &body.refresh_token)?;
    state.shared.auth_service.logout(token, &client).await?;
    Ok(Json(MessageResponse::new("Logged out")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
