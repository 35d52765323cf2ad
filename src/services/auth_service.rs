//! Domain service for authentication.
//!
//! Handles login, registration, the refresh/logout session lifecycle,
//! password changes and resolving a bearer credential to a [`Principal`].

use thiserror::Error;

use crate::crypto::{CryptoError, TokenError};
use crate::db::repositories::RepoError;
use crate::domain::{ClientInfo, Principal, UserWithRoles};
use crate::services::token_issuer::TokenPair;

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Every credential failure maps here so callers cannot tell a wrong
    /// password from an unknown or disabled account.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Password accepted; the login resumes at the second step with
    /// `session_token`.
    #[error("two-factor code required")]
    SecondFactorRequired { session_token: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("too many failed attempts")]
    Throttled { retry_after_secs: u64 },

    #[error("registration is disabled")]
    RegistrationDisabled,

    #[error("invalid captcha")]
    InvalidCaptcha,

    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    Conflict {
        message: String,
        field: Option<String>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RepoError> for AuthError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::NotFound("user not found".to_string()),
            RepoError::Conflict { field } => Self::Conflict {
                message: format!("{field} already exists"),
                field: Some(field),
            },
            RepoError::InUse { by } => Self::Conflict {
                message: format!("still in use by {by}"),
                field: None,
            },
            RepoError::Unavailable(msg) => Self::Unavailable(msg),
            RepoError::Database(msg) => Self::Internal(msg),
        }
    }
}

impl From<CryptoError> for AuthError {
    fn from(err: CryptoError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        Self::Internal(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    /// Username or email.
    pub account: String,
    pub password: String,
    pub captcha_id: String,
    pub captcha: String,
    pub totp_code: Option<String>,
    pub recovery_code: Option<String>,
}

/// Second step of a login that stopped at [`AuthError::SecondFactorRequired`].
#[derive(Debug, Clone)]
pub struct SecondFactorRequest {
    pub session_token: String,
    pub totp_code: Option<String>,
    pub recovery_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub captcha_id: String,
    pub captcha: String,
}

/// A freshly issued token pair and the user it was issued to.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub tokens: TokenPair,
    pub user: UserWithRoles,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Runs the credential pipeline: CAPTCHA, password, optional second
    /// factor, account status. Exactly one audit entry is written per call.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for every credential failure,
    /// [`AuthError::SecondFactorRequired`] when an active account has 2FA on
    /// and no code was given, and [`AuthError::Unavailable`] when the success
    /// could not be audited.
    async fn login(&self, req: LoginRequest, client: &ClientInfo)
    -> Result<AuthSession, AuthError>;

    /// Finishes a login with the `session_token` from the first step and a
    /// TOTP or recovery code. The token is spent by the attempt, so a wrong
    /// code sends the user back to the first step.
    async fn login_second_factor(
        &self,
        req: SecondFactorRequest,
        client: &ClientInfo,
    ) -> Result<AuthSession, AuthError>;

    /// Creates an active account with the default role and signs it in.
    async fn register(
        &self,
        req: RegisterRequest,
        client: &ClientInfo,
    ) -> Result<AuthSession, AuthError>;

    /// Exchanges a refresh token for a new pair built from the user's
    /// current state. The consumed token cannot be used again.
    async fn refresh(&self, refresh_token: &str, client: &ClientInfo)
    -> Result<AuthSession, AuthError>;

    /// Revokes a refresh token.
    async fn logout(&self, refresh_token: &str, client: &ClientInfo) -> Result<(), AuthError>;

    /// Resolves an `Authorization: Bearer` value, session JWT or PAT, to a
    /// principal. Any failure is [`AuthError::Unauthorized`]; the real reason
    /// goes to the audit log.
    async fn authenticate(&self, bearer: &str, client: &ClientInfo)
    -> Result<Principal, AuthError>;

    /// Changes the caller's password after checking the current one.
    async fn change_password(
        &self,
        principal: &Principal,
        current_password: &str,
        new_password: &str,
        client: &ClientInfo,
    ) -> Result<(), AuthError>;
}
