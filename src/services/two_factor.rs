//! TOTP enrollment: setup stores a pending secret, verify turns it on and
//! hands out recovery codes, disable needs proof of the second factor.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::config::SecurityConfig;
use crate::crypto::totp;
use crate::db::repositories::{Repositories, UserCommandRepository, UserQueryRepository};
use crate::domain::{AuditAction, AuditRecord, AuditResource, ClientInfo, Principal, User};
use crate::services::error::{NotFoundExt, ServiceError};

#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorSetup {
    pub secret: String,
    pub qr_code_url: String,
    pub qr_code_img: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TwoFactorStatus {
    pub enabled: bool,
    pub recovery_codes_remaining: usize,
}

pub struct TwoFactorService {
    users: Arc<dyn UserQueryRepository>,
    commands: Arc<dyn UserCommandRepository>,
    issuer: String,
}

impl TwoFactorService {
    #[must_use]
    pub fn new(repos: &Repositories, config: &SecurityConfig) -> Self {
        Self {
            users: repos.users.clone(),
            commands: repos.users.clone(),
            issuer: config.totp_issuer.clone(),
        }
    }

    fn require_session(principal: &Principal) -> Result<(), ServiceError> {
        if principal.is_session() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "two-factor settings can only be changed from an interactive session".to_string(),
            ))
        }
    }

    fn record(action: AuditAction, principal: &Principal, client: &ClientInfo) -> AuditRecord {
        AuditRecord::new(action, AuditResource::TwoFactor)
            .by(principal)
            .resource_id(principal.user_id)
            .client(client)
    }

    async fn current_user(&self, principal: &Principal) -> Result<User, ServiceError> {
        self.users.find_by_id(principal.user_id).await.or_not_found("user")
    }

    pub async fn setup(
        &self,
        principal: &Principal,
        client: &ClientInfo,
    ) -> Result<TwoFactorSetup, ServiceError> {
        Self::require_session(principal)?;
        let user = self.current_user(principal).await?;
        if user.totp_enabled {
            return Err(ServiceError::conflict(
                "Two-factor authentication is already enabled",
            ));
        }

        let enrollment = totp::enroll(&self.issuer, &user.username)?;
        self.commands
            .set_pending_totp(
                user.id,
                &enrollment.secret,
                Self::record(AuditAction::Update, principal, client)
                    .detail(serde_json::json!({ "step": "setup" })),
            )
            .await?;

        Ok(TwoFactorSetup {
            secret: enrollment.secret,
            qr_code_url: enrollment.otpauth_url,
            qr_code_img: enrollment.qr_code_image,
        })
    }

    /// Confirms the pending secret with a current code and enables 2FA.
    /// Returns the plaintext recovery codes, shown this once.
    pub async fn verify(
        &self,
        principal: &Principal,
        code: &str,
        client: &ClientInfo,
    ) -> Result<Vec<String>, ServiceError> {
        Self::require_session(principal)?;
        let user = self.current_user(principal).await?;
        if user.totp_enabled {
            return Err(ServiceError::conflict(
                "Two-factor authentication is already enabled",
            ));
        }
        let Some(secret) = user.totp_secret.as_deref() else {
            return Err(ServiceError::validation(
                "Two-factor setup has not been started",
            ));
        };

        if !totp::verify(secret, &self.issuer, &user.username, code)? {
            return Err(ServiceError::validation("Invalid verification code"));
        }

        let codes = totp::generate_recovery_codes();
        let hashes: Vec<String> = codes.iter().map(|c| totp::hash_recovery_code(c)).collect();
        self.commands
            .enable_totp(
                user.id,
                &hashes,
                Self::record(AuditAction::Enable, principal, client),
            )
            .await?;

        info!(event = "two_factor_enabled", user_id = user.id, "Two-factor authentication enabled");
        Ok(codes)
    }

    /// Turns 2FA off. `code` may be a current TOTP code or an unused
    /// recovery code.
    pub async fn disable(
        &self,
        principal: &Principal,
        code: &str,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        Self::require_session(principal)?;
        let user = self.current_user(principal).await?;
        if !user.requires_second_factor() {
            return Err(ServiceError::validation(
                "Two-factor authentication is not enabled",
            ));
        }

        let secret = user.totp_secret.as_deref().unwrap_or_default();
        let proven = totp::verify(secret, &self.issuer, &user.username, code)?
            || self
                .commands
                .consume_recovery_hash(user.id, &totp::hash_recovery_code(code))
                .await?;
        if !proven {
            return Err(ServiceError::validation("Invalid verification code"));
        }

        self.commands
            .disable_totp(user.id, Self::record(AuditAction::Disable, principal, client))
            .await?;

        info!(event = "two_factor_disabled", user_id = user.id, "Two-factor authentication disabled");
        Ok(())
    }

    pub async fn status(&self, principal: &Principal) -> Result<TwoFactorStatus, ServiceError> {
        let user = self.current_user(principal).await?;
        let enabled = user.requires_second_factor();
        Ok(TwoFactorStatus {
            enabled,
            recovery_codes_remaining: if enabled {
                user.totp_recovery_hashes.len()
            } else {
                0
            },
        })
    }
}
