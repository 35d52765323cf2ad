//! Personal access token lifecycle.
//!
//! The plaintext is produced once, by [`PatService::create`], and only its
//! SHA-256 digest is stored. Authentication with a PAT lives in the auth
//! service next to the session path.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::crypto::{self, PAT_LOOKUP_PREFIX_LEN};
use crate::db::repositories::{PatCommandRepository, PatQueryRepository, Repositories};
use crate::domain::permission::is_valid_code;
use crate::domain::{
    AuditAction, AuditRecord, AuditResource, ClientInfo, NewPersonalAccessToken, PatStatus,
    PersonalAccessToken, Principal,
};
use crate::services::error::{NotFoundExt, ServiceError};

/// Grant letting a user revoke tokens they do not own.
pub const REVOKE_ANY_SCOPE: &str = "admin:pat:revoke";

const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone)]
pub struct CreatePat {
    pub name: String,
    /// Empty means every permission the owner currently holds.
    pub permissions: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A newly minted token. `plaintext` is never retrievable again.
#[derive(Debug, Clone)]
pub struct CreatedPat {
    pub token: PersonalAccessToken,
    pub plaintext: String,
}

pub struct PatService {
    pats: Arc<dyn PatQueryRepository>,
    commands: Arc<dyn PatCommandRepository>,
}

impl PatService {
    #[must_use]
    pub fn new(repos: &Repositories) -> Self {
        Self {
            pats: repos.pats.clone(),
            commands: repos.pats.clone(),
        }
    }

    fn require_session(principal: &Principal) -> Result<(), ServiceError> {
        if principal.is_session() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "personal access tokens can only be managed from an interactive session"
                    .to_string(),
            ))
        }
    }

    /// Loads a token the principal owns. Tokens of other users read as
    /// missing.
    async fn owned(&self, principal: &Principal, id: i64) -> Result<PersonalAccessToken, ServiceError> {
        let token = self.pats.find_by_id(id).await.or_not_found("token")?;
        if token.user_id != principal.user_id {
            return Err(ServiceError::not_found("token"));
        }
        Ok(token)
    }

    pub async fn create(
        &self,
        principal: &Principal,
        req: CreatePat,
        client: &ClientInfo,
    ) -> Result<CreatedPat, ServiceError> {
        Self::require_session(principal)?;

        let name = req.name.trim().to_string();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(ServiceError::validation(format!(
                "Token name must be between 1 and {MAX_NAME_LEN} characters"
            )));
        }
        if let Some(expires_at) = req.expires_at
            && expires_at <= Utc::now()
        {
            return Err(ServiceError::validation("expires_at must be in the future"));
        }

        let mut permissions: Vec<String> = if req.permissions.is_empty() {
            principal.permissions.to_vec()
        } else {
            req.permissions.iter().map(|p| p.trim().to_string()).collect()
        };
        permissions.sort();
        permissions.dedup();

        if let Some(bad) = permissions.iter().find(|p| !is_valid_code(p)) {
            return Err(ServiceError::validation(format!(
                "Invalid permission code: {bad}"
            )));
        }
        if let Some(missing) = permissions.iter().find(|p| !principal.has(p)) {
            return Err(ServiceError::Forbidden(format!(
                "Cannot grant a permission you do not hold: {missing}"
            )));
        }
        if permissions.is_empty() {
            return Err(ServiceError::validation(
                "A token needs at least one permission",
            ));
        }

        let plaintext = crypto::generate_pat();
        let token_prefix = plaintext[..PAT_LOOKUP_PREFIX_LEN].to_string();
        let token_hash = crypto::sha256_hex(&plaintext);

        let token = self
            .commands
            .create(
                NewPersonalAccessToken {
                    user_id: principal.user_id,
                    name: name.clone(),
                    token_prefix,
                    token_hash,
                    permissions: permissions.clone(),
                    expires_at: req.expires_at,
                },
                AuditRecord::new(AuditAction::Create, AuditResource::Token)
                    .by(principal)
                    .client(client)
                    .detail(json!({ "name": name, "permissions": permissions })),
            )
            .await?;

        info!(event = "pat_created", user_id = principal.user_id, pat_id = token.id, "Personal access token created");
        Ok(CreatedPat { token, plaintext })
    }

    pub async fn list(&self, principal: &Principal) -> Result<Vec<PersonalAccessToken>, ServiceError> {
        Ok(self.pats.list_by_user(principal.user_id).await?)
    }

    pub async fn get(&self, principal: &Principal, id: i64) -> Result<PersonalAccessToken, ServiceError> {
        self.owned(principal, id).await
    }

    pub async fn set_enabled(
        &self,
        principal: &Principal,
        id: i64,
        enabled: bool,
        client: &ClientInfo,
    ) -> Result<PersonalAccessToken, ServiceError> {
        Self::require_session(principal)?;
        let token = self.owned(principal, id).await?;

        if enabled && token.is_expired_at(Utc::now()) {
            return Err(ServiceError::validation("Cannot enable an expired token"));
        }

        let (status, action) = if enabled {
            (PatStatus::Active, AuditAction::Enable)
        } else {
            (PatStatus::Disabled, AuditAction::Disable)
        };

        self.commands
            .set_status(
                id,
                status,
                AuditRecord::new(action, AuditResource::Token)
                    .by(principal)
                    .resource_id(id)
                    .client(client),
            )
            .await
            .or_not_found("token")
    }

    /// Deletes a token. Owners may delete their own; holders of
    /// [`REVOKE_ANY_SCOPE`] may delete anyone's.
    pub async fn delete(
        &self,
        principal: &Principal,
        id: i64,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        Self::require_session(principal)?;

        let token = self.pats.find_by_id(id).await.or_not_found("token")?;
        if token.user_id != principal.user_id && !principal.has(REVOKE_ANY_SCOPE) {
            return Err(ServiceError::not_found("token"));
        }

        self.commands
            .delete(
                id,
                AuditRecord::new(AuditAction::Delete, AuditResource::Token)
                    .by(principal)
                    .resource_id(id)
                    .client(client)
                    .detail(json!({ "owner_id": token.user_id, "name": token.name })),
            )
            .await
            .or_not_found("token")?;
        info!(event = "pat_deleted", pat_id = id, owner_id = token.user_id, "Personal access token deleted");
        Ok(())
    }
}
