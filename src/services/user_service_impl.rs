//! `SeaORM`-backed implementation of the `UserService` trait.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::crypto::PasswordHasher;
use crate::db::repositories::{Repositories, UserCommandRepository, UserQueryRepository};
use crate::domain::user::normalize_identifier;
use crate::domain::{
    AuditAction, AuditRecord, AuditResource, ClientInfo, NewUser, Page, PageRequest, Principal,
    UserChanges, UserFilter, UserWithRoles,
};
use crate::services::error::{NotFoundExt, ServiceError};
use crate::services::user_service::{BatchCreateResult, CreateUser, ProfileChanges, UserService};

pub struct SeaOrmUserService {
    users: Arc<dyn UserQueryRepository>,
    commands: Arc<dyn UserCommandRepository>,
    hasher: Arc<PasswordHasher>,
}

impl SeaOrmUserService {
    #[must_use]
    pub fn new(repos: &Repositories, hasher: Arc<PasswordHasher>) -> Self {
        Self {
            users: repos.users.clone(),
            commands: repos.users.clone(),
            hasher,
        }
    }

    fn record(action: AuditAction, principal: &Principal, client: &ClientInfo) -> AuditRecord {
        AuditRecord::new(action, AuditResource::User)
            .by(principal)
            .client(client)
    }

    fn normalize_changes(mut changes: UserChanges) -> UserChanges {
        changes.email = changes.email.map(|e| normalize_identifier(&e));
        changes.full_name = changes.full_name.map(|n| n.trim().to_string());
        changes
    }
}

#[async_trait]
impl UserService for SeaOrmUserService {
    async fn list(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<Page<UserWithRoles>, ServiceError> {
        Ok(self.users.list(filter, page).await?)
    }

    async fn get(&self, id: i64) -> Result<UserWithRoles, ServiceError> {
        self.users.find_with_roles(id).await.or_not_found("user")
    }

    async fn create(
        &self,
        principal: &Principal,
        req: CreateUser,
        client: &ClientInfo,
    ) -> Result<UserWithRoles, ServiceError> {
        let username = normalize_identifier(&req.username);
        let email = normalize_identifier(&req.email);
        let full_name = req
            .full_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| username.clone());

        let password_hash = self.hasher.hash(&req.password).await?;

        let user = self
            .commands
            .create(
                NewUser {
                    username: username.clone(),
                    email,
                    password_hash,
                    full_name,
                    status: req.status,
                },
                &req.role_ids,
                Self::record(AuditAction::Create, principal, client)
                    .detail(json!({ "username": username, "role_ids": req.role_ids })),
            )
            .await
            .or_not_found("role")?;

        info!(event = "user_created", user_id = user.id, by = principal.user_id, "User created");
        self.get(user.id).await
    }

    async fn batch_create(
        &self,
        principal: &Principal,
        items: Vec<CreateUser>,
        client: &ClientInfo,
    ) -> Result<Vec<BatchCreateResult>, ServiceError> {
        let mut results = Vec::with_capacity(items.len());

        for (index, item) in items.into_iter().enumerate() {
            let username = item.username.clone();
            let result = match self.create(principal, item, client).await {
                Ok(created) => BatchCreateResult {
                    index,
                    username,
                    success: true,
                    user_id: Some(created.user.id),
                    error: None,
                },
                // Infrastructure failures abort the batch; per-item problems
                // are reported and the batch continues.
                Err(e @ (ServiceError::Unavailable(_) | ServiceError::Internal(_))) => {
                    return Err(e);
                }
                Err(e) => BatchCreateResult {
                    index,
                    username,
                    success: false,
                    user_id: None,
                    error: Some(e.to_string()),
                },
            };
            results.push(result);
        }

        Ok(results)
    }

    async fn update(
        &self,
        principal: &Principal,
        id: i64,
        changes: UserChanges,
        client: &ClientInfo,
    ) -> Result<UserWithRoles, ServiceError> {
        if changes.is_empty() {
            return self.get(id).await;
        }
        if id == principal.user_id && changes.status.is_some() {
            return Err(ServiceError::validation("You cannot change your own status"));
        }

        let changes = Self::normalize_changes(changes);
        let detail = json!({
            "email": changes.email,
            "full_name": changes.full_name,
            "status": changes.status.map(|s| s.as_str()),
        });
        self.commands
            .update(
                id,
                changes,
                Self::record(AuditAction::Update, principal, client)
                    .resource_id(id)
                    .detail(detail),
            )
            .await
            .or_not_found("user")?;

        self.get(id).await
    }

    async fn delete(
        &self,
        principal: &Principal,
        id: i64,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        if id == principal.user_id {
            return Err(ServiceError::validation("You cannot delete your own account"));
        }

        self.commands
            .soft_delete(
                id,
                Self::record(AuditAction::Delete, principal, client).resource_id(id),
            )
            .await
            .or_not_found("user")?;

        info!(event = "user_deleted", user_id = id, by = principal.user_id, "User deleted");
        Ok(())
    }

    async fn assign_roles(
        &self,
        principal: &Principal,
        id: i64,
        role_ids: Vec<i64>,
        client: &ClientInfo,
    ) -> Result<UserWithRoles, ServiceError> {
        self.users.find_by_id(id).await.or_not_found("user")?;

        self.commands
            .set_roles(
                id,
                &role_ids,
                Self::record(AuditAction::AssignRoles, principal, client)
                    .resource_id(id)
                    .detail(json!({ "role_ids": role_ids })),
            )
            .await
            .or_not_found("role")?;

        self.get(id).await
    }

    async fn profile(&self, principal: &Principal) -> Result<UserWithRoles, ServiceError> {
        self.get(principal.user_id).await
    }

    async fn update_profile(
        &self,
        principal: &Principal,
        changes: ProfileChanges,
        client: &ClientInfo,
    ) -> Result<UserWithRoles, ServiceError> {
        let changes = Self::normalize_changes(UserChanges::from(changes));
        if changes.is_empty() {
            return self.profile(principal).await;
        }

        self.commands
            .update(
                principal.user_id,
                changes,
                Self::record(AuditAction::Update, principal, client)
                    .resource_id(principal.user_id)
                    .detail(json!({ "scope": "profile" })),
            )
            .await
            .or_not_found("user")?;

        self.profile(principal).await
    }

    async fn delete_account(
        &self,
        principal: &Principal,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        self.commands
            .soft_delete(
                principal.user_id,
                Self::record(AuditAction::Delete, principal, client)
                    .resource_id(principal.user_id)
                    .detail(json!({ "scope": "account" })),
            )
            .await
            .or_not_found("user")?;

        info!(event = "account_deleted", user_id = principal.user_id, "User deleted own account");
        Ok(())
    }
}
