//! `SeaORM`-backed implementation of the `RoleService` trait.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::db::repositories::{
    PermissionCommandRepository, PermissionQueryRepository, Repositories, RoleCommandRepository,
    RoleQueryRepository,
};
use crate::domain::permission::is_valid_code;
use crate::domain::{
    AuditAction, AuditRecord, AuditResource, ClientInfo, NewRole, Page, PageRequest, Permission,
    Principal, Role, RoleChanges,
};
use crate::services::error::{NotFoundExt, ServiceError};
use crate::services::role_service::{RoleDetail, RoleService};

pub struct SeaOrmRoleService {
    roles: Arc<dyn RoleQueryRepository>,
    role_commands: Arc<dyn RoleCommandRepository>,
    permissions: Arc<dyn PermissionQueryRepository>,
    permission_commands: Arc<dyn PermissionCommandRepository>,
}

impl SeaOrmRoleService {
    #[must_use]
    pub fn new(repos: &Repositories) -> Self {
        Self {
            roles: repos.roles.clone(),
            role_commands: repos.roles.clone(),
            permissions: repos.permissions.clone(),
            permission_commands: repos.permissions.clone(),
        }
    }

    async fn live_role(&self, id: i64) -> Result<Role, ServiceError> {
        self.roles.find_by_id(id).await.or_not_found("role")
    }

    fn record(
        action: AuditAction,
        resource: AuditResource,
        principal: &Principal,
        client: &ClientInfo,
    ) -> AuditRecord {
        AuditRecord::new(action, resource).by(principal).client(client)
    }
}

#[async_trait]
impl RoleService for SeaOrmRoleService {
    async fn list(
        &self,
        keyword: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<Role>, ServiceError> {
        Ok(self.roles.list(keyword, page).await?)
    }

    async fn get(&self, id: i64) -> Result<RoleDetail, ServiceError> {
        let role = self.live_role(id).await?;
        let permissions = self.roles.permissions_of_role(id).await.or_not_found("role")?;
        Ok(RoleDetail { role, permissions })
    }

    async fn create(
        &self,
        principal: &Principal,
        role: NewRole,
        permission_ids: Vec<i64>,
        client: &ClientInfo,
    ) -> Result<RoleDetail, ServiceError> {
        let name = role.name.clone();
        let created = self
            .role_commands
            .create(
                role,
                &permission_ids,
                Self::record(AuditAction::Create, AuditResource::Role, principal, client)
                    .detail(json!({ "name": name, "permission_ids": permission_ids })),
            )
            .await
            .or_not_found("permission")?;

        info!(event = "role_created", role_id = created.id, name = %created.name, "Role created");
        self.get(created.id).await
    }

    async fn update(
        &self,
        principal: &Principal,
        id: i64,
        changes: RoleChanges,
        client: &ClientInfo,
    ) -> Result<RoleDetail, ServiceError> {
        let current = self.live_role(id).await?;
        if current.is_system
            && changes
                .name
                .as_deref()
                .is_some_and(|name| name != current.name)
        {
            return Err(ServiceError::Forbidden(
                "System roles cannot be renamed".to_string(),
            ));
        }

        let detail = json!({
            "name": changes.name,
            "display_name": changes.display_name,
            "description": changes.description,
        });
        self.role_commands
            .update(
                id,
                changes,
                Self::record(AuditAction::Update, AuditResource::Role, principal, client)
                    .resource_id(id)
                    .detail(detail),
            )
            .await
            .or_not_found("role")?;

        self.get(id).await
    }

    async fn delete(
        &self,
        principal: &Principal,
        id: i64,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        let role = self.live_role(id).await?;
        if role.is_system {
            return Err(ServiceError::Forbidden(
                "System roles cannot be deleted".to_string(),
            ));
        }

        self.role_commands
            .soft_delete(
                id,
                Self::record(AuditAction::Delete, AuditResource::Role, principal, client)
                    .resource_id(id)
                    .detail(json!({ "name": role.name })),
            )
            .await
            .or_not_found("role")?;

        info!(event = "role_deleted", role_id = id, "Role deleted");
        Ok(())
    }

    async fn set_permissions(
        &self,
        principal: &Principal,
        id: i64,
        permission_ids: Vec<i64>,
        client: &ClientInfo,
    ) -> Result<RoleDetail, ServiceError> {
        self.live_role(id).await?;

        self.role_commands
            .set_permissions(
                id,
                &permission_ids,
                Self::record(
                    AuditAction::SetPermissions,
                    AuditResource::Role,
                    principal,
                    client,
                )
                .resource_id(id)
                .detail(json!({ "permission_ids": permission_ids })),
            )
            .await
            .or_not_found("permission")?;

        self.get(id).await
    }

    async fn list_permissions(
        &self,
        resource: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<Permission>, ServiceError> {
        Ok(self.permissions.list(resource, page).await?)
    }

    async fn create_permission(
        &self,
        principal: &Principal,
        code: &str,
        description: &str,
        client: &ClientInfo,
    ) -> Result<Permission, ServiceError> {
        let code = code.trim();
        if !is_valid_code(code) {
            return Err(ServiceError::validation(format!(
                "Invalid permission code: {code}"
            )));
        }

        Ok(self
            .permission_commands
            .create(
                code,
                description.trim(),
                Self::record(
                    AuditAction::Create,
                    AuditResource::Permission,
                    principal,
                    client,
                )
                .detail(json!({ "code": code })),
            )
            .await?)
    }

    async fn delete_permission(
        &self,
        principal: &Principal,
        id: i64,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        let permission = self.permissions.find_by_id(id).await.or_not_found("permission")?;

        self.permission_commands
            .soft_delete(
                id,
                Self::record(
                    AuditAction::Delete,
                    AuditResource::Permission,
                    principal,
                    client,
                )
                .resource_id(id)
                .detail(json!({ "code": permission.code })),
            )
            .await
            .or_not_found("permission")
    }
}
