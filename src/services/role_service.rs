//! Domain service for roles and the permission catalogue.

use serde::Serialize;

use crate::domain::{ClientInfo, NewRole, Page, PageRequest, Permission, Principal, Role, RoleChanges};
use crate::services::error::ServiceError;

/// A role with the permissions it grants.
#[derive(Debug, Clone, Serialize)]
pub struct RoleDetail {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<Permission>,
}

#[async_trait::async_trait]
pub trait RoleService: Send + Sync {
    async fn list(&self, keyword: Option<&str>, page: PageRequest)
    -> Result<Page<Role>, ServiceError>;

    async fn get(&self, id: i64) -> Result<RoleDetail, ServiceError>;

    async fn create(
        &self,
        principal: &Principal,
        role: NewRole,
        permission_ids: Vec<i64>,
        client: &ClientInfo,
    ) -> Result<RoleDetail, ServiceError>;

    /// Updates a role. A system role keeps its name.
    async fn update(
        &self,
        principal: &Principal,
        id: i64,
        changes: RoleChanges,
        client: &ClientInfo,
    ) -> Result<RoleDetail, ServiceError>;

    /// Soft-deletes a role. System roles and roles still assigned to users
    /// are refused.
    async fn delete(
        &self,
        principal: &Principal,
        id: i64,
        client: &ClientInfo,
    ) -> Result<(), ServiceError>;

    /// Replaces the role's grants with exactly `permission_ids`.
    async fn set_permissions(
        &self,
        principal: &Principal,
        id: i64,
        permission_ids: Vec<i64>,
        client: &ClientInfo,
    ) -> Result<RoleDetail, ServiceError>;

    async fn list_permissions(
        &self,
        resource: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<Permission>, ServiceError>;

    async fn create_permission(
        &self,
        principal: &Principal,
        code: &str,
        description: &str,
        client: &ClientInfo,
    ) -> Result<Permission, ServiceError>;

    /// Soft-deletes a permission and removes it from every role.
    async fn delete_permission(
        &self,
        principal: &Principal,
        id: i64,
        client: &ClientInfo,
    ) -> Result<(), ServiceError>;
}
