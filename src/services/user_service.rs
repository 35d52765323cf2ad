//! Domain service for account administration and the caller's own profile.

use serde::Serialize;

use crate::domain::{
    ClientInfo, Page, PageRequest, Principal, UserChanges, UserFilter, UserStatus, UserWithRoles,
};
use crate::services::error::ServiceError;

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub status: UserStatus,
    pub role_ids: Vec<i64>,
}

/// Outcome of one entry of a batch create.
#[derive(Debug, Clone, Serialize)]
pub struct BatchCreateResult {
    pub index: usize,
    pub username: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fields a user may change on their own account.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub avatar: Option<Option<String>>,
    pub bio: Option<Option<String>>,
}

impl From<ProfileChanges> for UserChanges {
    fn from(p: ProfileChanges) -> Self {
        Self {
            email: p.email,
            full_name: p.full_name,
            avatar: p.avatar,
            bio: p.bio,
            status: None,
        }
    }
}

#[async_trait::async_trait]
pub trait UserService: Send + Sync {
    async fn list(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<Page<UserWithRoles>, ServiceError>;

    async fn get(&self, id: i64) -> Result<UserWithRoles, ServiceError>;

    /// Creates the user and its role links atomically.
    async fn create(
        &self,
        principal: &Principal,
        req: CreateUser,
        client: &ClientInfo,
    ) -> Result<UserWithRoles, ServiceError>;

    /// Creates each entry independently; one failure does not stop the rest.
    async fn batch_create(
        &self,
        principal: &Principal,
        items: Vec<CreateUser>,
        client: &ClientInfo,
    ) -> Result<Vec<BatchCreateResult>, ServiceError>;

    async fn update(
        &self,
        principal: &Principal,
        id: i64,
        changes: UserChanges,
        client: &ClientInfo,
    ) -> Result<UserWithRoles, ServiceError>;

    /// Soft-deletes a user. Deleting yourself is refused.
    async fn delete(
        &self,
        principal: &Principal,
        id: i64,
        client: &ClientInfo,
    ) -> Result<(), ServiceError>;

    /// Replaces the user's roles with exactly `role_ids`.
    async fn assign_roles(
        &self,
        principal: &Principal,
        id: i64,
        role_ids: Vec<i64>,
        client: &ClientInfo,
    ) -> Result<UserWithRoles, ServiceError>;

    async fn profile(&self, principal: &Principal) -> Result<UserWithRoles, ServiceError>;

    async fn update_profile(
        &self,
        principal: &Principal,
        changes: ProfileChanges,
        client: &ClientInfo,
    ) -> Result<UserWithRoles, ServiceError>;

    /// Soft-deletes the caller's own account. Every session and token of
    /// the account stops authenticating.
    async fn delete_account(
        &self,
        principal: &Principal,
        client: &ClientInfo,
    ) -> Result<(), ServiceError>;
}
